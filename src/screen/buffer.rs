//! Shared memory pixel buffers
//!
//! A buffer stays registered under its segment id until it is both released
//! and idle. Releasing a busy buffer hands its segment to the upload state;
//! the dispatch thread detaches and unmaps it once the last completion
//! arrives. A completion that never arrives leaks the segment.

use super::shm::Segment;
use super::{Point, Rect, Shared, Size, UploadRecipient};
use crate::backend::{PutImageParams, Xid};
use crate::error::Result;
use crate::resources::{Completion, UploadedEvent};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// A released buffer's segment, waiting for its uploads to finish
pub(crate) struct Retired {
    segment: Xid,
    mem: Segment,
}

impl Retired {
    /// Unregister, detach and unmap
    pub(crate) fn free(self, shared: &Shared) {
        shared.tables().remove_buffer(self.segment);
        let backend = &shared.backend;
        if let Err(e) = backend
            .shm_detach(self.segment)
            .and_then(|()| backend.flush())
        {
            log::warn!("detaching segment 0x{:x}: {}", self.segment, e);
        }
        log::debug!("released buffer seg=0x{:x}", self.segment);
        drop(self.mem);
    }
}

#[derive(Default)]
struct UploadInner {
    in_flight: usize,
    retired: Option<Retired>,
}

/// Busy/idle state of a buffer, shared with the dispatch thread
#[derive(Default)]
pub struct UploadState {
    inner: Mutex<UploadInner>,
    idle: Condvar,
}

impl UploadState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, UploadInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn begin(&self) {
        self.lock().in_flight += 1;
    }

    /// Mark one upload as done. Returns the segment to free when this was the
    /// last upload of an already released buffer.
    #[must_use]
    pub(crate) fn finish(&self) -> Option<Retired> {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if inner.in_flight > 0 {
            return None;
        }
        self.idle.notify_all();
        inner.retired.take()
    }

    /// Hand over the segment of a released buffer. Returns it back when no
    /// upload is in flight, in which case the caller frees it right away.
    fn retire(&self, retired: Retired) -> Option<Retired> {
        let mut inner = self.lock();
        if inner.in_flight == 0 {
            return Some(retired);
        }
        inner.retired = Some(retired);
        None
    }

    pub fn is_busy(&self) -> bool {
        self.lock().in_flight > 0
    }

    /// Block until no upload from this buffer is in flight
    pub fn wait_idle(&self) {
        let mut inner = self.lock();
        while inner.in_flight > 0 {
            inner = self.idle.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// A 32-bit BGRA pixel buffer backed by an MIT-SHM segment
pub struct Buffer {
    shared: Arc<Shared>,
    segment: Xid,
    /// Taken on drop
    mem: Option<Segment>,
    size: Size,
    state: Arc<UploadState>,
}

impl Buffer {
    pub(crate) fn new(shared: Arc<Shared>, segment: Xid, mem: Segment, size: Size) -> Self {
        Buffer {
            shared,
            segment,
            mem: Some(mem),
            size,
            state: Arc::new(UploadState::new()),
        }
    }

    pub(crate) fn state(&self) -> &Arc<UploadState> {
        &self.state
    }

    pub fn segment(&self) -> Xid {
        self.segment
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        4 * self.size.width as usize
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.size.width as u16, self.size.height as u16)
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    /// The pixel view, `stride() * height` bytes
    pub fn pixels(&self) -> &[u8] {
        self.mem.as_ref().map(|mem| mem.as_slice()).unwrap_or_default()
    }

    /// Mutable pixel view; waits for in-flight uploads to finish first
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.state.wait_idle();
        self.mem
            .as_mut()
            .map(|mem| mem.as_mut_slice())
            .unwrap_or_default()
    }

    /// Mutable pixel view, or `None` while an upload is in flight
    pub fn try_pixels_mut(&mut self) -> Option<&mut [u8]> {
        if self.state.is_busy() {
            return None;
        }
        self.mem.as_mut().map(|mem| mem.as_mut_slice())
    }

    /// Copy `src` (clipped to the buffer) to `dst` on `drawable`. The buffer
    /// stays busy until the server's completion event arrives, at which point
    /// `recipient` is notified from a separate thread.
    pub fn upload(
        &self,
        drawable: Xid,
        gc: Xid,
        depth: u8,
        dst: Point,
        src: Rect,
        recipient: Option<Arc<dyn UploadRecipient>>,
    ) -> Result<()> {
        let src = src.intersect(&self.bounds());
        if src.is_empty() {
            return Ok(());
        }

        let params = PutImageParams {
            drawable,
            gc,
            total_width: self.size.width as u16,
            total_height: self.size.height as u16,
            src_x: src.x,
            src_y: src.y,
            src_width: src.width,
            src_height: src.height,
            dst_x: dst.x,
            dst_y: dst.y,
            depth,
            segment: self.segment,
        };
        let completion = Completion {
            segment: self.segment,
            recipient,
            event: UploadedEvent {
                segment: self.segment,
                drawable,
            },
        };

        // Issuing the request and recording its sequence number must not be
        // split by the dispatch thread looking the sequence number up.
        let displaced = {
            let mut tables = self.shared.tables();
            let sequence = self.shared.backend.shm_put_image(&params)?;
            self.state.begin();
            tables
                .insert_upload(sequence as u16, completion)
                .map(|old| (old.segment, tables.buffer(old.segment)))
        };
        if let Some((segment, state)) = displaced {
            log::warn!(
                "upload from segment 0x{:x} replaced before its completion arrived",
                segment
            );
            if let Some(retired) = state.and_then(|state| state.finish()) {
                retired.free(&self.shared);
            }
        }

        self.shared.backend.flush()
    }

    /// Release the buffer without waiting. The segment is detached and
    /// unmapped now if the buffer is idle, otherwise once the last in-flight
    /// upload completes.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let Some(mem) = self.mem.take() else {
            return;
        };
        let retired = Retired {
            segment: self.segment,
            mem,
        };
        match self.state.retire(retired) {
            Some(retired) => retired.free(&self.shared),
            None => log::debug!(
                "buffer seg=0x{:x} released with uploads in flight",
                self.segment
            ),
        }
    }
}
