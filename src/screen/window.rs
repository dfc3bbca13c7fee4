//! Top-level windows and their event channels

use super::{Buffer, Point, Rect, Shared, UploadRecipient};
use crate::backend::Xid;
use crate::error::Result;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;
use x11rb::protocol::Event;

/// A mapped top-level window
///
/// Events addressed to the window arrive on its channel in server order. The
/// channel closes once the server reports the window destroyed.
pub struct Window {
    shared: Arc<Shared>,
    id: Xid,
    gc: Xid,
    picture: Xid,
    size: (u16, u16),
    events: Receiver<Event>,
}

impl Window {
    pub(crate) fn new(
        shared: Arc<Shared>,
        id: Xid,
        gc: Xid,
        picture: Xid,
        size: (u16, u16),
        events: Receiver<Event>,
    ) -> Self {
        Window {
            shared,
            id,
            gc,
            picture,
            size,
            events,
        }
    }

    pub fn id(&self) -> Xid {
        self.id
    }

    pub fn gc(&self) -> Xid {
        self.gc
    }

    pub fn picture(&self) -> Xid {
        self.picture
    }

    /// Size the window was created with
    pub fn size(&self) -> (u16, u16) {
        self.size
    }

    /// The raw event channel
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Block for the next event; `None` once the window is destroyed
    pub fn next_event(&self) -> Option<Event> {
        self.events.recv().ok()
    }

    pub fn try_next_event(&self) -> std::result::Result<Event, TryRecvError> {
        self.events.try_recv()
    }

    pub fn next_event_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Event, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Copy `src` from `buffer` to `dst` in this window
    pub fn upload(
        &self,
        buffer: &Buffer,
        dst: Point,
        src: Rect,
        recipient: Option<Arc<dyn UploadRecipient>>,
    ) -> Result<()> {
        buffer.upload(
            self.id,
            self.gc,
            self.shared.screen.root_depth,
            dst,
            src,
            recipient,
        )
    }

    /// Free the picture and GC and destroy the window on the server, same as
    /// dropping it. The registry entry goes away when the DestroyNotify comes
    /// back.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        let backend = &self.shared.backend;
        let result = backend
            .free_picture(self.picture)
            .and_then(|()| backend.free_gc(self.gc))
            .and_then(|()| backend.destroy_window(self.id))
            .and_then(|()| backend.flush());
        if let Err(e) = result {
            log::warn!("releasing window 0x{:x}: {}", self.id, e);
        }
    }
}
