//! Null Backend - In-memory backend for testing
//!
//! This backend accepts every request and records it instead of talking to a
//! display server. Events are fed in by the test through `push_event`, and
//! single requests can be made to fail with `fail_next` to exercise cleanup
//! paths.

use super::*;
use crate::error::Error;
use std::collections::VecDeque;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use x11rb::errors::ConnectionError;
use x11rb::protocol::Event;

/// A request the null backend received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NullRequest {
    CreateColormap {
        colormap: Xid,
        visual: u32,
    },
    CreateWindow {
        id: Xid,
        parent: Xid,
        depth: u8,
        visual: u32,
    },
    DestroyWindow(Xid),
    MapWindow(Xid),
    ChangeProperty {
        window: Xid,
        property: Atom,
        type_: Atom,
        format: u8,
        data: Vec<u8>,
    },
    CreateGC {
        gc: Xid,
        drawable: Xid,
    },
    FreeGC(Xid),
    CreatePixmap {
        depth: u8,
        pixmap: Xid,
        drawable: Xid,
        width: u16,
        height: u16,
    },
    FreePixmap(Xid),
    CreatePicture {
        picture: Xid,
        drawable: Xid,
        format: Xid,
    },
    FreePicture(Xid),
    ShmAttach {
        segment: Xid,
        read_only: bool,
    },
    ShmDetach(Xid),
    ShmPutImage {
        sequence: SequenceNumber,
        drawable: Xid,
        segment: Xid,
    },
}

pub struct NullBackend {
    screen: ScreenInfo,
    formats: Vec<PictFormatInfo>,
    extensions: Vec<&'static str>,
    shm_version: (u16, u16),

    next_id: AtomicU32,
    ids_allocated: AtomicU32,
    next_sequence: AtomicU64,

    requests: Mutex<Vec<NullRequest>>,
    failures: Mutex<Vec<&'static str>>,

    events: Mutex<VecDeque<BackendResult<Event>>>,
    events_ready: Condvar,
}

/// Pict format with the BGRA layout the coordinator looks for
pub fn bgra_format(id: Xid, depth: u8) -> PictFormatInfo {
    let alpha = depth == 32;
    PictFormatInfo {
        id,
        depth,
        direct: true,
        layout: DirectFormat {
            red_shift: 16,
            red_mask: 0xff,
            green_shift: 8,
            green_mask: 0xff,
            blue_shift: 0,
            blue_mask: 0xff,
            alpha_shift: if alpha { 24 } else { 0 },
            alpha_mask: if alpha { 0xff } else { 0 },
        },
    }
}

impl NullBackend {
    pub const ROOT: Xid = 0x1e3;
    pub const FORMAT_24: Xid = 0x25;
    pub const FORMAT_32: Xid = 0x26;

    pub fn new() -> Self {
        let visual = |visual_id, depth| VisualInfo {
            visual_id,
            depth,
            class: 4, // TrueColor
            red_mask: 0xFF0000,
            green_mask: 0x00FF00,
            blue_mask: 0x0000FF,
        };

        Self {
            screen: ScreenInfo {
                root: Self::ROOT,
                root_depth: 24,
                root_visual: 0x21,
                width: 1920,
                height: 1080,
                visuals: vec![visual(0x21, 24), visual(0x5d, 32)],
            },
            formats: vec![
                PictFormatInfo {
                    id: 0x24,
                    depth: 8,
                    direct: true,
                    layout: DirectFormat {
                        alpha_mask: 0xff,
                        ..DirectFormat::default()
                    },
                },
                bgra_format(Self::FORMAT_24, 24),
                bgra_format(Self::FORMAT_32, 32),
            ],
            extensions: vec!["MIT-SHM", "RENDER"],
            shm_version: (1, 2),
            next_id: AtomicU32::new(0x0400_0001),
            ids_allocated: AtomicU32::new(0),
            next_sequence: AtomicU64::new(1),
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            events: Mutex::new(VecDeque::new()),
            events_ready: Condvar::new(),
        }
    }

    pub fn with_root_depth(mut self, depth: u8) -> Self {
        self.screen.root_depth = depth;
        self
    }

    pub fn with_formats(mut self, formats: Vec<PictFormatInfo>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_visuals(mut self, visuals: Vec<VisualInfo>) -> Self {
        self.screen.visuals = visuals;
        self
    }

    pub fn without_extension(mut self, name: &str) -> Self {
        self.extensions.retain(|ext| *ext != name);
        self
    }

    pub fn with_shm_version(mut self, major: u16, minor: u16) -> Self {
        self.shm_version = (major, minor);
        self
    }

    /// Make the next request or id allocation named `op` fail
    pub fn fail_next(&self, op: &'static str) {
        self.failures.lock().unwrap().push(op);
    }

    /// Queue an event for the dispatch loop
    pub fn push_event(&self, event: Event) {
        self.events.lock().unwrap().push_back(Ok(event));
        self.events_ready.notify_one();
    }

    /// Queue a transport error for the dispatch loop
    pub fn push_read_error(&self) {
        self.events.lock().unwrap().push_back(Err(Error::Connection {
            op: "WaitForEvent",
            source: ConnectionError::UnknownError,
        }));
        self.events_ready.notify_one();
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<NullRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of successful XID allocations
    pub fn ids_allocated(&self) -> u32 {
        self.ids_allocated.load(Ordering::SeqCst)
    }

    fn check(&self, op: &'static str) -> BackendResult<()> {
        let mut failures = self.failures.lock().unwrap();
        match failures.iter().position(|f| *f == op) {
            Some(i) => {
                failures.remove(i);
                Err(Error::Connection {
                    op,
                    source: ConnectionError::UnknownError,
                })
            }
            None => Ok(()),
        }
    }

    fn record(&self, op: &'static str, request: NullRequest) -> BackendResult<()> {
        self.check(op)?;
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for NullBackend {
    fn screen_info(&self) -> &ScreenInfo {
        &self.screen
    }

    fn has_extension(&self, name: &'static str) -> BackendResult<bool> {
        Ok(self.extensions.contains(&name))
    }

    fn generate_id(&self, op: &'static str) -> BackendResult<Xid> {
        if self.check(op).is_err() {
            return Err(Error::IdsExhausted { op });
        }
        self.ids_allocated.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn intern_atom(&self, name: &str) -> BackendResult<Atom> {
        self.check("InternAtom")?;
        // Predefined-looking values, stable per name
        Ok(match name {
            "WM_PROTOCOLS" => 0x12c,
            "WM_DELETE_WINDOW" => 0x12d,
            "WM_TAKE_FOCUS" => 0x12e,
            _ => 0x200 + name.len() as Atom,
        })
    }

    fn query_pict_formats(&self) -> BackendResult<Vec<PictFormatInfo>> {
        self.check("QueryPictFormats")?;
        Ok(self.formats.clone())
    }

    fn create_colormap(&self, colormap: Xid, _window: Xid, visual: u32) -> BackendResult<()> {
        self.record(
            "CreateColormap",
            NullRequest::CreateColormap { colormap, visual },
        )
    }

    fn create_window(&self, params: &WindowParams) -> BackendResult<()> {
        self.record(
            "CreateWindow",
            NullRequest::CreateWindow {
                id: params.id,
                parent: params.parent,
                depth: params.depth,
                visual: params.visual,
            },
        )
    }

    fn destroy_window(&self, window: Xid) -> BackendResult<()> {
        self.record("DestroyWindow", NullRequest::DestroyWindow(window))
    }

    fn map_window(&self, window: Xid) -> BackendResult<()> {
        self.record("MapWindow", NullRequest::MapWindow(window))
    }

    fn change_property(
        &self,
        window: Xid,
        property: Atom,
        type_: Atom,
        format: u8,
        _len: u32,
        data: &[u8],
    ) -> BackendResult<()> {
        self.record(
            "ChangeProperty",
            NullRequest::ChangeProperty {
                window,
                property,
                type_,
                format,
                data: data.to_vec(),
            },
        )
    }

    fn create_gc(&self, gc: Xid, drawable: Xid) -> BackendResult<()> {
        self.record("CreateGC", NullRequest::CreateGC { gc, drawable })
    }

    fn free_gc(&self, gc: Xid) -> BackendResult<()> {
        self.record("FreeGC", NullRequest::FreeGC(gc))
    }

    fn create_pixmap(
        &self,
        depth: u8,
        pixmap: Xid,
        drawable: Xid,
        width: u16,
        height: u16,
    ) -> BackendResult<()> {
        self.record(
            "CreatePixmap",
            NullRequest::CreatePixmap {
                depth,
                pixmap,
                drawable,
                width,
                height,
            },
        )
    }

    fn free_pixmap(&self, pixmap: Xid) -> BackendResult<()> {
        self.record("FreePixmap", NullRequest::FreePixmap(pixmap))
    }

    fn create_picture(&self, picture: Xid, drawable: Xid, format: Xid) -> BackendResult<()> {
        self.record(
            "CreatePicture",
            NullRequest::CreatePicture {
                picture,
                drawable,
                format,
            },
        )
    }

    fn free_picture(&self, picture: Xid) -> BackendResult<()> {
        self.record("FreePicture", NullRequest::FreePicture(picture))
    }

    fn shm_query_version(&self) -> BackendResult<(u16, u16)> {
        self.check("ShmQueryVersion")?;
        Ok(self.shm_version)
    }

    fn shm_attach_fd(&self, segment: Xid, fd: OwnedFd, read_only: bool) -> BackendResult<()> {
        // The server would keep its own reference; we just close ours.
        drop(fd);
        self.record(
            "ShmAttachFd",
            NullRequest::ShmAttach { segment, read_only },
        )
    }

    fn shm_detach(&self, segment: Xid) -> BackendResult<()> {
        self.record("ShmDetach", NullRequest::ShmDetach(segment))
    }

    fn shm_put_image(&self, params: &PutImageParams) -> BackendResult<SequenceNumber> {
        self.check("ShmPutImage")?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(NullRequest::ShmPutImage {
            sequence,
            drawable: params.drawable,
            segment: params.segment,
        });
        Ok(sequence)
    }

    fn flush(&self) -> BackendResult<()> {
        Ok(())
    }

    fn wait_for_event(&self) -> BackendResult<Event> {
        let mut events = self.events.lock().unwrap();
        loop {
            if let Some(event) = events.pop_front() {
                return event;
            }
            events = self.events_ready.wait(events).unwrap();
        }
    }
}
