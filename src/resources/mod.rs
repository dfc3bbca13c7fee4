//! Resource tables shared by the coordinator and the dispatch thread
//!
//! The screen keeps one `Tables` value behind a single mutex. Callers creating
//! windows and buffers insert entries; the dispatch thread looks them up and
//! removes windows on DestroyNotify and uploads on ShmCompletion. The mutex is
//! only ever held for the table operation itself.

use crate::backend::Xid;
use crate::screen::buffer::UploadState;
use crate::screen::UploadRecipient;
use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use x11rb::protocol::Event;

/// Notification that an upload finished on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadedEvent {
    /// Segment of the buffer that was uploaded from
    pub segment: Xid,
    /// Window or pixmap that was uploaded to
    pub drawable: Xid,
}

/// An upload waiting for its ShmCompletion event
#[derive(Clone)]
pub struct Completion {
    pub segment: Xid,
    pub recipient: Option<Arc<dyn UploadRecipient>>,
    pub event: UploadedEvent,
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("segment", &self.segment)
            .field("recipient", &self.recipient.is_some())
            .field("event", &self.event)
            .finish()
    }
}

/// Window, buffer and pending-upload tables
#[derive(Default)]
pub struct Tables {
    /// Event channel of each live window, by window id
    windows: HashMap<Xid, SyncSender<Event>>,

    /// Upload state of each live buffer, by shm segment id
    buffers: HashMap<Xid, Arc<UploadState>>,

    /// Pending uploads, by the low 16 bits of the request sequence number
    uploads: HashMap<u16, Completion>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a window; returns false if the id was already live
    pub fn insert_window(&mut self, id: Xid, events: SyncSender<Event>) -> bool {
        if self.windows.contains_key(&id) {
            return false;
        }
        self.windows.insert(id, events);
        true
    }

    /// Clone of the window's event sender
    pub fn window(&self, id: Xid) -> Option<SyncSender<Event>> {
        self.windows.get(&id).cloned()
    }

    pub fn remove_window(&mut self, id: Xid) -> Option<SyncSender<Event>> {
        self.windows.remove(&id)
    }

    pub fn insert_buffer(&mut self, segment: Xid, state: Arc<UploadState>) {
        self.buffers.insert(segment, state);
    }

    /// Find a buffer's upload state by its segment id
    pub fn buffer(&self, segment: Xid) -> Option<Arc<UploadState>> {
        self.buffers.get(&segment).cloned()
    }

    pub fn remove_buffer(&mut self, segment: Xid) -> Option<Arc<UploadState>> {
        self.buffers.remove(&segment)
    }

    /// Record a pending upload; returns the entry it displaced, if any
    pub fn insert_upload(&mut self, sequence: u16, completion: Completion) -> Option<Completion> {
        self.uploads.insert(sequence, completion)
    }

    pub fn take_upload(&mut self, sequence: u16) -> Option<Completion> {
        self.uploads.remove(&sequence)
    }

    pub fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            windows: self.windows.len(),
            buffers: self.buffers.len(),
            uploads: self.uploads.len(),
        }
    }
}

/// Table cardinalities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub windows: usize,
    pub buffers: usize,
    pub uploads: usize,
}
