//! Backend trait definition
//!
//! This module defines the trait that every connection to a display server
//! must implement. The trait is minimal and close to the X11 requests the
//! screen coordinator issues, so that the real x11rb connection and the
//! in-memory null backend stay interchangeable.

use crate::error::Result;
use std::os::fd::OwnedFd;
use x11rb::protocol::xproto::EventMask;
use x11rb::protocol::Event;

/// Result type for backend operations
pub type BackendResult<T> = Result<T>;

/// Server assigned resource identifier (window, pixmap, gc, picture, segment)
pub type Xid = u32;

/// Interned atom value
pub type Atom = u32;

/// Full 64-bit request sequence number as tracked by the client
pub type SequenceNumber = u64;

/// Default screen information read at connection setup
#[derive(Debug, Clone)]
pub struct ScreenInfo {
    pub root: Xid,
    pub root_depth: u8,
    pub root_visual: u32,
    pub width: u16,
    pub height: u16,
    /// Every visual of every allowed depth
    pub visuals: Vec<VisualInfo>,
}

/// Visual information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualInfo {
    pub visual_id: u32,
    pub depth: u8,
    pub class: u8,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
}

/// Channel layout of a RENDER direct format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectFormat {
    pub red_shift: u16,
    pub red_mask: u16,
    pub green_shift: u16,
    pub green_mask: u16,
    pub blue_shift: u16,
    pub blue_mask: u16,
    pub alpha_shift: u16,
    pub alpha_mask: u16,
}

/// A pict format advertised by the RENDER extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictFormatInfo {
    pub id: Xid,
    pub depth: u8,
    /// Direct (true color) format, as opposed to indexed
    pub direct: bool,
    pub layout: DirectFormat,
}

/// Window creation parameters
#[derive(Debug, Clone)]
pub struct WindowParams {
    pub id: Xid,
    pub parent: Xid,
    pub depth: u8,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border_width: u16,
    pub visual: u32,
    pub event_mask: Option<EventMask>,
    pub border_pixel: Option<u32>,
    pub colormap: Option<Xid>,
}

/// Parameters of an MIT-SHM PutImage request
#[derive(Debug, Clone, Copy)]
pub struct PutImageParams {
    pub drawable: Xid,
    pub gc: Xid,
    pub total_width: u16,
    pub total_height: u16,
    pub src_x: u16,
    pub src_y: u16,
    pub src_width: u16,
    pub src_height: u16,
    pub dst_x: i16,
    pub dst_y: i16,
    pub depth: u8,
    pub segment: Xid,
}

/// Display server connection trait
///
/// Requests are fire-and-forget unless documented otherwise: an `Err` means
/// the request could not be sent, not that the server rejected it. Server
/// errors for unchecked requests are not reported to the caller. The
/// coordinator shares one backend between the dispatch thread (which only
/// calls `wait_for_event`) and any number of caller threads.
pub trait Backend: Send + Sync {
    /// Get default screen information
    fn screen_info(&self) -> &ScreenInfo;

    /// Whether the server offers the named extension
    fn has_extension(&self, name: &'static str) -> BackendResult<bool>;

    // Resource ids

    /// Allocate a fresh XID; `op` names the allocation in errors
    fn generate_id(&self, op: &'static str) -> BackendResult<Xid>;

    /// Intern an atom (round trip)
    fn intern_atom(&self, name: &str) -> BackendResult<Atom>;

    /// Query every RENDER pict format (round trip)
    fn query_pict_formats(&self) -> BackendResult<Vec<PictFormatInfo>>;

    // Window operations

    /// Create a colormap and wait for the server to accept it
    fn create_colormap(&self, colormap: Xid, window: Xid, visual: u32) -> BackendResult<()>;

    /// Create a new window
    fn create_window(&self, params: &WindowParams) -> BackendResult<()>;

    /// Destroy a window
    fn destroy_window(&self, window: Xid) -> BackendResult<()>;

    /// Map (show) a window
    fn map_window(&self, window: Xid) -> BackendResult<()>;

    /// Replace a property; `data` is already encoded in `format`-bit units
    fn change_property(
        &self,
        window: Xid,
        property: Atom,
        type_: Atom,
        format: u8,
        len: u32,
        data: &[u8],
    ) -> BackendResult<()>;

    // Graphics contexts, pixmaps and pictures

    fn create_gc(&self, gc: Xid, drawable: Xid) -> BackendResult<()>;

    fn free_gc(&self, gc: Xid) -> BackendResult<()>;

    /// Create a pixmap (off-screen drawable)
    fn create_pixmap(
        &self,
        depth: u8,
        pixmap: Xid,
        drawable: Xid,
        width: u16,
        height: u16,
    ) -> BackendResult<()>;

    fn free_pixmap(&self, pixmap: Xid) -> BackendResult<()>;

    /// Bind a RENDER picture to a drawable
    fn create_picture(&self, picture: Xid, drawable: Xid, format: Xid) -> BackendResult<()>;

    fn free_picture(&self, picture: Xid) -> BackendResult<()>;

    // Shared memory

    /// MIT-SHM version as (major, minor) (round trip)
    fn shm_query_version(&self) -> BackendResult<(u16, u16)>;

    /// Hand a shared memory file descriptor to the server and wait for it to
    /// accept the segment
    fn shm_attach_fd(&self, segment: Xid, fd: OwnedFd, read_only: bool) -> BackendResult<()>;

    fn shm_detach(&self, segment: Xid) -> BackendResult<()>;

    /// Copy from a segment to a drawable, asking for a completion event.
    /// Returns the request's sequence number.
    fn shm_put_image(&self, params: &PutImageParams) -> BackendResult<SequenceNumber>;

    // Event handling

    /// Flush any pending requests to the server
    fn flush(&self) -> BackendResult<()>;

    /// Wait for the next event (blocking)
    fn wait_for_event(&self) -> BackendResult<Event>;
}
