//! Screen - the connection coordinator
//!
//! A `Screen` owns one backend connection and everything hanging off it: the
//! interned atoms, the negotiated pict formats, a hidden depth-32 helper
//! window, the window/buffer/upload tables and the dispatch thread that feeds
//! them. Windows, buffers and textures are created through it.

pub mod buffer;
mod dispatch;
pub mod formats;
mod shm;
pub mod texture;
pub mod window;

pub use buffer::Buffer;
pub use formats::PictFormats;
pub use texture::Texture;
pub use window::Window;

use crate::backend::{Atom, Backend, ScreenInfo, WindowParams, Xid};
use crate::config::{ScreenConfig, WindowOptions};
use crate::error::{Error, Result};
use crate::resources::{ResourceCounts, Tables, UploadedEvent};
use byteorder::{ByteOrder, LittleEndian};
use shm::Segment;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use x11rb::protocol::xproto::{AtomEnum, EventMask};
use x11rb::protocol::{render, shm as xshm};

/// Largest width or height of a buffer or texture
pub const MAX_SHM_SIDE: i32 = 0x7fff;

/// Largest byte size of a buffer or texture
pub const MAX_SHM_SIZE: i64 = 0x1000_0000;

const REQUIRED_EXTENSIONS: [&str; 2] = [xshm::X11_EXTENSION_NAME, render::X11_EXTENSION_NAME];

/// First MIT-SHM version with ShmAttachFd
const MIN_SHM_VERSION: (u16, u16) = (1, 2);

/// Events every top-level window listens for
fn window_events() -> EventMask {
    EventMask::KEY_PRESS
        | EventMask::KEY_RELEASE
        | EventMask::BUTTON_PRESS
        | EventMask::BUTTON_RELEASE
        | EventMask::POINTER_MOTION
        | EventMask::EXPOSURE
        | EventMask::STRUCTURE_NOTIFY
        | EventMask::FOCUS_CHANGE
}

/// Requested size of a buffer or texture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Size { width, height }
    }

    /// Check the size against the shared memory limits
    pub fn validate(&self) -> Result<(u16, u16)> {
        let (w, h) = (i64::from(self.width), i64::from(self.height));
        let side = i64::from(MAX_SHM_SIDE);
        if w < 0 || w > side || h < 0 || h > side || 4 * w * h > MAX_SHM_SIZE {
            return Err(Error::InvalidSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok((w as u16, h as u16))
    }

    /// Bytes needed for 32-bit pixels; only meaningful once validated
    pub fn byte_len(&self) -> usize {
        4 * self.width.max(0) as usize * self.height.max(0) as usize
    }
}

/// Position on a destination drawable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

impl Point {
    pub const fn new(x: i16, y: i16) -> Self {
        Point { x, y }
    }
}

/// Rectangle within a buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (u32::from(self.x) + u32::from(self.width))
            .min(u32::from(other.x) + u32::from(other.width));
        let y1 = (u32::from(self.y) + u32::from(self.height))
            .min(u32::from(other.y) + u32::from(other.height));
        Rect {
            x: x0,
            y: y0,
            width: x1.saturating_sub(u32::from(x0)) as u16,
            height: y1.saturating_sub(u32::from(y0)) as u16,
        }
    }
}

/// Receives upload completion notifications
///
/// Called on a dedicated thread, never on the dispatch thread.
pub trait UploadRecipient: Send + Sync {
    fn uploaded(&self, event: UploadedEvent);
}

impl UploadRecipient for Sender<UploadedEvent> {
    fn uploaded(&self, event: UploadedEvent) {
        let _ = self.send(event);
    }
}

/// Atoms interned at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Atoms {
    pub wm_delete_window: Atom,
    pub wm_protocols: Atom,
    pub wm_take_focus: Atom,
}

impl Atoms {
    fn intern(backend: &dyn Backend) -> Result<Atoms> {
        Ok(Atoms {
            wm_delete_window: backend.intern_atom("WM_DELETE_WINDOW")?,
            wm_protocols: backend.intern_atom("WM_PROTOCOLS")?,
            wm_take_focus: backend.intern_atom("WM_TAKE_FOCUS")?,
        })
    }
}

/// Pack atoms as a format-32 property value
pub fn encode_atoms(atoms: &[Atom]) -> Vec<u8> {
    let mut data = vec![0u8; 4 * atoms.len()];
    LittleEndian::write_u32_into(atoms, &mut data);
    data
}

/// The hidden depth-32 window used as parent for pixmaps and textures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Helper {
    pub window: Xid,
    pub gc: Xid,
    pub colormap: Xid,
    pub visual: u32,
}

impl Helper {
    fn create(backend: &dyn Backend, screen: &ScreenInfo) -> Result<Helper> {
        let visual = formats::find_visual(screen, 32)?;
        let colormap = backend.generate_id("NewColormapId")?;
        backend.create_colormap(colormap, screen.root, visual)?;

        let window = backend.generate_id("NewWindowId")?;
        let gc = backend.generate_id("NewGcontextId")?;
        backend.create_window(&WindowParams {
            id: window,
            parent: screen.root,
            depth: 32,
            x: 0,
            y: 0,
            width: 1,
            height: 1,
            border_width: 0,
            visual,
            event_mask: None,
            border_pixel: Some(0),
            colormap: Some(colormap),
        })?;
        backend.create_gc(gc, window)?;

        Ok(Helper {
            window,
            gc,
            colormap,
            visual,
        })
    }
}

/// State shared by the screen, its resources and the dispatch thread
pub(crate) struct Shared {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) screen: ScreenInfo,
    pub(crate) atoms: Atoms,
    pub(crate) formats: PictFormats,
    pub(crate) helper: Helper,
    pub(crate) config: ScreenConfig,
    tables: Mutex<Tables>,
}

impl Shared {
    /// Lock the tables. Never hold the guard across a blocking call.
    pub(crate) fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cleanup steps for a half-built resource, run newest first unless disarmed
enum Undo {
    DestroyWindow(Xid),
    FreeGC(Xid),
    FreePicture(Xid),
    FreePixmap(Xid),
}

struct Unwind<'a> {
    backend: &'a dyn Backend,
    steps: Vec<Undo>,
}

impl<'a> Unwind<'a> {
    fn new(backend: &'a dyn Backend) -> Self {
        Unwind {
            backend,
            steps: Vec::new(),
        }
    }

    fn push(&mut self, undo: Undo) {
        self.steps.push(undo);
    }

    fn disarm(mut self) {
        self.steps.clear();
    }
}

impl Drop for Unwind<'_> {
    fn drop(&mut self) {
        while let Some(step) = self.steps.pop() {
            let result = match step {
                Undo::DestroyWindow(id) => self.backend.destroy_window(id),
                Undo::FreeGC(id) => self.backend.free_gc(id),
                Undo::FreePicture(id) => self.backend.free_picture(id),
                Undo::FreePixmap(id) => self.backend.free_pixmap(id),
            };
            if let Err(e) = result {
                log::warn!("cleanup after failed creation: {}", e);
            }
        }
    }
}

/// Connection coordinator
#[derive(Clone)]
pub struct Screen {
    shared: Arc<Shared>,
}

impl Screen {
    /// Connect to the X server named by `config.display` (or `$DISPLAY`)
    pub fn connect(config: ScreenConfig) -> Result<Screen> {
        let backend = crate::backend::X11Backend::connect(config.display.as_deref())?;
        Self::with_backend(Arc::new(backend), config)
    }

    /// Set up a screen over an already connected backend
    pub fn with_backend<B: Backend + 'static>(
        backend: Arc<B>,
        config: ScreenConfig,
    ) -> Result<Screen> {
        let backend: Arc<dyn Backend> = backend;

        for name in REQUIRED_EXTENSIONS {
            if !backend.has_extension(name)? {
                return Err(Error::MissingExtension(name));
            }
        }
        let (major, minor) = backend.shm_query_version()?;
        if (major, minor) < MIN_SHM_VERSION {
            return Err(Error::UnsupportedShmVersion(major, minor));
        }

        let screen = backend.screen_info().clone();
        let atoms = Atoms::intern(&*backend)?;
        let formats = formats::negotiate(&*backend)?;
        let helper = Helper::create(&*backend, &screen)?;
        backend.flush()?;

        let shared = Arc::new(Shared {
            backend,
            screen,
            atoms,
            formats,
            helper,
            config,
            tables: Mutex::new(Tables::new()),
        });
        dispatch::spawn(Arc::clone(&shared))?;

        log::info!(
            "screen ready: {}x{} depth {} (helper window 0x{:x})",
            shared.screen.width,
            shared.screen.height,
            shared.screen.root_depth,
            shared.helper.window
        );
        Ok(Screen { shared })
    }

    pub fn screen_info(&self) -> &ScreenInfo {
        &self.shared.screen
    }

    pub fn atoms(&self) -> &Atoms {
        &self.shared.atoms
    }

    pub fn formats(&self) -> &PictFormats {
        &self.shared.formats
    }

    pub fn helper(&self) -> &Helper {
        &self.shared.helper
    }

    /// Current sizes of the window, buffer and pending upload tables
    pub fn resource_counts(&self) -> ResourceCounts {
        self.shared.tables().counts()
    }

    /// Create, register and map a top-level window
    pub fn create_window(&self, options: &WindowOptions) -> Result<Window> {
        let shared = &self.shared;
        let backend = &*shared.backend;
        let screen = &shared.screen;

        let id = backend.generate_id("NewWindowId")?;
        let gc = backend.generate_id("NewGcontextId")?;
        let picture = backend.generate_id("NewPictureId")?;
        let format = shared.formats.for_depth(screen.root_depth)?;

        let mut unwind = Unwind::new(backend);
        backend.create_window(&WindowParams {
            id,
            parent: screen.root,
            depth: screen.root_depth,
            x: 0,
            y: 0,
            width: options.width,
            height: options.height,
            border_width: 0,
            visual: screen.root_visual,
            event_mask: Some(window_events()),
            border_pixel: None,
            colormap: None,
        })?;
        unwind.push(Undo::DestroyWindow(id));

        let protocols = [shared.atoms.wm_delete_window, shared.atoms.wm_take_focus];
        backend.change_property(
            id,
            shared.atoms.wm_protocols,
            AtomEnum::ATOM.into(),
            32,
            protocols.len() as u32,
            &encode_atoms(&protocols),
        )?;
        if let Some(title) = &options.title {
            backend.change_property(
                id,
                AtomEnum::WM_NAME.into(),
                AtomEnum::STRING.into(),
                8,
                title.len() as u32,
                title.as_bytes(),
            )?;
        }

        backend.create_gc(gc, id)?;
        unwind.push(Undo::FreeGC(gc));
        backend.create_picture(picture, id, format)?;
        unwind.push(Undo::FreePicture(picture));

        let (events, receiver) = mpsc::sync_channel(shared.config.event_queue_depth);
        if !shared.tables().insert_window(id, events) {
            return Err(Error::IdInUse(id));
        }
        if let Err(e) = backend.map_window(id).and_then(|()| backend.flush()) {
            shared.tables().remove_window(id);
            return Err(e);
        }
        unwind.disarm();

        log::debug!("created window 0x{:x} ({}x{})", id, options.width, options.height);
        Ok(Window::new(
            Arc::clone(shared),
            id,
            gc,
            picture,
            (options.width, options.height),
            receiver,
        ))
    }

    /// Create a shared memory buffer of `size` 32-bit pixels
    pub fn create_buffer(&self, size: Size) -> Result<Buffer> {
        let (width, height) = size.validate()?;
        let backend = &*self.shared.backend;

        let segment = backend.generate_id("NewSegId")?;
        // `mem` unmaps on drop if attaching fails
        let mem = Segment::open(size.byte_len())?;
        backend.shm_attach_fd(segment, mem.server_fd()?, false)?;

        let buffer = Buffer::new(Arc::clone(&self.shared), segment, mem, size);
        self.shared
            .tables()
            .insert_buffer(segment, Arc::clone(buffer.state()));

        log::debug!("created buffer seg=0x{:x} {}x{}", segment, width, height);
        Ok(buffer)
    }

    /// Create a depth-32 texture (pixmap plus picture)
    pub fn create_texture(&self, size: Size) -> Result<Texture> {
        let (width, height) = size.validate()?;
        let shared = &self.shared;
        let backend = &*shared.backend;

        let pixmap = backend.generate_id("NewPixmapId")?;
        let picture = backend.generate_id("NewPictureId")?;

        let mut unwind = Unwind::new(backend);
        backend.create_pixmap(32, pixmap, shared.helper.window, width, height)?;
        unwind.push(Undo::FreePixmap(pixmap));
        backend.create_picture(picture, pixmap, shared.formats.depth32)?;
        unwind.push(Undo::FreePicture(picture));
        backend.flush()?;
        unwind.disarm();

        log::debug!("created texture pixmap=0x{:x} {}x{}", pixmap, width, height);
        Ok(Texture::new(Arc::clone(shared), size, pixmap, picture))
    }
}
