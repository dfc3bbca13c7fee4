//! x11screen - X11 screen driver
//!
//! Owns one connection to an X server and hands out top-level windows with
//! ordered event channels, MIT-SHM backed pixel buffers and RENDER textures.
//! A dispatch thread routes incoming events to windows and matches upload
//! completions with the requests that caused them.

pub mod backend;
pub mod config;
pub mod error;
pub mod resources;
pub mod screen;

pub use backend::{Backend, NullBackend, X11Backend, Xid};
pub use config::{ScreenConfig, WindowOptions};
pub use error::{Error, Result};
pub use resources::{ResourceCounts, UploadedEvent};
pub use screen::{Buffer, Point, Rect, Screen, Size, Texture, UploadRecipient, Window};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
