//! Backend implementations
//!
//! This module contains the backend trait and its implementations: a real
//! x11rb connection and an in-memory null backend.

mod r#trait;
pub use r#trait::*;

pub mod null;
pub mod x11;

pub use null::NullBackend;
pub use x11::X11Backend;
