//! Screen and window configuration
//!
//! `ScreenConfig` is fixed when the screen is opened; `WindowOptions` is
//! passed to every `create_window` call.

/// Default number of events buffered per window before the dispatch thread
/// blocks on that window
pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 64;

/// Connection level configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenConfig {
    /// Display to connect to (e.g. ":1"); `None` uses `$DISPLAY`
    pub display: Option<String>,

    /// Capacity of each window's event channel. Zero makes every delivery a
    /// rendezvous with the window's reader.
    pub event_queue_depth: usize,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        ScreenConfig {
            display: None,
            event_queue_depth: DEFAULT_EVENT_QUEUE_DEPTH,
        }
    }
}

impl ScreenConfig {
    /// Deliver each event only once the window's reader takes it
    pub fn rendezvous() -> Self {
        ScreenConfig {
            event_queue_depth: 0,
            ..ScreenConfig::default()
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn with_event_queue_depth(mut self, depth: usize) -> Self {
        self.event_queue_depth = depth;
        self
    }
}

/// Options for a new top-level window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOptions {
    /// Window title (WM_NAME); left unset when `None`
    pub title: Option<String>,
    pub width: u16,
    pub height: u16,
}

impl Default for WindowOptions {
    fn default() -> Self {
        WindowOptions {
            title: None,
            width: 1024,
            height: 768,
        }
    }
}

impl WindowOptions {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_size(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}
