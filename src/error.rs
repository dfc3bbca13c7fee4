//! Error type shared by the coordinator, the backends and the resource handles

use std::fmt;
use std::io;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while talking to the X server
#[derive(Debug)]
pub enum Error {
    /// Could not open the connection to the display
    Connect(ConnectError),

    /// The connection broke while sending a request or reading an event
    Connection {
        op: &'static str,
        source: ConnectionError,
    },

    /// The server answered a request with an error
    Reply { op: &'static str, source: ReplyError },

    /// The client-side XID range is used up
    IdsExhausted { op: &'static str },

    /// A freshly allocated id is already registered
    IdInUse(u32),

    /// A required extension is not offered by the server
    MissingExtension(&'static str),

    /// MIT-SHM is older than 1.2 and cannot attach file descriptors
    UnsupportedShmVersion(u16, u16),

    /// A buffer or texture size outside the supported range
    InvalidSize { width: i32, height: i32 },

    /// The root window depth is neither 24 nor 32
    UnsupportedDepth(u8),

    /// No RENDER pict format with the BGRA layout for this depth
    NoPictFormat(u8),

    /// No TrueColor visual with 0xff0000/0xff00/0xff masks for this depth
    NoVisual(u8),

    /// Shared memory could not be created or mapped
    Shm { op: &'static str, source: io::Error },

    /// The dispatch thread could not be started
    Spawn(io::Error),
}

impl Error {
    pub(crate) fn connection(op: &'static str) -> impl FnOnce(ConnectionError) -> Error {
        move |source| Error::Connection { op, source }
    }

    pub(crate) fn reply(op: &'static str) -> impl FnOnce(ReplyError) -> Error {
        move |source| Error::Reply { op, source }
    }

    pub(crate) fn id(op: &'static str) -> impl FnOnce(ReplyOrIdError) -> Error {
        move |e| match e {
            ReplyOrIdError::IdsExhausted => Error::IdsExhausted { op },
            ReplyOrIdError::ConnectionError(source) => Error::Connection { op, source },
            ReplyOrIdError::X11Error(e) => Error::Reply {
                op,
                source: ReplyError::X11Error(e),
            },
        }
    }

    pub(crate) fn shm(op: &'static str) -> impl FnOnce(nix::Error) -> Error {
        move |errno| Error::Shm {
            op,
            source: io::Error::from(errno),
        }
    }

    /// Whether this error came from the size guard on buffers and textures
    pub fn is_invalid_size(&self) -> bool {
        matches!(self, Error::InvalidSize { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connect(e) => write!(f, "failed to connect to X display: {}", e),
            Error::Connection { op, source } => write!(f, "{} failed: {}", op, source),
            Error::Reply { op, source } => write!(f, "{} failed: {}", op, source),
            Error::IdsExhausted { op } => write!(f, "{} failed: XID space exhausted", op),
            Error::IdInUse(id) => write!(f, "id 0x{:x} is already registered", id),
            Error::MissingExtension(name) => {
                write!(f, "X server does not support the {} extension", name)
            }
            Error::UnsupportedShmVersion(major, minor) => write!(
                f,
                "MIT-SHM {}.{} cannot attach file descriptors (1.2 required)",
                major, minor
            ),
            Error::InvalidSize { width, height } => {
                write!(f, "invalid buffer size {}x{}", width, height)
            }
            Error::UnsupportedDepth(depth) => write!(f, "unsupported root depth {}", depth),
            Error::NoPictFormat(depth) => write!(f, "no matching Pictformat for depth {}", depth),
            Error::NoVisual(depth) => write!(f, "no matching Visualid for depth {}", depth),
            Error::Shm { op, source } => write!(f, "{} failed: {}", op, source),
            Error::Spawn(e) => write!(f, "failed to start dispatch thread: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connect(e) => Some(e),
            Error::Connection { source, .. } => Some(source),
            Error::Reply { source, .. } => Some(source),
            Error::Shm { source, .. } => Some(source),
            Error::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConnectError> for Error {
    fn from(e: ConnectError) -> Self {
        Error::Connect(e)
    }
}
