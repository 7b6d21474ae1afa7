//! Error handling for persistent memory operations.

use std::fmt;
use std::io;
use std::result;

/// A specialized `Result` type for persistent memory operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can occur during persistent memory operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred (msync, unmap, deep-flush control file).
    Io(io::Error),

    /// The mapping registry lock could not be acquired.
    RegistryBusy,

    /// A registered range intersects an already tracked mapping.
    OverlappingRange,

    /// The operation is not available on this platform.
    Unsupported,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::RegistryBusy => write!(f, "mapping registry is busy"),
            Error::OverlappingRange => {
                write!(f, "range overlaps an already registered mapping")
            }
            Error::Unsupported => write!(f, "operation not supported on this platform"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
