//! Error taxonomy shared by the metadata and file tree pipelines.

use std::io;
use thiserror::Error;

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors that can occur while inspecting or listing an image.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The identifier resolves to nothing, even after a pull attempt.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// The container runtime (binary or daemon) cannot be reached at all.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// A runtime call or the export stream failed or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// A tar header could not be decoded.
    #[error("corrupt archive: {0}")]
    ArchiveCorrupt(String),

    /// The runtime answered with output that could not be parsed.
    #[error("invalid runtime response: {0}")]
    InvalidResponse(String),
}

impl ExtractError {
    /// HTTP status an API layer should surface for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ImageNotFound(_) => 404,
            Self::RuntimeUnavailable(_) => 503,
            Self::InvalidResponse(_) => 502,
            Self::Transport(_) | Self::ArchiveCorrupt(_) => 500,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ImageNotFound(_))
    }

    /// Converts a transport failure into an `io::Error` that survives being
    /// wrapped by the tar decoder, see [`ExtractError::from_archive_io`].
    pub(crate) fn into_io(self) -> io::Error {
        let msg = match self {
            Self::Transport(msg) => msg,
            other => other.to_string(),
        };
        io::Error::new(io::ErrorKind::ConnectionAborted, msg)
    }

    /// Classifies an I/O error raised while decoding an archive.
    ///
    /// The tar decoder keeps the original `ErrorKind` when it wraps reader
    /// errors, so stream interruptions are recognized by kind. Everything else
    /// is a decode failure.
    pub(crate) fn from_archive_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionAborted | io::ErrorKind::TimedOut => {
                Self::Transport(err.to_string())
            }
            _ => Self::ArchiveCorrupt(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
