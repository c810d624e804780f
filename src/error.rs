// Crate-level error type.

use crate::hash::config::ConfigError;
use crate::patch::decoder::MalformedPatch;

/// Errors surfaced by sessions, whole-buffer diffing and the file helpers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid pass parameters or schedule.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The patch could not be applied.
    #[error("malformed patch: {0}")]
    MalformedPatch(#[from] MalformedPatch),
    /// The session's cancellation flag was raised.
    #[error("operation cancelled")]
    Cancelled,
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
