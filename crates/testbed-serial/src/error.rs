//! Channel errors

use thiserror::Error;

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Serial endpoint could not be opened
    #[error("Failed to open channel {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// Read or write half was already handed out
    #[error("Channel {0} {1} half already taken")]
    HalfTaken(String, &'static str),

    #[error("Channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel closed")]
    Closed,
}
