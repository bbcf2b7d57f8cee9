//! Error types for jitmux-media.

use std::io;
use thiserror::Error;

/// Result type for jitmux-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for jitmux-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid MP4 box structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Missing required box.
    #[error("Missing required box: {0}")]
    MissingBox(&'static str),

    /// Buffer too small for operation.
    #[error("Buffer underflow: need {need} bytes, have {have}")]
    BufferUnderflow { need: usize, have: usize },

    /// The first transformed segment carried no initialization segment.
    #[error("Transmuxer produced no initialization segment for the first segment")]
    MissingInitSegment,

    /// The segment transform itself failed.
    #[error("Transmux failed: {0}")]
    Transmux(String),
}

impl Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create a transmux error.
    pub fn transmux(msg: impl Into<String>) -> Self {
        Self::Transmux(msg.into())
    }
}
