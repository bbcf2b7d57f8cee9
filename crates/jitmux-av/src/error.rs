//! Error types for jitmux-av.

use crate::worker::WorkerState;
use jitmux_common::{MediaKind, StreamId};

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the engine, the worker facade and metadata parsing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An external tool failed to execute.
    #[error("tool execution failed: {tool}: {message}")]
    ToolFailed { tool: String, message: String },

    /// An operation was called in the wrong worker state.
    #[error("{operation} requires the worker to be {expected}, but it is {actual}")]
    InvalidState {
        operation: &'static str,
        expected: WorkerState,
        actual: WorkerState,
    },

    /// No input file has been set with `set_input_file`.
    #[error("no input file set")]
    NoInput,

    /// A chunk was requested before a video stream was selected.
    #[error("no video stream selected")]
    NoVideoStream,

    /// The requested stream id is not in the parsed metadata.
    #[error("no {kind} stream found with id {id}")]
    StreamNotFound { kind: MediaKind, id: StreamId },

    /// The stream's format description has no container policy.
    #[error("unsupported {kind} format description: {format}")]
    UnsupportedFormat { kind: MediaKind, format: String },

    /// Probing produced no usable metadata.
    #[error("probe failed: {0}")]
    ProbeFailed(String),

    /// The engine could not be initialized.
    #[error("engine failed to load: {0}")]
    EngineLoad(String),

    /// The engine crashed while executing a command.
    #[error("engine crashed: {0}")]
    EngineCrashed(String),

    /// The engine crashed again after recovery.
    #[error("engine failed after recovery: {0}")]
    EngineFatal(String),

    /// Engine workspace error.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// fMP4 handling failed.
    #[error(transparent)]
    Media(#[from] jitmux_media::Error),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(kind: MediaKind, format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            kind,
            format: format.into(),
        }
    }

    /// Whether the error came from the engine process dying.
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::EngineCrashed(_))
    }
}
