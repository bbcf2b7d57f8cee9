//! # jitmux-av
//!
//! Transcode engine boundary and the worker facade built on it.
//!
//! This crate provides:
//! - The [`TranscodeEngine`] trait and an ffmpeg-process implementation
//! - The [`TranscodeWorker`] state machine with crash recovery
//! - Metadata parsing from engine log output and per-stream container policy
//! - An ffmpeg-based [`FfmpegTransmuxer`] (MPEG-TS in, fMP4 out)
//!
//! ## Features
//!
//! - `test-util` - a scripted in-process engine for tests in dependent crates
//!
//! ## Example
//!
//! ```no_run
//! use jitmux_av::{EngineAssets, FfmpegEngine, TranscodeWorker};
//! use std::path::Path;
//!
//! # async fn example() -> jitmux_av::Result<()> {
//! let mut worker = TranscodeWorker::new(FfmpegEngine::new());
//! worker.load(EngineAssets::new("ffmpeg")).await?;
//! let metadata = worker.set_input_file(Path::new("/path/to/movie.mkv")).await?;
//!
//! let video = metadata.primary_video().map(|s| s.id.clone());
//! let audio = metadata.primary_audio().map(|s| s.id.clone());
//! worker.select_streams(video.as_ref(), audio.as_ref())?;
//!
//! let chunk = worker.remux_chunk(0.0, Some(10.1)).await?;
//! println!("{} bytes of MPEG-TS", chunk.len());
//! # Ok(())
//! # }
//! ```

mod command;
mod error;
pub mod engine;
pub mod policy;
pub mod probe;
pub mod remux;
pub mod tools;
pub mod transmux;
pub mod worker;
pub mod workspace;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-exports
pub use command::{ToolCommand, ToolOutput};
pub use engine::{
    Completion, EngineAssets, EngineEvent, Execution, FfmpegEngine, TranscodeEngine,
};
pub use error::{Error, Result};
pub use policy::{classify_audio, classify_video, ContainerPolicy, TargetCodec};
pub use probe::{parse_metadata, MediaMetadata, StreamDescriptor};
pub use tools::{check_tool, check_tools, get_tool_path, require_tool, ToolInfo};
pub use transmux::FfmpegTransmuxer;
pub use worker::{SelectedPolicies, SelectedStream, StreamSelector, TranscodeWorker, WorkerState};
pub use workspace::EngineWorkspace;
