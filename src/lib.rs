//! jitmux - just-in-time transcoding into a progressively filled fMP4 buffer
//!
//! The library wires a [`jitmux_av::TranscodeWorker`] to a playback buffer:
//! the [`scheduler`] decides which time range to remux next from the current
//! playback position, the [`session`] owns one loaded file and its
//! collaborators, and [`playback`] defines the buffer boundary together with
//! a file-backed implementation.

pub mod config;
pub mod error;
pub mod playback;
pub mod scheduler;
pub mod session;

pub use error::{Error, Result};
pub use playback::{AppendCompletion, FragmentFileBuffer, PlaybackBuffer};
pub use scheduler::{first_unbuffered, BufferScheduler, ChunkSource, SchedulerConfig, TranscodePipeline};
pub use session::{Components, FfmpegComponents, LoadedMedia, Session, SessionLog, SessionOptions};
