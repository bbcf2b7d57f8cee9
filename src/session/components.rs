use crate::playback::{FragmentFileBuffer, PlaybackBuffer};
use crate::Result;
use jitmux_av::{FfmpegEngine, FfmpegTransmuxer, TranscodeEngine};
use jitmux_media::Transmuxer;
use std::path::PathBuf;
use std::sync::Arc;

/// Builds the collaborators of a [`Session`](super::Session).
///
/// A fresh engine and playback buffer are created for every loaded file, a
/// fresh transmuxer whenever playback starts.
pub trait Components: Send + Sync {
    type Engine: TranscodeEngine + 'static;

    fn engine(&self) -> Self::Engine;

    fn transmuxer(&self) -> Result<Box<dyn Transmuxer>>;

    fn playback_buffer(&self) -> Result<Arc<dyn PlaybackBuffer>>;
}

/// ffmpeg processes for remuxing and transmuxing, output to an fMP4 file.
#[derive(Debug, Clone)]
pub struct FfmpegComponents {
    /// Program used for the MPEG-TS to fMP4 step.
    pub transmuxer: String,
    /// File receiving the playback buffer contents.
    pub output: PathBuf,
}

impl FfmpegComponents {
    pub fn new(transmuxer: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            transmuxer: transmuxer.into(),
            output: output.into(),
        }
    }
}

impl Components for FfmpegComponents {
    type Engine = FfmpegEngine;

    fn engine(&self) -> FfmpegEngine {
        FfmpegEngine::new()
    }

    fn transmuxer(&self) -> Result<Box<dyn Transmuxer>> {
        Ok(Box::new(FfmpegTransmuxer::new(&self.transmuxer)?))
    }

    fn playback_buffer(&self) -> Result<Arc<dyn PlaybackBuffer>> {
        Ok(Arc::new(FragmentFileBuffer::new(&self.output)))
    }
}
