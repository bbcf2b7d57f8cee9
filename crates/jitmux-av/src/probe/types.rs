//! Media metadata types.

use jitmux_common::StreamId;
use serde::{Deserialize, Serialize};

/// One elementary stream as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Composite `input:index` id, usable as a `-map` argument.
    pub id: StreamId,
    /// Language tag (e.g. "eng"), when the container carries one.
    pub language: Option<String>,
    /// Free-text codec description (e.g. "h264 (High), yuv420p, 1920x800").
    pub format_description: String,
}

/// Everything a probe learns about an input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Total duration in seconds.
    pub duration_secs: f64,
    /// Video streams in source order.
    pub video_streams: Vec<StreamDescriptor>,
    /// Audio streams in source order.
    pub audio_streams: Vec<StreamDescriptor>,
}

impl MediaMetadata {
    pub fn video_stream(&self, id: &StreamId) -> Option<&StreamDescriptor> {
        self.video_streams.iter().find(|s| &s.id == id)
    }

    pub fn audio_stream(&self, id: &StreamId) -> Option<&StreamDescriptor> {
        self.audio_streams.iter().find(|s| &s.id == id)
    }

    /// Get the first video stream, if any.
    pub fn primary_video(&self) -> Option<&StreamDescriptor> {
        self.video_streams.first()
    }

    /// Get the first audio stream, if any.
    pub fn primary_audio(&self) -> Option<&StreamDescriptor> {
        self.audio_streams.first()
    }
}
