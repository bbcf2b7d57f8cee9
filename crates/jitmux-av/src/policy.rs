//! Output container policy per stream.
//!
//! Decides, from a stream's format description, whether the stream can be
//! copied into the fragmented output as is or must be transcoded first, and
//! which MIME type the playback buffer track gets.

use crate::{Error, Result};
use jitmux_common::MediaKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// MIME type of the muxed H.264 + AAC output track.
pub const VIDEO_MIME: &str = r#"video/mp4; codecs="avc1.64001f, mp4a.40.2""#;

/// MIME type for AAC-LC audio.
pub const AUDIO_MIME: &str = r#"audio/mp4; codecs="mp4a.40.2""#;

const TRANSCODED_AUDIO: &[&str] = &["flac", "mp3", "vorbis", "opus", "ac3", "eac3"];

/// Codec a stream is transcoded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetCodec {
    Aac,
}

impl TargetCodec {
    /// Encoder name passed to the engine.
    pub fn encoder(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
        }
    }
}

impl fmt::Display for TargetCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoder())
    }
}

/// How a selected stream is carried into the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPolicy {
    /// Whether the stream must be transcoded.
    pub convert: bool,
    /// Target codec when converting.
    pub target_codec: Option<TargetCodec>,
    /// MIME type for the playback buffer track.
    pub mime_type: String,
}

impl ContainerPolicy {
    fn passthrough(mime_type: &str) -> Self {
        Self {
            convert: false,
            target_codec: None,
            mime_type: mime_type.to_string(),
        }
    }

    fn transcode(codec: TargetCodec, mime_type: &str) -> Self {
        Self {
            convert: true,
            target_codec: Some(codec),
            mime_type: mime_type.to_string(),
        }
    }
}

/// Policy for a video stream. Only H.264 is accepted, and it is never
/// re-encoded.
pub fn classify_video(format_description: &str) -> Result<ContainerPolicy> {
    if format_description.starts_with("h264") {
        return Ok(ContainerPolicy::passthrough(VIDEO_MIME));
    }
    Err(Error::unsupported(MediaKind::Video, format_description))
}

/// Policy for an audio stream. AAC is copied; a fixed set of other codecs is
/// transcoded to AAC.
pub fn classify_audio(format_description: &str) -> Result<ContainerPolicy> {
    if TRANSCODED_AUDIO
        .iter()
        .any(|prefix| format_description.starts_with(prefix))
    {
        return Ok(ContainerPolicy::transcode(TargetCodec::Aac, AUDIO_MIME));
    }
    if format_description.starts_with("aac") {
        return Ok(ContainerPolicy::passthrough(AUDIO_MIME));
    }
    Err(Error::unsupported(MediaKind::Audio, format_description))
}
