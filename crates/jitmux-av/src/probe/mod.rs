//! Metadata parsing from engine diagnostic output.
//!
//! The engine probes an input with `-i <file>` and prints the container
//! summary to its log. Two kinds of lines matter:
//!
//! ```text
//!   Duration: 01:39:42.08, start: 0.000000, bitrate: 6358 kb/s
//!   Stream #0:1(eng): Audio: eac3, 48000 Hz, 5.1(side), fltp, 768 kb/s
//! ```

mod types;

pub use types::*;

use crate::{Error, Result};
use jitmux_common::{MediaKind, StreamId};
use regex::Regex;
use std::sync::LazyLock;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration: (\d+):(\d{2}):([^,]+),").expect("valid duration regex")
});

static STREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*Stream #(?P<id>\d+:\d+)(?:\[0x[0-9a-fA-F]+\])?(?:\((?P<lang>[^)]*)\))?: (?P<kind>\w+): (?P<format>.*)$",
    )
    .expect("valid stream regex")
});

/// Parse engine log lines into [`MediaMetadata`].
///
/// Lines matching neither pattern are ignored. When several duration lines
/// appear the last one wins. Streams other than audio and video are skipped.
///
/// # Errors
///
/// Returns [`Error::ProbeFailed`] if no parseable duration line was seen;
/// metadata is never returned half-filled.
pub fn parse_metadata<I, S>(lines: I) -> Result<MediaMetadata>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut duration_secs = None;
    let mut video_streams = Vec::new();
    let mut audio_streams = Vec::new();

    for line in lines {
        let line = line.as_ref();

        if let Some(duration) = parse_duration(line) {
            duration_secs = Some(duration);
        }

        if let Some((kind, stream)) = parse_stream(line) {
            match kind {
                MediaKind::Video => video_streams.push(stream),
                MediaKind::Audio => audio_streams.push(stream),
                other => tracing::trace!(id = %stream.id, kind = %other, "Ignoring stream"),
            }
        }
    }

    let duration_secs = duration_secs
        .ok_or_else(|| Error::ProbeFailed("no duration found in engine output".to_string()))?;

    Ok(MediaMetadata {
        duration_secs,
        video_streams,
        audio_streams,
    })
}

/// Parse `Duration: HH:MM:SS.ms,` into seconds.
///
/// `Duration: N/A` and other unparseable values yield `None`.
pub fn parse_duration(line: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].trim().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_stream(line: &str) -> Option<(MediaKind, StreamDescriptor)> {
    let caps = STREAM_RE.captures(line)?;
    let id: StreamId = caps["id"].parse().ok()?;
    let language = caps
        .name("lang")
        .map(|m| m.as_str().trim())
        .filter(|lang| !lang.is_empty())
        .map(str::to_string);

    Some((
        MediaKind::from_label(&caps["kind"]),
        StreamDescriptor {
            id,
            language,
            format_description: caps["format"].trim_end().to_string(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"Input #0, matroska,webm, from '/input/movie.mkv':
  Metadata:
    title           : Movie
  Duration: 01:39:42.08, start: 0.000000, bitrate: 6358 kb/s
  Chapters:
    Chapter #0:0: start 0.000000, end 360.000000
  Stream #0:0(eng): Video: h264 (High), yuv420p(tv, bt709, progressive), 1920x800, SAR 1:1 DAR 12:5, 23.98 fps
  Stream #0:1(eng): Audio: eac3, 48000 Hz, 5.1(side), fltp, 768 kb/s (default)
  Stream #0:2(ger): Audio: aac (LC), 48000 Hz, stereo, fltp
  Stream #0:3(eng): Subtitle: subrip
  Stream #0:4: Attachment: ttf
At least one output file must be specified"#;

    #[test]
    fn test_parse_sample_output() {
        let metadata = parse_metadata(SAMPLE.lines()).unwrap();

        assert!((metadata.duration_secs - 5982.08).abs() < 1e-6);
        assert_eq!(metadata.video_streams.len(), 1);
        assert_eq!(metadata.audio_streams.len(), 2);

        let video = &metadata.video_streams[0];
        assert_eq!(video.id.as_str(), "0:0");
        assert_eq!(video.language.as_deref(), Some("eng"));
        assert!(video.format_description.starts_with("h264 (High)"));

        let audio: Vec<_> = metadata
            .audio_streams
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(audio, vec!["0:1", "0:2"]);
        assert_eq!(
            metadata.audio_streams[0].format_description,
            "eac3, 48000 Hz, 5.1(side), fltp, 768 kb/s (default)"
        );
        assert_eq!(metadata.primary_video().map(|s| s.id.as_str()), Some("0:0"));
        assert_eq!(metadata.primary_audio().map(|s| s.id.as_str()), Some("0:1"));
    }

    #[test]
    fn test_last_duration_wins() {
        let lines = [
            "  Duration: 00:00:10.00, start: 0.000000",
            "  Stream #0:0: Video: h264 (Main), yuv420p",
            "  Duration: 00:01:05.50, start: 0.000000",
        ];
        let metadata = parse_metadata(lines).unwrap();
        assert!((metadata.duration_secs - 65.5).abs() < 1e-9);
    }

    #[test]
    fn test_stream_without_language() {
        let metadata = parse_metadata([
            "  Duration: 00:00:01.00,",
            "  Stream #0:0: Video: h264 (High), yuv420p",
            "  Stream #0:1(): Audio: aac (LC), 44100 Hz",
        ])
        .unwrap();
        assert_eq!(metadata.video_streams[0].language, None);
        assert_eq!(metadata.audio_streams[0].language, None);
    }

    #[test]
    fn test_stream_with_pid_suffix() {
        let metadata = parse_metadata([
            "  Duration: 00:00:30.00, start: 1.400000, bitrate: 2000 kb/s",
            "  Stream #0:0[0x100]: Video: h264 (High) ([27][0][0][0] / 0x001B), yuv420p",
            "  Stream #0:1[0x101](eng): Audio: ac3 ([129][0][0][0] / 0x0081), 48000 Hz",
        ])
        .unwrap();
        assert_eq!(metadata.video_streams[0].id.as_str(), "0:0");
        assert_eq!(metadata.audio_streams[0].language.as_deref(), Some("eng"));
        assert!(metadata.audio_streams[0].format_description.starts_with("ac3"));
    }

    #[test]
    fn test_missing_duration_fails() {
        let err = parse_metadata(["  Stream #0:0: Video: h264"]).unwrap_err();
        assert!(matches!(err, Error::ProbeFailed(_)));
    }

    #[test]
    fn test_duration_not_available() {
        assert_eq!(parse_duration("  Duration: N/A, bitrate: N/A"), None);
        assert_eq!(
            parse_duration("  Duration: 00:00:02.50, start: 0.0"),
            Some(2.5)
        );
    }

    #[test]
    fn test_metadata_serializes() {
        let metadata = parse_metadata(SAMPLE.lines()).unwrap();
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["video_streams"][0]["id"], "0:0");
    }
}
