//! MPEG-TS to fMP4 transform through an ffmpeg process.

use crate::command::ToolCommand;
use crate::tools::get_tool_path;
use crate::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use jitmux_media::{split_segments, TransmuxedSegment, Transmuxer};
use std::path::PathBuf;

/// Arguments reading MPEG-TS on stdin and writing fragmented MP4 on stdout.
///
/// `empty_moov` keeps samples out of the init segment; `default_base_moof`
/// makes every fragment self-contained so fragments from separate flushes
/// can be appended one after another. Each flush is a fresh muxer, so
/// `frag_discont` together with `-copyts` is what places the first `tfdt` at
/// the chunk's source decode time instead of zero. Without an edit list that
/// `tfdt` is the first sample's decode time.
const TRANSMUX_ARGS: &[&str] = &[
    "-hide_banner",
    "-nostdin",
    "-loglevel",
    "error",
    "-f",
    "mpegts",
    "-i",
    "pipe:0",
    "-map",
    "0",
    "-c",
    "copy",
    "-copyts",
    "-f",
    "mp4",
    "-use_editlist",
    "0",
    "-movflags",
    "empty_moov+default_base_moof+frag_keyframe+frag_discont",
    "pipe:1",
];

/// [`Transmuxer`] that runs one ffmpeg process per flush.
///
/// Fragments land at their position on the playback timeline, so output of
/// consecutive flushes continues where the previous one ended.
#[derive(Debug)]
pub struct FfmpegTransmuxer {
    program: PathBuf,
    pending: BytesMut,
    flushes: u64,
}

impl FfmpegTransmuxer {
    /// Resolve `program` (a path or a name on `PATH`).
    pub fn new(program: &str) -> Result<Self> {
        Ok(Self::with_path(get_tool_path(program)?))
    }

    pub fn with_path(program: PathBuf) -> Self {
        Self {
            program,
            pending: BytesMut::new(),
            flushes: 0,
        }
    }
}

#[async_trait]
impl Transmuxer for FfmpegTransmuxer {
    fn push(&mut self, data: Bytes) {
        self.pending.extend_from_slice(&data);
    }

    async fn flush(&mut self) -> jitmux_media::Result<Vec<TransmuxedSegment>> {
        let input = self.pending.split().freeze();
        if input.is_empty() {
            return Ok(Vec::new());
        }
        self.flushes += 1;

        let output = ToolCommand::new(self.program.clone())
            .args(TRANSMUX_ARGS.iter().copied())
            .stdin(input.clone())
            .execute()
            .await
            .map_err(|e| jitmux_media::Error::transmux(e.to_string()))?;

        let split = split_segments(&output.stdout)?;
        tracing::debug!(
            flush = self.flushes,
            input_bytes = input.len(),
            fragments = split.fragment_count,
            has_init = split.init_segment.is_some(),
            "Transmuxed chunk"
        );

        if split.media.is_empty() && split.init_segment.is_none() {
            return Ok(Vec::new());
        }

        Ok(vec![TransmuxedSegment {
            init_segment: split.init_segment,
            data: split.media,
        }])
    }
}
