//! Shared fixtures for integration tests.
//!
//! Chunks are tiny fMP4 files built with the `jitmux-media` builders: one
//! video and one audio track at a 1 kHz timescale, each fragment carrying a
//! single sample that spans the whole requested range. That keeps buffered
//! ranges exact, e.g. a chunk for `[9.9, 9.9 + 10.1)` buffers `[9.9, 20.0]`.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use jitmux::{Components, FragmentFileBuffer, PlaybackBuffer};
use jitmux_av::testing::{ScriptedEngine, SAMPLE_PROBE};
use jitmux_media::fmp4::builder::{FragmentBuilder, InitSegmentBuilder};
use jitmux_media::mp4::HandlerType;
use jitmux_media::{TransmuxedSegment, Transmuxer};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const TIMESCALE: f64 = 1000.0;

pub fn init_segment() -> Vec<u8> {
    InitSegmentBuilder::new()
        .track(1, HandlerType::Video, TIMESCALE as u32)
        .track(2, HandlerType::Audio, TIMESCALE as u32)
        .build()
}

/// One fragment covering `[start, start + length]` on both tracks.
pub fn fragment(sequence: u32, start: f64, length: f64) -> Vec<u8> {
    let base = (start * TIMESCALE).round() as u64;
    let duration = (length * TIMESCALE).round() as u32;
    FragmentBuilder::new(sequence)
        .traf(1, base, &[duration])
        .traf(2, base, &[duration])
        .build(&[0u8; 32])
}

/// A chunk as a transformed append: init segment first when asked for.
pub fn chunk(sequence: u32, start: f64, length: f64, with_init: bool) -> Bytes {
    let mut out = if with_init { init_segment() } else { Vec::new() };
    out.extend(fragment(sequence, start, length));
    Bytes::from(out)
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

/// Transmuxer that understands the scripted engine's `chunk <seek> <duration>`
/// output and answers every flush the way ffmpeg does: init segment plus one
/// fragment.
#[derive(Debug, Default)]
pub struct TextTransmuxer {
    pending: BytesMut,
    sequence: u32,
}

#[async_trait]
impl Transmuxer for TextTransmuxer {
    fn push(&mut self, data: Bytes) {
        self.pending.extend_from_slice(&data);
    }

    async fn flush(&mut self) -> jitmux_media::Result<Vec<TransmuxedSegment>> {
        let input = self.pending.split().freeze();
        let text = String::from_utf8_lossy(&input);
        let mut parts = text.split_whitespace().skip(1);

        let parse = |s: Option<&str>| s.and_then(|v| v.parse::<f64>().ok());
        let start = parse(parts.next())
            .ok_or_else(|| jitmux_media::Error::transmux(format!("not a chunk: {text}")))?;
        let length = parse(parts.next()).unwrap_or(10.0);

        self.sequence += 1;
        Ok(vec![TransmuxedSegment {
            init_segment: Some(Bytes::from(init_segment())),
            data: Bytes::from(fragment(self.sequence, start, length)),
        }])
    }
}

/// Scripted engine, text transmuxer and a file buffer in a temp dir.
pub struct TestComponents {
    pub dir: TempDir,
    engine: Mutex<Option<ScriptedEngine>>,
}

impl TestComponents {
    pub fn new() -> Self {
        Self::with_engine(ScriptedEngine::new(SAMPLE_PROBE))
    }

    /// Hand out `engine` on the next load.
    pub fn with_engine(engine: ScriptedEngine) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            engine: Mutex::new(Some(engine)),
        }
    }

    pub fn output(&self) -> PathBuf {
        self.dir.path().join("out.mp4")
    }

    /// A file to load; its content is never read by the scripted engine.
    pub fn input(&self) -> PathBuf {
        let path = self.dir.path().join("sample.mkv");
        std::fs::write(&path, b"not really matroska").unwrap();
        path
    }
}

impl Components for TestComponents {
    type Engine = ScriptedEngine;

    fn engine(&self) -> ScriptedEngine {
        self.engine
            .lock()
            .take()
            .unwrap_or_else(|| ScriptedEngine::new(SAMPLE_PROBE))
    }

    fn transmuxer(&self) -> jitmux::Result<Box<dyn Transmuxer>> {
        Ok(Box::new(TextTransmuxer::default()))
    }

    fn playback_buffer(&self) -> jitmux::Result<Arc<dyn PlaybackBuffer>> {
        Ok(Arc::new(FragmentFileBuffer::new(self.output())))
    }
}

pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
