//! Transcode engine boundary.
//!
//! An engine executes one command at a time and reports progress through an
//! event channel: diagnostic lines, then exactly one terminal event. Engines
//! map their own end-of-work markers (`FFMPEG_END`, `Aborted()`, a process
//! exit) onto [`EngineEvent::Completed`], so callers never match sentinel
//! strings themselves.

mod ffmpeg;

pub use ffmpeg::FfmpegEngine;

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::mpsc;

/// Log line an in-browser style engine prints when a command finishes.
pub const END_SENTINEL: &str = "FFMPEG_END";

/// Log line printed when a command is aborted.
pub const ABORT_SENTINEL: &str = "Aborted()";

/// Assets needed to bring an engine up.
///
/// Retained by the worker for the whole session so crash recovery reloads
/// the same engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineAssets {
    /// Engine program or core reference.
    pub core: String,
    /// Optional module loaded by the core.
    pub wasm: Option<String>,
}

impl EngineAssets {
    pub fn new(core: impl Into<String>) -> Self {
        Self {
            core: core.into(),
            wasm: None,
        }
    }

    pub fn with_wasm(mut self, wasm: impl Into<String>) -> Self {
        self.wasm = Some(wasm.into());
        self
    }
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The command ran to its end (whatever its exit code).
    Finished,
    /// The command was aborted.
    Aborted,
}

/// Event reported while a command executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// One diagnostic line.
    Log(String),
    /// Terminal: the engine is free again.
    Completed(Completion),
    /// Terminal: the engine died and must be reloaded.
    Crashed(String),
}

impl EngineEvent {
    /// Map a raw log line, recognising the completion sentinels.
    pub fn from_line(line: impl Into<String>) -> Self {
        let line = line.into();
        match line.as_str() {
            END_SENTINEL => Self::Completed(Completion::Finished),
            ABORT_SENTINEL => Self::Completed(Completion::Aborted),
            _ => Self::Log(line),
        }
    }
}

/// Sending half of an [`Execution`], held by the engine.
pub type ExecutionSender = mpsc::UnboundedSender<EngineEvent>;

/// Event stream of one running command.
#[derive(Debug)]
pub struct Execution {
    events: mpsc::UnboundedReceiver<EngineEvent>,
}

impl Execution {
    pub fn channel() -> (ExecutionSender, Self) {
        let (tx, events) = mpsc::unbounded_channel();
        (tx, Self { events })
    }

    /// Next event, `None` once the engine dropped its sender.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Drive the execution to its terminal event, handing every log line to
    /// `on_line`. Returns the collected lines.
    ///
    /// # Errors
    ///
    /// [`Error::EngineCrashed`] if the engine crashed or its event stream
    /// closed without a terminal event.
    pub async fn wait<F>(mut self, mut on_line: F) -> Result<(Completion, Vec<String>)>
    where
        F: FnMut(&str),
    {
        let mut lines = Vec::new();
        while let Some(event) = self.next_event().await {
            match event {
                EngineEvent::Log(line) => {
                    on_line(&line);
                    lines.push(line);
                }
                EngineEvent::Completed(completion) => return Ok((completion, lines)),
                EngineEvent::Crashed(message) => return Err(Error::EngineCrashed(message)),
            }
        }
        Err(Error::EngineCrashed(
            "engine event stream closed before completion".to_string(),
        ))
    }
}

/// The opaque transcoding engine.
///
/// Exclusively owned by one worker. Only one `execute` may be running at a
/// time; the worker's state gate enforces this.
#[async_trait]
pub trait TranscodeEngine: Send {
    /// Bring the engine up. Fails with [`Error::EngineLoad`].
    async fn initialize(&mut self, assets: &EngineAssets) -> Result<()>;

    /// Expose `file` to the engine and return the path commands must use.
    async fn mount(&mut self, file: &Path) -> Result<String>;

    /// Start a command.
    ///
    /// An `Err` here means the engine could not even start the command and
    /// is treated as a crash.
    async fn execute(&mut self, args: Vec<String>) -> Result<Execution>;

    /// Engine-side path for an output file named `name`.
    fn output_path(&self, name: &str) -> String;

    /// Read an output file. A missing file reads as empty.
    async fn read_output(&mut self, path: &str) -> Result<Bytes>;

    async fn delete_output(&mut self, path: &str) -> Result<()>;

    /// Tear the engine down. Idempotent.
    fn terminate(&mut self);
}
