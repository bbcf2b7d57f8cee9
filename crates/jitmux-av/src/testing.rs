//! Scripted engine for tests.
//!
//! [`ScriptedEngine`] answers probes with canned log lines and remux
//! commands with a small text chunk (`"chunk <seek> <duration>"`) written to
//! an in-memory output store. Crashes and load failures can be injected, and
//! every call is recorded in [`EngineStats`].

use crate::engine::{Completion, EngineAssets, EngineEvent, Execution, TranscodeEngine};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Probe output of a 30 s file with H.264 video, EAC3 and AAC audio.
pub const SAMPLE_PROBE: &[&str] = &[
    "Input #0, matroska,webm, from '/input/sample.mkv':",
    "  Duration: 00:00:30.00, start: 0.000000, bitrate: 2400 kb/s",
    "  Stream #0:0(eng): Video: h264 (High), yuv420p(progressive), 1280x720, 24 fps",
    "  Stream #0:1(eng): Audio: eac3, 48000 Hz, 5.1(side), fltp, 640 kb/s",
    "  Stream #0:2(ger): Audio: aac (LC), 48000 Hz, stereo, fltp",
    "At least one output file must be specified",
];

/// Everything the scripted engine was asked to do.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub initializations: usize,
    pub terminations: usize,
    pub assets: Vec<EngineAssets>,
    pub mounts: Vec<PathBuf>,
    pub executions: Vec<Vec<String>>,
}

type ChunkFn = Arc<dyn Fn(&str, Option<&str>) -> Bytes + Send + Sync>;

/// In-process [`TranscodeEngine`] driven by a script.
pub struct ScriptedEngine {
    probe_lines: Vec<String>,
    chunk: ChunkFn,
    remux_crashes: usize,
    fail_initialize: bool,
    outputs: HashMap<String, Bytes>,
    stats: Arc<Mutex<EngineStats>>,
}

impl ScriptedEngine {
    pub fn new(probe_lines: &[&str]) -> Self {
        Self {
            probe_lines: probe_lines.iter().map(|s| s.to_string()).collect(),
            chunk: Arc::new(|seek, duration| {
                Bytes::from(format!("chunk {} {}", seek, duration.unwrap_or("-")))
            }),
            remux_crashes: 0,
            fail_initialize: false,
            outputs: HashMap::new(),
            stats: Arc::default(),
        }
    }

    /// Crash the next `n` remux commands.
    pub fn crash_on_remux(mut self, n: usize) -> Self {
        self.remux_crashes = n;
        self
    }

    /// Make `initialize` fail.
    pub fn fail_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Produce chunk bytes from the `-ss` and `-t` argument values.
    pub fn chunk_output<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Option<&str>) -> Bytes + Send + Sync + 'static,
    {
        self.chunk = Arc::new(f);
        self
    }

    /// Shared handle to the call record.
    pub fn stats(&self) -> Arc<Mutex<EngineStats>> {
        self.stats.clone()
    }

    /// Output files that have not been deleted.
    pub fn stored_outputs(&self) -> Vec<String> {
        self.outputs.keys().cloned().collect()
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[async_trait]
impl TranscodeEngine for ScriptedEngine {
    async fn initialize(&mut self, assets: &EngineAssets) -> Result<()> {
        let mut stats = self.stats.lock();
        stats.assets.push(assets.clone());
        if self.fail_initialize {
            return Err(Error::EngineLoad("scripted load failure".to_string()));
        }
        stats.initializations += 1;
        Ok(())
    }

    async fn mount(&mut self, file: &Path) -> Result<String> {
        self.stats.lock().mounts.push(file.to_path_buf());
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("/input/{name}"))
    }

    async fn execute(&mut self, args: Vec<String>) -> Result<Execution> {
        self.stats.lock().executions.push(args.clone());
        let (tx, execution) = Execution::channel();

        let is_remux = args.iter().any(|a| a == "-map");
        if !is_remux {
            for line in &self.probe_lines {
                let _ = tx.send(EngineEvent::Log(line.clone()));
            }
            let _ = tx.send(EngineEvent::Completed(Completion::Finished));
            return Ok(execution);
        }

        if self.remux_crashes > 0 {
            self.remux_crashes -= 1;
            let _ = tx.send(EngineEvent::Crashed("scripted crash".to_string()));
            return Ok(execution);
        }

        let seek = arg_value(&args, "-ss").unwrap_or("0");
        let data = (self.chunk)(seek, arg_value(&args, "-t"));
        if let Some(output) = args.last() {
            if !data.is_empty() {
                self.outputs.insert(output.clone(), data);
            }
        }
        let _ = tx.send(EngineEvent::Log(format!("remuxed from {seek}")));
        let _ = tx.send(EngineEvent::Completed(Completion::Finished));
        Ok(execution)
    }

    fn output_path(&self, name: &str) -> String {
        format!("/output/{name}")
    }

    async fn read_output(&mut self, path: &str) -> Result<Bytes> {
        Ok(self.outputs.get(path).cloned().unwrap_or_default())
    }

    async fn delete_output(&mut self, path: &str) -> Result<()> {
        self.outputs.remove(path);
        Ok(())
    }

    fn terminate(&mut self) {
        self.stats.lock().terminations += 1;
    }
}
