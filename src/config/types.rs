use crate::scheduler::SchedulerConfig;
use crate::session::SessionOptions;
use jitmux_av::EngineAssets;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,
}

impl Config {
    /// Session settings derived from the engine and buffer sections.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::new(self.engine.assets()).scheduler(self.buffer.scheduler_config())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Engine program (path or name on PATH)
    #[serde(default = "default_program")]
    pub core: String,

    /// Optional secondary asset passed to the engine before its arguments
    #[serde(default)]
    pub wasm: Option<String>,

    /// Program used to turn MPEG-TS chunks into fMP4
    #[serde(default = "default_program")]
    pub transmuxer: String,
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            core: default_program(),
            wasm: None,
            transmuxer: default_program(),
        }
    }
}

impl EngineConfig {
    pub fn assets(&self) -> EngineAssets {
        let assets = EngineAssets::new(&self.core);
        match &self.wasm {
            Some(wasm) => assets.with_wasm(wasm),
            None => assets,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Seconds of media remuxed per chunk
    #[serde(default = "default_size_secs")]
    pub size_secs: f64,

    /// Refill once less than this many seconds are buffered ahead
    #[serde(default = "default_refill_secs")]
    pub refill_secs: f64,
}

fn default_size_secs() -> f64 {
    10.0
}

fn default_refill_secs() -> f64 {
    5.0
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            size_secs: default_size_secs(),
            refill_secs: default_refill_secs(),
        }
    }
}

impl BufferConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            buffer_size_secs: self.size_secs,
            buffer_refill_secs: self.refill_secs,
        }
    }
}

/// Simulated player clock used by `jitmux play`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Clock tick interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Media seconds advanced per wall-clock second
    #[serde(default = "default_rate")]
    pub rate: f64,
}

fn default_tick_ms() -> u64 {
    250
}

fn default_rate() -> f64 {
    1.0
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            rate: default_rate(),
        }
    }
}
