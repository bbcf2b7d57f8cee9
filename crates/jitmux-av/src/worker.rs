//! Transcode worker facade.
//!
//! Wraps a [`TranscodeEngine`] with the state machine the scheduler relies
//! on:
//!
//! ```text
//! Uninitialized --load()--> Initializing --ready--> Idle
//! Idle --set_input_file()--> Idle
//! Idle --remux_chunk()--> Busy --completion--> Idle
//! any --crash--> Uninitialized --reload, remount, retry once--> ...
//! ```
//!
//! State is published on a `watch` channel so readers never need access to
//! the worker itself, which is usually locked by an in-flight chunk.

use crate::engine::{Completion, EngineAssets, TranscodeEngine};
use crate::policy::{classify_audio, classify_video, ContainerPolicy};
use crate::probe::{parse_metadata, MediaMetadata};
use crate::remux::{probe_args, RemuxArgs};
use crate::{Error, Result};
use bytes::Bytes;
use jitmux_common::{MediaKind, StreamId};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Capacity of the engine log broadcast.
const LOG_CHANNEL_CAPACITY: usize = 1024;

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Uninitialized,
    Initializing,
    Idle,
    Busy,
}

impl WorkerState {
    /// Whether the engine is up (idle or busy).
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Idle | Self::Busy)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Idle => "idle",
            Self::Busy => "busy",
        };
        f.write_str(s)
    }
}

/// A selected stream and how it is carried into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedStream {
    pub id: StreamId,
    pub policy: ContainerPolicy,
}

/// Policies of the current selection, as returned by `select_streams`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectedPolicies {
    pub video: Option<ContainerPolicy>,
    pub audio: Option<ContainerPolicy>,
}

#[derive(Debug, Default)]
struct Selection {
    metadata: Option<Arc<MediaMetadata>>,
    video: Option<SelectedStream>,
    audio: Option<SelectedStream>,
}

/// Cloneable handle to the worker's stream selection.
///
/// Selection only feeds the arguments of future chunk requests, so it can be
/// changed while a chunk is being remuxed without waiting for the worker.
#[derive(Debug, Clone, Default)]
pub struct StreamSelector {
    inner: Arc<RwLock<Selection>>,
}

impl StreamSelector {
    /// Select the video and/or audio stream to remux.
    ///
    /// `None` leaves that track's selection unchanged. Both ids are validated
    /// and classified before anything is stored, so a failed call changes
    /// nothing.
    pub fn select_streams(
        &self,
        video: Option<&StreamId>,
        audio: Option<&StreamId>,
    ) -> Result<SelectedPolicies> {
        let mut selection = self.inner.write();
        let metadata = selection.metadata.clone().ok_or(Error::NoInput)?;

        let video = video
            .map(|id| {
                let stream = metadata.video_stream(id).ok_or_else(|| Error::StreamNotFound {
                    kind: MediaKind::Video,
                    id: id.clone(),
                })?;
                Ok::<_, Error>(SelectedStream {
                    id: id.clone(),
                    policy: classify_video(&stream.format_description)?,
                })
            })
            .transpose()?;

        let audio = audio
            .map(|id| {
                let stream = metadata.audio_stream(id).ok_or_else(|| Error::StreamNotFound {
                    kind: MediaKind::Audio,
                    id: id.clone(),
                })?;
                Ok::<_, Error>(SelectedStream {
                    id: id.clone(),
                    policy: classify_audio(&stream.format_description)?,
                })
            })
            .transpose()?;

        if let Some(video) = video {
            tracing::debug!(id = %video.id, convert = video.policy.convert, "Selected video stream");
            selection.video = Some(video);
        }
        if let Some(audio) = audio {
            tracing::debug!(id = %audio.id, convert = audio.policy.convert, "Selected audio stream");
            selection.audio = Some(audio);
        }

        Ok(SelectedPolicies {
            video: selection.video.as_ref().map(|s| s.policy.clone()),
            audio: selection.audio.as_ref().map(|s| s.policy.clone()),
        })
    }

    pub fn video(&self) -> Option<SelectedStream> {
        self.inner.read().video.clone()
    }

    pub fn audio(&self) -> Option<SelectedStream> {
        self.inner.read().audio.clone()
    }

    fn reset(&self, metadata: Option<Arc<MediaMetadata>>) {
        *self.inner.write() = Selection {
            metadata,
            video: None,
            audio: None,
        };
    }
}

#[derive(Debug)]
struct Input {
    source: PathBuf,
    mounted: String,
}

#[derive(Debug)]
enum EngineCommand {
    Probe,
    Remux {
        seek_secs: f64,
        duration_secs: Option<f64>,
        output_name: String,
    },
}

/// Facade over one engine instance.
pub struct TranscodeWorker<E> {
    engine: E,
    state: watch::Sender<WorkerState>,
    assets: Option<EngineAssets>,
    input: Option<Input>,
    metadata: Option<Arc<MediaMetadata>>,
    selector: StreamSelector,
    logs: broadcast::Sender<String>,
    chunks: u64,
}

impl<E: TranscodeEngine> TranscodeWorker<E> {
    pub fn new(engine: E) -> Self {
        let (state, _) = watch::channel(WorkerState::Uninitialized);
        let (logs, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self {
            engine,
            state,
            assets: None,
            input: None,
            metadata: None,
            selector: StreamSelector::default(),
            logs,
            chunks: 0,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Receiver for every diagnostic line the engine prints.
    pub fn subscribe_logs(&self) -> broadcast::Receiver<String> {
        self.logs.subscribe()
    }

    pub fn selector(&self) -> StreamSelector {
        self.selector.clone()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Source path of the current input file.
    pub fn input_path(&self) -> Option<&Path> {
        self.input.as_ref().map(|i| i.source.as_path())
    }

    /// Bring the engine up.
    ///
    /// The assets are kept for the worker's lifetime so crash recovery can
    /// reload the same engine.
    pub async fn load(&mut self, assets: EngineAssets) -> Result<()> {
        self.expect_state("load", WorkerState::Uninitialized)?;
        self.assets = Some(assets.clone());
        self.initialize(&assets).await
    }

    /// Mount `path` and probe it.
    ///
    /// Replaces any previous input, its metadata and the stream selection.
    /// On failure no input is set.
    pub async fn set_input_file(&mut self, path: &Path) -> Result<Arc<MediaMetadata>> {
        self.expect_state("set_input_file", WorkerState::Idle)?;

        let mounted = self.engine.mount(path).await?;
        self.input = Some(Input {
            source: path.to_path_buf(),
            mounted,
        });
        self.metadata = None;
        self.selector.reset(None);

        let result = match self.run(&EngineCommand::Probe).await {
            Ok(lines) => parse_metadata(&lines),
            Err(e) => Err(e),
        };

        match result {
            Ok(metadata) => {
                let metadata = Arc::new(metadata);
                tracing::info!(
                    path = %path.display(),
                    duration_secs = metadata.duration_secs,
                    video_streams = metadata.video_streams.len(),
                    audio_streams = metadata.audio_streams.len(),
                    "Probed input"
                );
                self.metadata = Some(metadata.clone());
                self.selector.reset(Some(metadata.clone()));
                Ok(metadata)
            }
            Err(e) => {
                self.input = None;
                Err(e)
            }
        }
    }

    /// Metadata of the current input.
    pub fn metadata(&self) -> Result<Arc<MediaMetadata>> {
        self.metadata.clone().ok_or(Error::NoInput)
    }

    /// See [`StreamSelector::select_streams`].
    pub fn select_streams(
        &self,
        video: Option<&StreamId>,
        audio: Option<&StreamId>,
    ) -> Result<SelectedPolicies> {
        self.selector.select_streams(video, audio)
    }

    /// Remux `[seek_secs, seek_secs + duration_secs)` of the input into an
    /// MPEG-TS chunk.
    ///
    /// An empty result means the engine produced nothing for that range,
    /// typically because it lies past the end of the input.
    pub async fn remux_chunk(&mut self, seek_secs: f64, duration_secs: Option<f64>) -> Result<Bytes> {
        if self.input.is_none() {
            return Err(Error::NoInput);
        }
        if self.selector.video().is_none() {
            return Err(Error::NoVideoStream);
        }
        self.expect_state("remux_chunk", WorkerState::Idle)?;

        self.chunks += 1;
        let output_name = format!("chunk-{}.ts", self.chunks);
        let command = EngineCommand::Remux {
            seek_secs,
            duration_secs,
            output_name: output_name.clone(),
        };

        self.run(&command).await?;

        // Resolved after the run: recovery may have moved the engine's output dir.
        let output = self.engine.output_path(&output_name);
        let data = self.engine.read_output(&output).await?;
        self.engine.delete_output(&output).await?;

        tracing::debug!(seek_secs, ?duration_secs, bytes = data.len(), "Chunk remuxed");
        Ok(data)
    }

    /// Tear the engine down. Valid in any state and idempotent.
    pub fn terminate(&mut self) {
        self.engine.terminate();
    }

    fn expect_state(&self, operation: &'static str, expected: WorkerState) -> Result<()> {
        let actual = self.state();
        if actual != expected {
            return Err(Error::InvalidState {
                operation,
                expected,
                actual,
            });
        }
        Ok(())
    }

    async fn initialize(&mut self, assets: &EngineAssets) -> Result<()> {
        self.state.send_replace(WorkerState::Initializing);
        match self.engine.initialize(assets).await {
            Ok(()) => {
                self.state.send_replace(WorkerState::Idle);
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(WorkerState::Uninitialized);
                Err(match e {
                    Error::EngineLoad(_) => e,
                    other => Error::EngineLoad(other.to_string()),
                })
            }
        }
    }

    /// Run a command, recovering from one engine crash.
    async fn run(&mut self, command: &EngineCommand) -> Result<Vec<String>> {
        match self.attempt(command).await {
            Err(e) if e.is_crash() => {
                tracing::warn!(error = %e, ?command, "Engine crashed, reloading and retrying");
                self.recover()
                    .await
                    .map_err(|e| Error::EngineFatal(format!("recovery failed: {e}")))?;

                match self.attempt(command).await {
                    Err(Error::EngineCrashed(message)) => Err(Error::EngineFatal(message)),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn attempt(&mut self, command: &EngineCommand) -> Result<Vec<String>> {
        let args = self.command_args(command)?;
        let busy = matches!(command, EngineCommand::Remux { .. });
        if busy {
            self.state.send_replace(WorkerState::Busy);
        }

        let logs = self.logs.clone();
        let result = match self.engine.execute(args).await {
            Ok(execution) => {
                execution
                    .wait(|line| {
                        tracing::trace!(target: "jitmux_av::engine", "{line}");
                        let _ = logs.send(line.to_string());
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((completion, lines)) => {
                if completion == Completion::Aborted {
                    tracing::warn!(?command, "Engine command aborted");
                }
                self.state.send_replace(WorkerState::Idle);
                Ok(lines)
            }
            Err(e) => {
                self.state.send_replace(if e.is_crash() {
                    WorkerState::Uninitialized
                } else {
                    WorkerState::Idle
                });
                Err(e)
            }
        }
    }

    /// Reload the engine with the retained assets and remount the input.
    async fn recover(&mut self) -> Result<()> {
        self.engine.terminate();
        self.state.send_replace(WorkerState::Uninitialized);

        let assets = self
            .assets
            .clone()
            .ok_or_else(|| Error::EngineLoad("no engine assets retained".to_string()))?;
        self.initialize(&assets).await?;

        if let Some(input) = self.input.as_mut() {
            input.mounted = self.engine.mount(&input.source).await?;
        }
        tracing::info!("Engine recovered");
        Ok(())
    }

    fn command_args(&self, command: &EngineCommand) -> Result<Vec<String>> {
        let input = self.input.as_ref().ok_or(Error::NoInput)?;

        match command {
            EngineCommand::Probe => Ok(probe_args(&input.mounted)),
            EngineCommand::Remux {
                seek_secs,
                duration_secs,
                output_name,
            } => {
                let video = self.selector.video().ok_or(Error::NoVideoStream)?;
                let audio = self.selector.audio();
                let output = self.engine.output_path(output_name);

                let mut args = RemuxArgs::new(&input.mounted, &output, *seek_secs)
                    .duration(*duration_secs)
                    .video(&video.id, &video.policy);
                if let Some(audio) = &audio {
                    args = args.audio(&audio.id, &audio.policy);
                }
                Ok(args.build())
            }
        }
    }
}

impl<E> fmt::Debug for TranscodeWorker<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscodeWorker")
            .field("state", &*self.state.borrow())
            .field("input", &self.input)
            .field("chunks", &self.chunks)
            .finish_non_exhaustive()
    }
}
