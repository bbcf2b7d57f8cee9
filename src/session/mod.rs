//! Playback session orchestration.
//!
//! A [`Session`] owns at most one loaded file: the transcode worker probing
//! and remuxing it, the playback buffer receiving fMP4, and, once playback
//! has started, the [`BufferScheduler`] feeding that buffer. Loading another
//! file or calling [`Session::reset`] tears all of it down.

mod components;
mod log;

pub use components::{Components, FfmpegComponents};
pub use log::SessionLog;

use crate::playback::PlaybackBuffer;
use crate::scheduler::{BufferScheduler, SchedulerConfig, TranscodePipeline};
use crate::{Error, Result};
use jitmux_av::{
    EngineAssets, MediaMetadata, StreamDescriptor, StreamSelector, TranscodeWorker, WorkerState,
};
use jitmux_common::{StreamId, TimeRanges};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

/// Settings shared by every file a session loads.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub assets: EngineAssets,
    pub scheduler: SchedulerConfig,
}

impl SessionOptions {
    pub fn new(assets: EngineAssets) -> Self {
        Self {
            assets,
            scheduler: SchedulerConfig::default(),
        }
    }

    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }
}

/// What a player needs to know after a file was loaded.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedMedia {
    pub session_id: Uuid,
    /// Reference to attach the player to.
    pub source: String,
    pub duration_secs: f64,
    pub video_streams: Vec<StreamDescriptor>,
    pub audio_streams: Vec<StreamDescriptor>,
}

struct MediaSession<E> {
    id: Uuid,
    worker: Arc<Mutex<TranscodeWorker<E>>>,
    worker_state: watch::Receiver<WorkerState>,
    selector: StreamSelector,
    metadata: Arc<MediaMetadata>,
    buffer: Arc<dyn PlaybackBuffer>,
    scheduler: Option<BufferScheduler>,
}

/// One player's view of one file at a time.
pub struct Session<C: Components> {
    components: C,
    options: SessionOptions,
    log: SessionLog,
    generation: u64,
    media: Option<MediaSession<C::Engine>>,
}

impl<C: Components> Session<C> {
    pub fn new(components: C, options: SessionOptions) -> Result<Self> {
        options.scheduler.validate()?;
        Ok(Self {
            components,
            options,
            log: SessionLog::new(),
            generation: 0,
            media: None,
        })
    }

    /// Register a callback receiving every session log message.
    pub fn add_log_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log.add_callback(callback);
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// Number of resets so far, including the implicit one of `load_media`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Load `path`: start a worker, probe the file and create a playback
    /// buffer for it. Anything loaded before is torn down first.
    pub async fn load_media(&mut self, path: &Path) -> Result<LoadedMedia> {
        self.reset();

        self.log.emit("Starting transcode worker");
        let mut worker = TranscodeWorker::new(self.components.engine());

        let opened = async {
            worker.load(self.options.assets.clone()).await?;
            let metadata = worker.set_input_file(path).await?;
            let buffer = self.components.playback_buffer()?;
            Ok::<_, Error>((metadata, buffer))
        }
        .await;

        let (metadata, buffer) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                worker.terminate();
                return Err(e);
            }
        };

        self.log_metadata(&metadata);

        let id = Uuid::new_v4();
        tracing::info!(session_id = %id, path = %path.display(), "Media loaded");

        let loaded = LoadedMedia {
            session_id: id,
            source: buffer.source_ref(),
            duration_secs: metadata.duration_secs,
            video_streams: metadata.video_streams.clone(),
            audio_streams: metadata.audio_streams.clone(),
        };

        self.media = Some(MediaSession {
            id,
            worker_state: worker.watch_state(),
            selector: worker.selector(),
            worker: Arc::new(Mutex::new(worker)),
            metadata,
            buffer,
            scheduler: None,
        });
        Ok(loaded)
    }

    /// Select streams, size the playback buffer and request the first chunk.
    pub async fn start(&mut self, video: &StreamId, audio: Option<&StreamId>) -> Result<()> {
        let media = self.media.as_mut().ok_or(Error::NotLoaded)?;
        if media.scheduler.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let policies = media.selector.select_streams(Some(video), audio)?;
        let video_policy = policies.video.ok_or(jitmux_av::Error::NoVideoStream)?;

        media.buffer.set_duration(media.metadata.duration_secs);
        let track = media.buffer.add_track(&video_policy.mime_type)?;

        let source = TranscodePipeline::new(media.worker.clone(), self.components.transmuxer()?);
        let scheduler = BufferScheduler::new(
            self.options.scheduler,
            media.worker_state.clone(),
            Box::new(source),
            media.buffer.clone(),
            track,
            self.log.clone(),
        )?;
        media.scheduler = Some(scheduler.clone());

        tracing::info!(
            session_id = %media.id,
            video = %video,
            audio = audio.map(|a| a.to_string()).as_deref().unwrap_or("none"),
            mime_type = %video_policy.mime_type,
            "Playback started"
        );
        scheduler.on_time_advance(0.0).await
    }

    /// Forward a playback position update to the scheduler.
    pub async fn on_time_advance(&self, time: f64) -> Result<()> {
        self.scheduler()?.on_time_advance(time).await
    }

    /// Switch the audio stream used by future chunks.
    pub fn set_audio_stream(&self, id: &StreamId) -> Result<()> {
        let media = self.media.as_ref().ok_or(Error::NotLoaded)?;
        media.selector.select_streams(None, Some(id))?;
        self.log.emit(&format!("Switched audio stream to {id}"));
        Ok(())
    }

    /// Id of the loaded media, regenerated by every `load_media`.
    pub fn id(&self) -> Option<Uuid> {
        self.media.as_ref().map(|m| m.id)
    }

    pub fn metadata(&self) -> Option<Arc<MediaMetadata>> {
        self.media.as_ref().map(|m| m.metadata.clone())
    }

    pub fn audio_streams(&self) -> Vec<StreamDescriptor> {
        self.media
            .as_ref()
            .map(|m| m.metadata.audio_streams.clone())
            .unwrap_or_default()
    }

    pub fn scheduler(&self) -> Result<BufferScheduler> {
        let media = self.media.as_ref().ok_or(Error::NotLoaded)?;
        media.scheduler.clone().ok_or(Error::NotStarted)
    }

    pub fn playback_buffer(&self) -> Option<Arc<dyn PlaybackBuffer>> {
        self.media.as_ref().map(|m| m.buffer.clone())
    }

    /// Ranges buffered for the playing track.
    pub fn buffered(&self) -> Result<TimeRanges> {
        Ok(self.scheduler()?.buffered())
    }

    pub fn worker_state(&self) -> Option<WorkerState> {
        self.media.as_ref().map(|m| *m.worker_state.borrow())
    }

    /// Drop the loaded file and stop its worker.
    ///
    /// Chunks still in flight finish on their own; their results are
    /// discarded.
    pub fn reset(&mut self) {
        self.generation += 1;
        let Some(media) = self.media.take() else {
            return;
        };

        if let Some(scheduler) = &media.scheduler {
            scheduler.reset();
        }

        match media.worker.try_lock() {
            Ok(mut worker) => worker.terminate(),
            Err(_) => {
                // A chunk is being remuxed; stop the engine once it is released.
                let worker = media.worker.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move { worker.lock().await.terminate() });
                    }
                    Err(_) => tracing::warn!("No runtime to terminate busy worker on reset"),
                }
            }
        }

        tracing::debug!(session_id = %media.id, generation = self.generation, "Session reset");
    }

    fn log_metadata(&self, metadata: &MediaMetadata) {
        self.log.emit("Parsed metadata:");
        self.log.emit(&format!("  Duration: {}s", metadata.duration_secs));
        for (kind, streams) in [
            ("Video", &metadata.video_streams),
            ("Audio", &metadata.audio_streams),
        ] {
            for stream in streams {
                self.log.emit(&format!(
                    "  {kind} stream {}({}): {}",
                    stream.id,
                    stream.language.as_deref().unwrap_or("n/a"),
                    stream.format_description
                ));
            }
        }
    }
}

impl<C: Components> Drop for Session<C> {
    fn drop(&mut self) {
        self.reset();
    }
}
