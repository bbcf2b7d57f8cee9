//! Buffer scheduling.
//!
//! [`BufferScheduler`] turns playback position updates into chunk requests.
//! At most one request is in flight at a time; position updates that arrive
//! meanwhile and fall outside the in-flight window collapse into a single
//! follow-up slot, which is re-evaluated once the in-flight request has been
//! appended to the playback buffer.
//!
//! Requests are issued for `[next - 0.1, next + size]`, where `next` is the
//! first unbuffered time at or after the position. The small overlap hides
//! keyframe alignment gaps between consecutive chunks.

mod pipeline;

pub use pipeline::TranscodePipeline;

use crate::playback::PlaybackBuffer;
use crate::session::SessionLog;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use jitmux_av::WorkerState;
use jitmux_common::{TimeRanges, TrackId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex};

/// Overlap, in seconds, added in front of every chunk but the first.
pub const CHUNK_OVERLAP_SECS: f64 = 0.1;

/// Chunk sizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Seconds of media fetched per request.
    pub buffer_size_secs: f64,
    /// A request is issued once less than this much is buffered ahead.
    pub buffer_refill_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            buffer_size_secs: 10.0,
            buffer_refill_secs: 5.0,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.buffer_size_secs > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "buffer size must be positive, got {}",
                self.buffer_size_secs
            )));
        }
        if !(self.buffer_refill_secs > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "buffer refill threshold must be positive, got {}",
                self.buffer_refill_secs
            )));
        }
        if self.buffer_refill_secs > self.buffer_size_secs {
            return Err(Error::InvalidConfig(format!(
                "buffer refill threshold ({}) exceeds buffer size ({})",
                self.buffer_refill_secs, self.buffer_size_secs
            )));
        }
        Ok(())
    }
}

/// End of the buffered range containing `time`, or `time` itself when it is
/// not buffered. A missing buffer counts as nothing buffered from zero.
pub fn first_unbuffered(buffered: Option<&TimeRanges>, time: f64) -> f64 {
    match buffered {
        None => 0.0,
        Some(ranges) => ranges.find(time).map_or(time, |r| r.end),
    }
}

/// Produces playback-buffer data for a time range.
#[async_trait]
pub trait ChunkSource: Send {
    /// Fetch `[start, start + length)`.
    ///
    /// With `with_init` the result starts with an init segment. An empty
    /// result means there is nothing to append for the range.
    async fn fetch(&mut self, start: f64, length: f64, with_init: bool) -> Result<Bytes>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ChunkRequest {
    start: f64,
    length: f64,
    generation: u64,
}

#[derive(Debug, Default)]
struct Bookkeeping {
    in_flight: Option<f64>,
    followup: Option<f64>,
    init_delivered: bool,
    generation: u64,
}

struct Shared {
    config: SchedulerConfig,
    state: Mutex<Bookkeeping>,
    in_flight_tx: watch::Sender<Option<f64>>,
    worker_state: watch::Receiver<WorkerState>,
    source: AsyncMutex<Box<dyn ChunkSource>>,
    buffer: Arc<dyn PlaybackBuffer>,
    track: TrackId,
    log: SessionLog,
}

/// Decides when and what to fetch for one playback track.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BufferScheduler {
    shared: Arc<Shared>,
}

impl BufferScheduler {
    pub fn new(
        config: SchedulerConfig,
        worker_state: watch::Receiver<WorkerState>,
        source: Box<dyn ChunkSource>,
        buffer: Arc<dyn PlaybackBuffer>,
        track: TrackId,
        log: SessionLog,
    ) -> Result<Self> {
        config.validate()?;
        let (in_flight_tx, _) = watch::channel(None);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::default(),
                in_flight_tx,
                worker_state,
                source: AsyncMutex::new(source),
                buffer,
                track,
                log,
            }),
        })
    }

    pub fn config(&self) -> SchedulerConfig {
        self.shared.config
    }

    pub fn track(&self) -> TrackId {
        self.shared.track
    }

    /// Start of the request currently in flight.
    pub fn in_flight(&self) -> Option<f64> {
        self.shared.state.lock().in_flight
    }

    /// Watch the in-flight marker. Every claim and release is published.
    pub fn watch_in_flight(&self) -> watch::Receiver<Option<f64>> {
        self.shared.in_flight_tx.subscribe()
    }

    /// Position waiting to be re-evaluated after the in-flight request.
    pub fn queued_followup(&self) -> Option<f64> {
        self.shared.state.lock().followup
    }

    /// Currently buffered ranges of the scheduled track.
    pub fn buffered(&self) -> TimeRanges {
        self.shared.buffer.buffered(self.shared.track)
    }

    /// React to the playback position moving to `time`.
    ///
    /// Does nothing until the worker is ready. While a request is in
    /// flight, positions outside its window replace the pending follow-up.
    /// Otherwise a chunk is requested once less than the refill threshold is
    /// buffered ahead of `time`.
    pub async fn on_time_advance(&self, time: f64) -> Result<()> {
        match self.plan(time) {
            Some(request) => self.run(request).await,
            None => Ok(()),
        }
    }

    /// Request `[start, start + length)` directly.
    ///
    /// Fails with [`Error::ConcurrentRequest`] when a request is in flight.
    pub async fn load_chunk(&self, start: f64, length: f64) -> Result<()> {
        let request = {
            let mut state = self.shared.state.lock();
            if let Some(in_flight) = state.in_flight {
                return Err(Error::ConcurrentRequest { in_flight });
            }
            self.claim(&mut state, start, length)
        };
        self.run(request).await
    }

    /// Forget all bookkeeping. Completions of earlier requests are ignored.
    pub fn reset(&self) {
        let mut state = self.shared.state.lock();
        state.generation += 1;
        state.in_flight = None;
        state.followup = None;
        state.init_delivered = false;
        self.shared.in_flight_tx.send_replace(None);
        tracing::debug!(generation = state.generation, "Scheduler reset");
    }

    fn plan(&self, time: f64) -> Option<ChunkRequest> {
        if !self.shared.worker_state.borrow().is_ready() {
            tracing::trace!(time, "Worker not ready, ignoring time update");
            return None;
        }

        let config = self.shared.config;
        let mut state = self.shared.state.lock();

        if let Some(start) = state.in_flight {
            if time < start || time > start + config.buffer_size_secs {
                tracing::trace!(time, in_flight = start, "Queued follow-up");
                state.followup = Some(time);
            }
            return None;
        }

        let buffered = self.shared.buffer.buffered(self.shared.track);
        let next = first_unbuffered(Some(&buffered), time);
        if next - time >= config.buffer_refill_secs {
            return None;
        }

        let start = if next == 0.0 {
            next
        } else {
            next - CHUNK_OVERLAP_SECS
        };
        Some(self.claim(
            &mut state,
            start,
            config.buffer_size_secs + CHUNK_OVERLAP_SECS,
        ))
    }

    fn claim(&self, state: &mut Bookkeeping, start: f64, length: f64) -> ChunkRequest {
        state.in_flight = Some(start);
        self.shared.in_flight_tx.send_replace(Some(start));
        ChunkRequest {
            start,
            length,
            generation: state.generation,
        }
    }

    /// Clear the claim and any follow-up after a failed request.
    fn abandon(&self, generation: u64) {
        let mut state = self.shared.state.lock();
        if state.generation != generation {
            return;
        }
        state.in_flight = None;
        state.followup = None;
        self.shared.in_flight_tx.send_replace(None);
    }

    async fn run(&self, request: ChunkRequest) -> Result<()> {
        let shared = &self.shared;
        let with_init = request.start == 0.0 || !shared.state.lock().init_delivered;

        shared.log.emit(&format!(
            "Remuxing video with time range [{} - {}]",
            request.start,
            request.start + request.length
        ));

        let fetched = {
            let mut source = shared.source.lock().await;
            source.fetch(request.start, request.length, with_init).await
        };

        let data = match fetched {
            Ok(data) => data,
            Err(e) => {
                self.abandon(request.generation);
                return Err(e);
            }
        };

        if data.is_empty() {
            tracing::debug!(start = request.start, "Chunk produced no data");
            self.complete(request.generation, false).await;
            return Ok(());
        }

        if shared.state.lock().generation != request.generation {
            tracing::debug!(start = request.start, "Dropping chunk from a previous session");
            return Ok(());
        }

        let size = data.len();
        let completion = match shared.buffer.append(shared.track, data) {
            Ok(completion) => completion,
            Err(e) => {
                self.abandon(request.generation);
                return Err(e);
            }
        };

        let scheduler = self.clone();
        tokio::spawn(async move {
            let appended = match completion.wait().await {
                Ok(_) => {
                    scheduler.shared.log.emit(&format!(
                        "Added remuxed video with size {:.2} MB to playback buffer",
                        size as f64 / 1_000_000.0
                    ));
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, start = request.start, "Append failed");
                    false
                }
            };
            scheduler
                .complete(request.generation, appended && with_init)
                .await;
        });

        Ok(())
    }

    /// Release the claim and re-evaluate the queued position, if any.
    ///
    /// `init_appended` marks an init segment as accepted by the buffer; only
    /// then do later requests skip it.
    fn complete(&self, generation: u64, init_appended: bool) -> BoxFuture<'static, ()> {
        let scheduler = self.clone();
        async move {
            let followup = {
                let mut state = scheduler.shared.state.lock();
                if state.generation != generation {
                    return;
                }
                if init_appended {
                    state.init_delivered = true;
                }
                state.in_flight = None;
                scheduler.shared.in_flight_tx.send_replace(None);
                state.followup.take()
            };

            if let Some(time) = followup {
                if let Err(e) = scheduler.on_time_advance(time).await {
                    tracing::warn!(error = %e, time, "Follow-up request failed");
                }
            }
        }
        .boxed()
    }
}

impl std::fmt::Debug for BufferScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("BufferScheduler")
            .field("config", &self.shared.config)
            .field("track", &self.shared.track)
            .field("in_flight", &state.in_flight)
            .field("followup", &state.followup)
            .field("generation", &state.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(pairs: &[(f64, f64)]) -> TimeRanges {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_first_unbuffered_without_buffer() {
        assert_eq!(first_unbuffered(None, 12.0), 0.0);
    }

    #[test]
    fn test_first_unbuffered_inside_range() {
        let buffered = ranges(&[(0.0, 10.0), (20.0, 25.0)]);
        assert_eq!(first_unbuffered(Some(&buffered), 4.0), 10.0);
        assert_eq!(first_unbuffered(Some(&buffered), 21.0), 25.0);
    }

    #[test]
    fn test_first_unbuffered_in_gap() {
        let buffered = ranges(&[(0.0, 10.0), (20.0, 25.0)]);
        assert_eq!(first_unbuffered(Some(&buffered), 15.0), 15.0);
        assert_eq!(first_unbuffered(Some(&TimeRanges::new()), 3.0), 3.0);
    }

    #[test]
    fn test_first_unbuffered_at_range_end() {
        let buffered = ranges(&[(0.0, 10.0)]);
        assert_eq!(first_unbuffered(Some(&buffered), 10.0), 10.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(SchedulerConfig::default().validate().is_ok());

        let zero = SchedulerConfig {
            buffer_size_secs: 0.0,
            buffer_refill_secs: 0.0,
        };
        assert!(matches!(zero.validate(), Err(Error::InvalidConfig(_))));

        let refill_too_large = SchedulerConfig {
            buffer_size_secs: 5.0,
            buffer_refill_secs: 6.0,
        };
        assert!(matches!(
            refill_too_large.validate(),
            Err(Error::InvalidConfig(_))
        ));

        let nan = SchedulerConfig {
            buffer_size_secs: f64::NAN,
            buffer_refill_secs: 1.0,
        };
        assert!(nan.validate().is_err());
    }
}
