//! Playback buffer boundary.
//!
//! A playback buffer accepts fMP4 appends per track and reports which time
//! ranges it can play. Appends complete asynchronously: [`PlaybackBuffer::append`]
//! returns at once with an [`AppendCompletion`] that resolves when the data
//! has been processed, and a track refuses a second append until then.

mod file;

pub use file::FragmentFileBuffer;

use crate::{Error, Result};
use bytes::Bytes;
use jitmux_common::{TimeRanges, TrackId};
use tokio::sync::oneshot;

/// Destination for transformed chunks.
pub trait PlaybackBuffer: Send + Sync {
    /// Reference a player would attach to, e.g. a file URL.
    fn source_ref(&self) -> String;

    /// Total presentation duration in seconds.
    fn set_duration(&self, secs: f64);

    fn duration(&self) -> Option<f64>;

    /// Add a track that accepts data of the given MIME type.
    fn add_track(&self, mime_type: &str) -> Result<TrackId>;

    /// Start appending `data` to `track`.
    ///
    /// Fails with [`Error::BufferBusy`] while a previous append on the same
    /// track has not completed.
    fn append(&self, track: TrackId, data: Bytes) -> Result<AppendCompletion>;

    /// Ranges of `track` that are currently playable. Empty for unknown tracks.
    fn buffered(&self, track: TrackId) -> TimeRanges;
}

/// Sender half of an [`AppendCompletion`].
#[derive(Debug)]
pub struct AppendNotifier {
    tx: oneshot::Sender<Result<usize>>,
}

impl AppendNotifier {
    /// Report the outcome; `Ok` carries the number of bytes appended.
    pub fn notify(self, result: Result<usize>) {
        // The waiter may have gone away, nothing left to tell.
        let _ = self.tx.send(result);
    }
}

/// Pending outcome of one append.
#[derive(Debug)]
pub struct AppendCompletion {
    rx: oneshot::Receiver<Result<usize>>,
}

impl AppendCompletion {
    pub fn channel() -> (AppendNotifier, Self) {
        let (tx, rx) = oneshot::channel();
        (AppendNotifier { tx }, Self { rx })
    }

    /// An append that has already finished.
    pub fn ready(result: Result<usize>) -> Self {
        let (notifier, completion) = Self::channel();
        notifier.notify(result);
        completion
    }

    /// Wait for the append to finish.
    pub async fn wait(self) -> Result<usize> {
        self.rx.await.map_err(|_| Error::AppendAbandoned)?
    }
}
