//! Error type for the jitmux library.

use jitmux_common::TrackId;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the scheduler, the playback buffer and the session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Worker, engine, probing or stream selection failure.
    #[error(transparent)]
    Av(#[from] jitmux_av::Error),

    /// Segment transform or fMP4 parsing failure.
    #[error(transparent)]
    Media(#[from] jitmux_media::Error),

    /// A chunk was requested while another one was still in flight.
    #[error("chunk request issued while the request at {in_flight}s is still in flight")]
    ConcurrentRequest { in_flight: f64 },

    /// The track already has an append outstanding.
    #[error("playback buffer {0} is still processing an append")]
    BufferBusy(TrackId),

    /// The track was never added to the buffer.
    #[error("playback buffer has no {0}")]
    UnknownTrack(TrackId),

    /// The buffer dropped an append without reporting its outcome.
    #[error("append was abandoned before completing")]
    AppendAbandoned,

    /// No media has been loaded into the session.
    #[error("no media loaded")]
    NotLoaded,

    /// Playback has not been started for the loaded media.
    #[error("playback not started")]
    NotStarted,

    /// Playback was already started for the loaded media.
    #[error("playback already started")]
    AlreadyStarted,

    /// Scheduler or session settings are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
