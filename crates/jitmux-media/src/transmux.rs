//! Segment transform boundary and the first/next segment adapter.
//!
//! A [`Transmuxer`] turns raw container bytes (MPEG-TS chunks from the engine)
//! into fMP4 segments. It is stateful across pushes so timestamps stay
//! continuous, and is only replaced when the session is torn down.
//!
//! [`SegmentAdapter`] wraps a transmuxer and shapes its output for a playback
//! buffer: the first delivered buffer must start with an init segment, every
//! later buffer carries media only.

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

/// One segment emitted by a transmuxer flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmuxedSegment {
    /// Initialization segment, present on the first segment of a stream.
    pub init_segment: Option<Bytes>,
    /// Media segment data.
    pub data: Bytes,
}

/// Raw container bytes in, fMP4 segments out.
#[async_trait]
pub trait Transmuxer: Send {
    /// Queue input bytes for the next flush.
    fn push(&mut self, data: Bytes);

    /// Transform everything pushed since the last flush.
    ///
    /// Returns the segments produced by this flush only.
    async fn flush(&mut self) -> Result<Vec<TransmuxedSegment>>;
}

#[async_trait]
impl<T: Transmuxer + ?Sized> Transmuxer for Box<T> {
    fn push(&mut self, data: Bytes) {
        (**self).push(data)
    }

    async fn flush(&mut self) -> Result<Vec<TransmuxedSegment>> {
        (**self).flush().await
    }
}

/// Shapes transmuxer output into playback-buffer appends.
#[derive(Debug)]
pub struct SegmentAdapter<T> {
    transmuxer: T,
}

impl<T: Transmuxer> SegmentAdapter<T> {
    pub fn new(transmuxer: T) -> Self {
        Self { transmuxer }
    }

    /// Transform `data` and prepend the init segment.
    ///
    /// The init segment of the first emitted segment is placed before the
    /// concatenated media data of every segment from this flush.
    pub async fn transform_first(&mut self, data: Bytes) -> Result<Bytes> {
        let segments = self.run(data).await?;

        let init = segments
            .iter()
            .find_map(|s| s.init_segment.clone())
            .ok_or(Error::MissingInitSegment)?;

        let media_len: usize = segments.iter().map(|s| s.data.len()).sum();
        let mut out = BytesMut::with_capacity(init.len() + media_len);
        out.extend_from_slice(&init);
        for segment in &segments {
            out.extend_from_slice(&segment.data);
        }

        tracing::debug!(
            init_bytes = init.len(),
            media_bytes = media_len,
            "Transformed first segment"
        );
        Ok(out.freeze())
    }

    /// Transform `data` and return media data only.
    ///
    /// Returns empty bytes if the flush produced no segments.
    pub async fn transform_next(&mut self, data: Bytes) -> Result<Bytes> {
        let segments = self.run(data).await?;

        let out = match segments.len() {
            0 => Bytes::new(),
            1 => segments[0].data.clone(),
            _ => {
                let mut out = BytesMut::new();
                for segment in &segments {
                    out.extend_from_slice(&segment.data);
                }
                out.freeze()
            }
        };

        tracing::debug!(media_bytes = out.len(), "Transformed segment");
        Ok(out)
    }

    pub fn into_inner(self) -> T {
        self.transmuxer
    }

    async fn run(&mut self, data: Bytes) -> Result<Vec<TransmuxedSegment>> {
        self.transmuxer.push(data);
        self.transmuxer.flush().await
    }
}
