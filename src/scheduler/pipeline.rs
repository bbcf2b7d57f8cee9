use super::ChunkSource;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use jitmux_av::{TranscodeEngine, TranscodeWorker};
use jitmux_media::{SegmentAdapter, Transmuxer};
use std::sync::Arc;
use tokio::sync::Mutex;

/// [`ChunkSource`] that remuxes through a [`TranscodeWorker`] and shapes the
/// MPEG-TS output into fMP4 appends.
pub struct TranscodePipeline<E> {
    worker: Arc<Mutex<TranscodeWorker<E>>>,
    adapter: SegmentAdapter<Box<dyn Transmuxer>>,
}

impl<E: TranscodeEngine> TranscodePipeline<E> {
    pub fn new(worker: Arc<Mutex<TranscodeWorker<E>>>, transmuxer: Box<dyn Transmuxer>) -> Self {
        Self {
            worker,
            adapter: SegmentAdapter::new(transmuxer),
        }
    }
}

#[async_trait]
impl<E: TranscodeEngine + 'static> ChunkSource for TranscodePipeline<E> {
    async fn fetch(&mut self, start: f64, length: f64, with_init: bool) -> Result<Bytes> {
        let chunk = self.worker.lock().await.remux_chunk(start, Some(length)).await?;
        if chunk.is_empty() {
            return Ok(Bytes::new());
        }

        let data = if with_init {
            self.adapter.transform_first(chunk).await?
        } else {
            self.adapter.transform_next(chunk).await?
        };
        Ok(data)
    }
}
