use super::{AppendCompletion, PlaybackBuffer};
use crate::{Error, Result};
use bytes::Bytes;
use jitmux_common::{TimeRange, TimeRanges, TrackId};
use jitmux_media::{buffered_span, split_segments, InitInfo};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Playback buffer that writes every track to an fMP4 file.
///
/// The first track writes to the configured path, later tracks to
/// `<stem>.track<n>.<ext>` next to it. Buffered ranges are derived from the
/// fragment timing of each append, using the track's last init segment.
#[derive(Debug, Clone)]
pub struct FragmentFileBuffer {
    path: PathBuf,
    state: Arc<Mutex<BufferState>>,
}

#[derive(Debug, Default)]
struct BufferState {
    duration: Option<f64>,
    tracks: Vec<TrackState>,
}

impl BufferState {
    fn track_mut(&mut self, id: TrackId) -> Option<&mut TrackState> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }
}

#[derive(Debug)]
struct TrackState {
    id: TrackId,
    mime_type: String,
    path: PathBuf,
    init: Option<InitInfo>,
    buffered: TimeRanges,
    updating: bool,
    bytes_written: u64,
}

impl FragmentFileBuffer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Arc::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File that receives the data of `track`.
    pub fn track_path(&self, track: TrackId) -> Option<PathBuf> {
        let state = self.state.lock();
        state.tracks.iter().find(|t| t.id == track).map(|t| t.path.clone())
    }

    /// Bytes appended to `track` so far.
    pub fn bytes_written(&self, track: TrackId) -> u64 {
        let state = self.state.lock();
        state
            .tracks
            .iter()
            .find(|t| t.id == track)
            .map_or(0, |t| t.bytes_written)
    }

    pub fn mime_type(&self, track: TrackId) -> Option<String> {
        let state = self.state.lock();
        state.tracks.iter().find(|t| t.id == track).map(|t| t.mime_type.clone())
    }

    fn path_for(&self, id: TrackId) -> PathBuf {
        if id.get() == 1 {
            return self.path.clone();
        }
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "buffer".to_string());
        let ext = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp4".to_string());
        self.path.with_file_name(format!("{stem}.track{}.{ext}", id.get()))
    }
}

impl PlaybackBuffer for FragmentFileBuffer {
    fn source_ref(&self) -> String {
        format!("file://{}", self.path.display())
    }

    fn set_duration(&self, secs: f64) {
        self.state.lock().duration = Some(secs);
    }

    fn duration(&self) -> Option<f64> {
        self.state.lock().duration
    }

    fn add_track(&self, mime_type: &str) -> Result<TrackId> {
        let (id, path) = {
            let mut state = self.state.lock();
            let id = TrackId::new(state.tracks.len() as u32 + 1);
            let path = self.path_for(id);
            state.tracks.push(TrackState {
                id,
                mime_type: mime_type.to_string(),
                path: path.clone(),
                init: None,
                buffered: TimeRanges::new(),
                updating: false,
                bytes_written: 0,
            });
            (id, path)
        };

        if let Err(e) = std::fs::File::create(&path) {
            self.state.lock().tracks.retain(|t| t.id != id);
            return Err(e.into());
        }

        tracing::debug!(track = %id, mime_type, path = %path.display(), "Added playback track");
        Ok(id)
    }

    fn append(&self, track: TrackId, data: Bytes) -> Result<AppendCompletion> {
        let (path, init) = {
            let mut state = self.state.lock();
            let entry = state.track_mut(track).ok_or(Error::UnknownTrack(track))?;
            if entry.updating {
                return Err(Error::BufferBusy(track));
            }
            entry.updating = true;
            (entry.path.clone(), entry.init.clone())
        };

        let (notifier, completion) = AppendCompletion::channel();
        let state = self.state.clone();

        tokio::spawn(async move {
            let len = data.len();
            let result = write_fragments(&path, init.as_ref(), &data).await;

            let mut state = state.lock();
            let Some(entry) = state.track_mut(track) else {
                notifier.notify(Err(Error::UnknownTrack(track)));
                return;
            };
            entry.updating = false;

            match result {
                Ok(appended) => {
                    if let Some(init) = appended.init {
                        entry.init = Some(init);
                    }
                    if let Some(span) = appended.span {
                        entry.buffered.add(span.start, span.end);
                    }
                    entry.bytes_written += len as u64;
                    tracing::trace!(track = %track, bytes = len, buffered = %entry.buffered, "Append complete");
                    notifier.notify(Ok(len));
                }
                Err(e) => {
                    tracing::warn!(track = %track, error = %e, "Append failed");
                    notifier.notify(Err(e));
                }
            }
        });

        Ok(completion)
    }

    fn buffered(&self, track: TrackId) -> TimeRanges {
        let state = self.state.lock();
        state
            .tracks
            .iter()
            .find(|t| t.id == track)
            .map(|t| t.buffered.clone())
            .unwrap_or_default()
    }
}

struct Appended {
    init: Option<InitInfo>,
    span: Option<TimeRange>,
}

async fn write_fragments(path: &Path, init: Option<&InitInfo>, data: &[u8]) -> Result<Appended> {
    let split = split_segments(data)?;
    let new_init = split
        .init_segment
        .as_deref()
        .map(InitInfo::parse)
        .transpose()?;

    let span = if split.media.is_empty() {
        None
    } else {
        let info = new_init
            .as_ref()
            .or(init)
            .ok_or(jitmux_media::Error::MissingInitSegment)?;
        buffered_span(&info.fragment_spans(&split.media)?)
    };

    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;

    Ok(Appended {
        init: new_init,
        span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use jitmux_media::fmp4::builder::{FragmentBuilder, InitSegmentBuilder};
    use jitmux_media::mp4::HandlerType;
    use tempfile::TempDir;

    const VIDEO_MIME: &str = r#"video/mp4; codecs="avc1.64001f, mp4a.40.2""#;

    fn init_segment() -> Vec<u8> {
        InitSegmentBuilder::new()
            .track(1, HandlerType::Video, 1000)
            .track(2, HandlerType::Audio, 1000)
            .build()
    }

    /// One fragment covering `[start, start + secs)` on both tracks.
    fn fragment(seq: u32, start: u64, secs: u32) -> Vec<u8> {
        FragmentBuilder::new(seq)
            .traf(1, start * 1000, &vec![1000; secs as usize])
            .traf(2, start * 1000, &vec![1000; secs as usize])
            .build(&[0u8; 16])
    }

    #[tokio::test]
    async fn test_append_tracks_buffered_ranges() {
        let dir = TempDir::new().unwrap();
        let buffer = FragmentFileBuffer::new(dir.path().join("out.mp4"));
        buffer.set_duration(30.0);
        let track = buffer.add_track(VIDEO_MIME).unwrap();

        let mut first = init_segment();
        first.extend(fragment(1, 0, 10));
        let len = first.len();
        let written = buffer.append(track, Bytes::from(first)).unwrap().wait().await.unwrap();
        assert_eq!(written, len);

        let next = fragment(2, 10, 5);
        buffer.append(track, Bytes::from(next)).unwrap().wait().await.unwrap();

        let ranges = buffer.buffered(track);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges.find(12.0), Some(TimeRange::new(0.0, 15.0)));
        assert_eq!(buffer.duration(), Some(30.0));

        let on_disk = std::fs::metadata(dir.path().join("out.mp4")).unwrap().len();
        assert_eq!(on_disk, buffer.bytes_written(track));
    }

    #[tokio::test]
    async fn test_second_append_while_updating_is_busy() {
        let dir = TempDir::new().unwrap();
        let buffer = FragmentFileBuffer::new(dir.path().join("out.mp4"));
        let track = buffer.add_track(VIDEO_MIME).unwrap();

        let mut first = init_segment();
        first.extend(fragment(1, 0, 2));
        let pending = buffer.append(track, Bytes::from(first)).unwrap();

        assert_matches!(
            buffer.append(track, Bytes::from(fragment(2, 2, 2))),
            Err(Error::BufferBusy(t)) if t == track
        );

        pending.wait().await.unwrap();
        buffer
            .append(track, Bytes::from(fragment(2, 2, 2)))
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert!(buffer.buffered(track).contains(3.5));
    }

    #[tokio::test]
    async fn test_media_before_init_fails_and_releases_track() {
        let dir = TempDir::new().unwrap();
        let buffer = FragmentFileBuffer::new(dir.path().join("out.mp4"));
        let track = buffer.add_track(VIDEO_MIME).unwrap();

        let result = buffer
            .append(track, Bytes::from(fragment(1, 0, 2)))
            .unwrap()
            .wait()
            .await;
        assert_matches!(
            result,
            Err(Error::Media(jitmux_media::Error::MissingInitSegment))
        );
        assert!(buffer.buffered(track).is_empty());

        // The failed append no longer blocks the track.
        let mut first = init_segment();
        first.extend(fragment(1, 0, 2));
        buffer.append(track, Bytes::from(first)).unwrap().wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_track() {
        let dir = TempDir::new().unwrap();
        let buffer = FragmentFileBuffer::new(dir.path().join("out.mp4"));
        let missing = TrackId::new(7);

        assert_matches!(
            buffer.append(missing, Bytes::from_static(b"x")),
            Err(Error::UnknownTrack(_))
        );
        assert!(buffer.buffered(missing).is_empty());
    }

    #[test]
    fn test_track_paths() {
        let dir = TempDir::new().unwrap();
        let buffer = FragmentFileBuffer::new(dir.path().join("movie.mp4"));
        let first = buffer.add_track(VIDEO_MIME).unwrap();
        let second = buffer.add_track(r#"audio/mp4; codecs="mp4a.40.2""#).unwrap();

        assert_eq!(buffer.track_path(first).unwrap(), dir.path().join("movie.mp4"));
        assert_eq!(
            buffer.track_path(second).unwrap(),
            dir.path().join("movie.track2.mp4")
        );
        assert_eq!(buffer.mime_type(first).as_deref(), Some(VIDEO_MIME));
        assert!(buffer.source_ref().starts_with("file://"));
    }

    #[test]
    fn test_concurrent_add_track_ids_are_distinct() {
        let dir = TempDir::new().unwrap();
        let buffer = FragmentFileBuffer::new(dir.path().join("movie.mp4"));

        let mut ids: Vec<u32> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| buffer.add_track(VIDEO_MIME).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap().get()).collect()
        });
        ids.sort_unstable();

        assert_eq!(ids, (1..=8).collect::<Vec<_>>());
        for id in 1..=8 {
            assert!(buffer.track_path(TrackId::new(id)).unwrap().exists());
        }
    }
}
