//! Fragmented MP4 (fMP4) splitting and fragment timing.
//!
//! A transmuxer writes one contiguous fMP4 byte stream per flush. This module
//! separates it into the initialization segment (`ftyp` + `moov`) and the
//! media segment (`moof` + `mdat` pairs), and reads the decode timeline of
//! media fragments so a playback buffer can report what it holds.

#[cfg(any(test, feature = "test-util"))]
pub mod builder;

use crate::mp4::{children, find_child, read_boxes, BoxType, FieldReader, HandlerType, Mp4Box};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use jitmux_common::TimeRange;

// tfhd flags
const TFHD_BASE_DATA_OFFSET: u32 = 0x000001;
const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x000008;

// trun flags
const TRUN_DATA_OFFSET: u32 = 0x000001;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
const TRUN_SAMPLE_DURATION: u32 = 0x000100;
const TRUN_SAMPLE_SIZE: u32 = 0x000200;
const TRUN_SAMPLE_FLAGS: u32 = 0x000400;
const TRUN_SAMPLE_CTS: u32 = 0x000800;

/// fMP4 stream split into its init and media parts.
#[derive(Debug, Clone, Default)]
pub struct FragmentedOutput {
    /// `ftyp` + `moov`, when the stream carried them.
    pub init_segment: Option<Bytes>,
    /// Every box from the media part, in stream order.
    pub media: Bytes,
    /// Number of `moof` boxes in `media`.
    pub fragment_count: usize,
}

/// Split a contiguous fMP4 stream into init and media segments.
///
/// Padding boxes are dropped; anything that is neither init nor padding is
/// kept in the media part so `styp`/`sidx`/`emsg` survive untouched.
pub fn split_segments(data: &[u8]) -> Result<FragmentedOutput> {
    let mut init = BytesMut::new();
    let mut media = BytesMut::with_capacity(data.len());
    let mut fragment_count = 0;

    for b in read_boxes(data)? {
        if b.box_type.is_init() {
            init.extend_from_slice(b.raw);
        } else if b.box_type.is_padding() {
            continue;
        } else {
            if b.box_type == BoxType::MOOF {
                fragment_count += 1;
            }
            media.extend_from_slice(b.raw);
        }
    }

    Ok(FragmentedOutput {
        init_segment: (!init.is_empty()).then(|| init.freeze()),
        media: media.freeze(),
        fragment_count,
    })
}

/// Timing information for one track of an init segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTiming {
    pub track_id: u32,
    pub handler: HandlerType,
    /// Media timescale (ticks per second).
    pub timescale: u32,
    /// Default sample duration from `trex`, in timescale ticks.
    pub default_sample_duration: u32,
}

/// Decode-time span covered by one track within a media segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSpan {
    pub track_id: u32,
    pub handler: HandlerType,
    pub range: TimeRange,
}

/// Track layout read from an initialization segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitInfo {
    pub tracks: Vec<TrackTiming>,
}

impl InitInfo {
    /// Parse the `moov` of an initialization segment.
    pub fn parse(init: &[u8]) -> Result<Self> {
        let moov = read_boxes(init)?
            .into_iter()
            .find(|b| b.box_type == BoxType::MOOV)
            .ok_or(Error::MissingBox("moov"))?;

        let mut tracks = Vec::new();
        let mut trex_defaults = Vec::new();

        for child in children(&moov)? {
            match child.box_type {
                BoxType::TRAK => tracks.push(parse_trak(&child)?),
                BoxType::MVEX => {
                    for trex in children(&child)? {
                        if trex.box_type == BoxType::TREX {
                            trex_defaults.push(parse_trex(&trex)?);
                        }
                    }
                }
                _ => {}
            }
        }

        for (track_id, duration) in trex_defaults {
            if let Some(track) = tracks.iter_mut().find(|t| t.track_id == track_id) {
                track.default_sample_duration = duration;
            }
        }

        Ok(Self { tracks })
    }

    pub fn track(&self, track_id: u32) -> Option<&TrackTiming> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    /// Per-track decode spans of every fragment in `media`.
    ///
    /// Fragments of the same track are folded into a single span from the
    /// earliest decode time to the latest end. Tracks missing from the init
    /// segment or with a zero timescale are skipped.
    pub fn fragment_spans(&self, media: &[u8]) -> Result<Vec<TrackSpan>> {
        let mut spans: Vec<TrackSpan> = Vec::new();

        for moof in read_boxes(media)?
            .into_iter()
            .filter(|b| b.box_type == BoxType::MOOF)
        {
            for traf in children(&moof)? {
                if traf.box_type != BoxType::TRAF {
                    continue;
                }
                let Some((track_id, start, duration)) = self.traf_timing(&traf)? else {
                    continue;
                };
                let Some(track) = self.track(track_id) else {
                    tracing::trace!(track_id, "Fragment references unknown track");
                    continue;
                };
                if track.timescale == 0 {
                    continue;
                }

                let scale = track.timescale as f64;
                let range = TimeRange::new(start as f64 / scale, (start + duration) as f64 / scale);

                match spans.iter_mut().find(|s| s.track_id == track_id) {
                    Some(span) => {
                        span.range.start = span.range.start.min(range.start);
                        span.range.end = span.range.end.max(range.end);
                    }
                    None => spans.push(TrackSpan {
                        track_id,
                        handler: track.handler,
                        range,
                    }),
                }
            }
        }

        Ok(spans)
    }

    /// `(track_id, base decode time, total duration)` of one `traf`.
    fn traf_timing(&self, traf: &Mp4Box<'_>) -> Result<Option<(u32, u64, u64)>> {
        let Some(tfhd) = find_child(traf, BoxType::TFHD)? else {
            return Ok(None);
        };

        let mut reader = FieldReader::new(tfhd.payload());
        let (_, flags) = reader.version_and_flags()?;
        let track_id = reader.u32()?;
        if flags & TFHD_BASE_DATA_OFFSET != 0 {
            reader.skip(8)?;
        }
        if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
            reader.skip(4)?;
        }
        let default_duration = if flags & TFHD_DEFAULT_SAMPLE_DURATION != 0 {
            reader.u32()?
        } else {
            self.track(track_id)
                .map(|t| t.default_sample_duration)
                .unwrap_or(0)
        };

        let mut base_decode_time = 0u64;
        let mut duration = 0u64;

        for child in children(traf)? {
            match child.box_type {
                BoxType::TFDT => {
                    let mut reader = FieldReader::new(child.payload());
                    let (version, _) = reader.version_and_flags()?;
                    base_decode_time = if version == 1 {
                        reader.u64()?
                    } else {
                        reader.u32()? as u64
                    };
                }
                BoxType::TRUN => {
                    duration += trun_duration(child.payload(), default_duration)?;
                }
                _ => {}
            }
        }

        Ok(Some((track_id, base_decode_time, duration)))
    }
}

/// Intersection of the track spans, the way a muxed source buffer reports
/// what is playable. Falls back to the video span when the tracks do not
/// overlap at all.
pub fn buffered_span(spans: &[TrackSpan]) -> Option<TimeRange> {
    let first = spans.first()?;
    let start = spans.iter().map(|s| s.range.start).fold(first.range.start, f64::max);
    let end = spans.iter().map(|s| s.range.end).fold(first.range.end, f64::min);

    if start < end {
        return Some(TimeRange::new(start, end));
    }

    spans
        .iter()
        .find(|s| s.handler.is_video())
        .map(|s| s.range)
        .filter(|r| r.start < r.end)
}

fn parse_trak(trak: &Mp4Box<'_>) -> Result<TrackTiming> {
    let mut timing = TrackTiming {
        track_id: 0,
        handler: HandlerType::Unknown([0; 4]),
        timescale: 0,
        default_sample_duration: 0,
    };

    for child in children(trak)? {
        match child.box_type {
            BoxType::TKHD => {
                let mut reader = FieldReader::new(child.payload());
                let (version, _) = reader.version_and_flags()?;
                // creation + modification time
                reader.skip(if version == 1 { 16 } else { 8 })?;
                timing.track_id = reader.u32()?;
            }
            BoxType::MDIA => {
                for mdia_child in children(&child)? {
                    match mdia_child.box_type {
                        BoxType::MDHD => {
                            let mut reader = FieldReader::new(mdia_child.payload());
                            let (version, _) = reader.version_and_flags()?;
                            reader.skip(if version == 1 { 16 } else { 8 })?;
                            timing.timescale = reader.u32()?;
                        }
                        BoxType::HDLR => {
                            let mut reader = FieldReader::new(mdia_child.payload());
                            reader.version_and_flags()?;
                            reader.skip(4)?; // pre_defined
                            timing.handler = HandlerType::from_bytes(reader.fourcc()?);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    if timing.track_id == 0 {
        return Err(Error::MissingBox("tkhd"));
    }

    Ok(timing)
}

fn parse_trex(trex: &Mp4Box<'_>) -> Result<(u32, u32)> {
    let mut reader = FieldReader::new(trex.payload());
    reader.version_and_flags()?;
    let track_id = reader.u32()?;
    reader.skip(4)?; // default sample description index
    let default_duration = reader.u32()?;
    Ok((track_id, default_duration))
}

fn trun_duration(payload: &[u8], default_duration: u32) -> Result<u64> {
    let mut reader = FieldReader::new(payload);
    let (_, flags) = reader.version_and_flags()?;
    let sample_count = reader.u32()?;

    if flags & TRUN_DATA_OFFSET != 0 {
        reader.skip(4)?;
    }
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        reader.skip(4)?;
    }

    if flags & TRUN_SAMPLE_DURATION == 0 {
        return Ok(sample_count as u64 * default_duration as u64);
    }

    let mut total = 0u64;
    for _ in 0..sample_count {
        total += reader.u32()? as u64;
        if flags & TRUN_SAMPLE_SIZE != 0 {
            reader.skip(4)?;
        }
        if flags & TRUN_SAMPLE_FLAGS != 0 {
            reader.skip(4)?;
        }
        if flags & TRUN_SAMPLE_CTS != 0 {
            reader.skip(4)?;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::builder::{FragmentBuilder, InitSegmentBuilder};
    use super::*;

    fn init_av() -> Vec<u8> {
        InitSegmentBuilder::new()
            .track(1, HandlerType::Video, 90_000)
            .track(2, HandlerType::Audio, 48_000)
            .build()
    }

    #[test]
    fn test_split_separates_init_and_media() {
        let mut stream = init_av();
        let fragment = FragmentBuilder::new(1)
            .traf(1, 0, &[3000; 30])
            .build(&[0u8; 64]);
        stream.extend_from_slice(&fragment);

        let out = split_segments(&stream).unwrap();
        let init = out.init_segment.unwrap();
        assert_eq!(&init[4..8], b"ftyp");
        assert_eq!(&out.media[4..8], b"moof");
        assert_eq!(out.fragment_count, 1);
        assert_eq!(init.len() + out.media.len(), stream.len());
    }

    #[test]
    fn test_split_media_only() {
        let fragment = FragmentBuilder::new(7).traf(1, 0, &[3000]).build(&[]);
        let out = split_segments(&fragment).unwrap();
        assert!(out.init_segment.is_none());
        assert_eq!(out.media.len(), fragment.len());
    }

    #[test]
    fn test_init_info_reads_tracks() {
        let info = InitInfo::parse(&init_av()).unwrap();
        assert_eq!(info.tracks.len(), 2);
        assert_eq!(info.track(1).unwrap().timescale, 90_000);
        assert!(info.track(1).unwrap().handler.is_video());
        assert_eq!(info.track(2).unwrap().timescale, 48_000);
    }

    #[test]
    fn test_fragment_spans_use_tfdt_and_trun() {
        let info = InitInfo::parse(&init_av()).unwrap();
        // 10 s of video starting at 9.9 s, 10 s of audio starting at 9.9 s.
        let media = FragmentBuilder::new(2)
            .traf(1, 891_000, &[3000; 300])
            .traf(2, 475_200, &[1024; 468])
            .build(&[0u8; 16]);

        let spans = info.fragment_spans(&media).unwrap();
        assert_eq!(spans.len(), 2);
        let video = &spans[0];
        assert!((video.range.start - 9.9).abs() < 1e-9);
        assert!((video.range.end - 19.9).abs() < 1e-9);

        let span = buffered_span(&spans).unwrap();
        assert!((span.start - 9.9).abs() < 1e-9);
        // audio ends slightly earlier: 475200 + 468*1024 = 954432 ticks
        assert!((span.end - 954_432.0 / 48_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_fragment_spans_fold_multiple_fragments() {
        let info = InitInfo::parse(&init_av()).unwrap();
        let mut media = FragmentBuilder::new(1).traf(1, 0, &[90_000; 2]).build(&[]);
        media.extend(FragmentBuilder::new(2).traf(1, 180_000, &[90_000; 2]).build(&[]));

        let spans = info.fragment_spans(&media).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].range, TimeRange::new(0.0, 4.0));
    }

    #[test]
    fn test_buffered_span_falls_back_to_video() {
        let spans = vec![
            TrackSpan {
                track_id: 1,
                handler: HandlerType::Video,
                range: TimeRange::new(0.0, 5.0),
            },
            TrackSpan {
                track_id: 2,
                handler: HandlerType::Audio,
                range: TimeRange::new(6.0, 8.0),
            },
        ];
        assert_eq!(buffered_span(&spans), Some(TimeRange::new(0.0, 5.0)));
        assert_eq!(buffered_span(&[]), None);
    }

    #[test]
    fn test_parse_without_moov_fails() {
        let fragment = FragmentBuilder::new(1).traf(1, 0, &[1]).build(&[]);
        assert!(matches!(
            InitInfo::parse(&fragment),
            Err(Error::MissingBox("moov"))
        ));
    }
}
