//! Minimal fMP4 writers for tests and fake transmuxers.
//!
//! These emit just enough structure for [`split_segments`](super::split_segments)
//! and [`InitInfo`](super::InitInfo) to work with: no sample descriptions,
//! no codec configuration.

use crate::mp4::HandlerType;
use bytes::{BufMut, BytesMut};

/// Builder for an `ftyp` + `moov` initialization segment.
#[derive(Debug, Default)]
pub struct InitSegmentBuilder {
    tracks: Vec<(u32, HandlerType, u32)>,
}

impl InitSegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track with the given handler and media timescale.
    pub fn track(mut self, track_id: u32, handler: HandlerType, timescale: u32) -> Self {
        self.tracks.push((track_id, handler, timescale));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(512);

        self.write_ftyp(&mut buf);

        let moov = open_box(&mut buf, b"moov");
        self.write_mvhd(&mut buf);
        for &(track_id, handler, timescale) in &self.tracks {
            write_trak(&mut buf, track_id, handler, timescale);
        }
        let mvex = open_box(&mut buf, b"mvex");
        for &(track_id, _, _) in &self.tracks {
            buf.put_u32(32);
            buf.put_slice(b"trex");
            buf.put_u32(0); // version/flags
            buf.put_u32(track_id);
            buf.put_u32(1); // default sample description index
            buf.put_u32(0); // default sample duration
            buf.put_u32(0); // default sample size
            buf.put_u32(0); // default sample flags
        }
        close_box(&mut buf, mvex);
        close_box(&mut buf, moov);

        buf.to_vec()
    }

    fn write_ftyp(&self, buf: &mut BytesMut) {
        let brands = [b"isom", b"iso5", b"dash", b"mp42"];
        buf.put_u32((16 + brands.len() * 4) as u32);
        buf.put_slice(b"ftyp");
        buf.put_slice(b"isom");
        buf.put_u32(0x200);
        for brand in &brands {
            buf.put_slice(*brand);
        }
    }

    fn write_mvhd(&self, buf: &mut BytesMut) {
        let mvhd = open_box(buf, b"mvhd");
        buf.put_u32(0); // version 0
        buf.put_u32(0); // creation time
        buf.put_u32(0); // modification time
        buf.put_u32(1000);
        buf.put_u32(0); // duration
        buf.put_u32(0x00010000); // rate = 1.0
        buf.put_u16(0x0100); // volume = 1.0
        buf.put_slice(&[0; 10]);
        for m in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
            buf.put_u32(m);
        }
        buf.put_slice(&[0; 24]);
        buf.put_u32(self.tracks.len() as u32 + 1); // next track ID
        close_box(buf, mvhd);
    }
}

fn write_trak(buf: &mut BytesMut, track_id: u32, handler: HandlerType, timescale: u32) {
    let trak = open_box(buf, b"trak");

    let tkhd = open_box(buf, b"tkhd");
    buf.put_u32(0x0000_0003); // version 0, enabled | in movie
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(track_id);
    buf.put_slice(&[0; 8]);
    close_box(buf, tkhd);

    let mdia = open_box(buf, b"mdia");
    let mdhd = open_box(buf, b"mdhd");
    buf.put_u32(0); // version 0
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(timescale);
    buf.put_u32(0); // duration
    buf.put_u16(0x55c4); // language "und"
    buf.put_u16(0);
    close_box(buf, mdhd);

    let hdlr = open_box(buf, b"hdlr");
    buf.put_u32(0);
    buf.put_u32(0); // pre_defined
    buf.put_slice(match handler {
        HandlerType::Video => b"vide",
        HandlerType::Audio => b"soun",
        HandlerType::Text => b"text",
        HandlerType::Unknown(ref code) => code,
    });
    buf.put_slice(&[0; 12]);
    buf.put_u8(0); // empty name
    close_box(buf, hdlr);
    close_box(buf, mdia);

    close_box(buf, trak);
}

/// Builder for a `moof` + `mdat` media fragment.
#[derive(Debug)]
pub struct FragmentBuilder {
    sequence_number: u32,
    trafs: Vec<(u32, u64, Vec<u32>)>,
}

impl FragmentBuilder {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            trafs: Vec::new(),
        }
    }

    /// Add a track fragment with a base decode time and per-sample durations.
    pub fn traf(mut self, track_id: u32, base_media_decode_time: u64, durations: &[u32]) -> Self {
        self.trafs
            .push((track_id, base_media_decode_time, durations.to_vec()));
        self
    }

    /// Serialize `moof` followed by an `mdat` holding `payload`.
    pub fn build(self, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(256 + payload.len());

        let moof = open_box(&mut buf, b"moof");
        buf.put_u32(16);
        buf.put_slice(b"mfhd");
        buf.put_u32(0);
        buf.put_u32(self.sequence_number);

        for (track_id, decode_time, durations) in &self.trafs {
            let traf = open_box(&mut buf, b"traf");

            // default-base-is-moof
            buf.put_u32(16);
            buf.put_slice(b"tfhd");
            buf.put_u32(0x020000);
            buf.put_u32(*track_id);

            buf.put_u32(20);
            buf.put_slice(b"tfdt");
            buf.put_u32(0x01000000); // version 1
            buf.put_u64(*decode_time);

            // sample-duration-present only
            buf.put_u32((16 + durations.len() * 4) as u32);
            buf.put_slice(b"trun");
            buf.put_u32(0x000100);
            buf.put_u32(durations.len() as u32);
            for d in durations {
                buf.put_u32(*d);
            }

            close_box(&mut buf, traf);
        }
        close_box(&mut buf, moof);

        buf.put_u32((8 + payload.len()) as u32);
        buf.put_slice(b"mdat");
        buf.put_slice(payload);

        buf.to_vec()
    }
}

fn open_box(buf: &mut BytesMut, kind: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0); // placeholder
    buf.put_slice(kind);
    start
}

fn close_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}
