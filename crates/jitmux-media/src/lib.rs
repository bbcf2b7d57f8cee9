//! jitmux-media: MP4 box reading, fMP4 splitting and the segment transform adapter.
//!
//! # Modules
//!
//! - `mp4` - in-memory box reader
//! - `fmp4` - init/media splitting and fragment decode timing
//! - `transmux` - the [`Transmuxer`] boundary and [`SegmentAdapter`]
//!
//! With the `test-util` feature, `fmp4::builder` exposes minimal init and
//! fragment writers for tests in dependent crates.

pub mod error;
pub mod fmp4;
pub mod mp4;
pub mod transmux;

pub use error::{Error, Result};
pub use fmp4::{buffered_span, split_segments, FragmentedOutput, InitInfo, TrackSpan};
pub use transmux::{SegmentAdapter, TransmuxedSegment, Transmuxer};
