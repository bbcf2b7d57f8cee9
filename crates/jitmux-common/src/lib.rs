//! Jitmux-Common: shared ids and time-range types.
//!
//! This crate provides the small vocabulary shared by every jitmux crate:
//!
//! - **Typed IDs**: [`StreamId`] for container streams (`"0:1"`) and
//!   [`TrackId`] for playback buffer tracks
//! - **Core Types**: [`MediaKind`] and the buffered-range set [`TimeRanges`]
//!
//! # Examples
//!
//! ```
//! use jitmux_common::{StreamId, TimeRanges};
//!
//! let id: StreamId = "0:1".parse().unwrap();
//! assert_eq!(id.index(), 1);
//!
//! let mut ranges = TimeRanges::new();
//! ranges.add(0.0, 10.0);
//! assert!(ranges.contains(5.0));
//! ```

pub mod ids;
pub mod types;

pub use ids::*;
pub use types::*;
