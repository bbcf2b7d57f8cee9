//! MP4 box parsing over in-memory buffers.
//!
//! Fragmented output arrives from the transmuxer as whole byte buffers, so
//! boxes are read from slices instead of a seekable file.

mod atoms;
mod reader;

pub use atoms::{BoxType, HandlerType, Mp4Box};
pub use reader::{children, find_child, read_boxes, FieldReader};
