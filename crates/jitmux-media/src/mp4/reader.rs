//! In-memory box reader.

use super::{BoxType, Mp4Box};
use crate::{Error, Result};

/// Split `data` into the sequence of boxes at one nesting level.
///
/// A box with size 0 extends to the end of the buffer; size 1 means a 64-bit
/// extended size follows the type code.
pub fn read_boxes(data: &[u8]) -> Result<Vec<Mp4Box<'_>>> {
    let mut boxes = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let mut header = FieldReader::new(&data[pos..]);
        let size = header.u32()? as u64;
        let box_type = BoxType::from_bytes(header.fourcc()?);

        let (actual_size, header_size) = if size == 1 {
            (header.u64()?, 16usize)
        } else if size == 0 {
            ((data.len() - pos) as u64, 8usize)
        } else {
            (size, 8usize)
        };

        if actual_size < header_size as u64 {
            return Err(Error::invalid_mp4(format!(
                "box {} at offset {} has size {} smaller than its header",
                box_type, pos, actual_size
            )));
        }

        let end = pos as u64 + actual_size;
        if end > data.len() as u64 {
            return Err(Error::BufferUnderflow {
                need: end as usize,
                have: data.len(),
            });
        }
        let end = end as usize;

        boxes.push(Mp4Box {
            box_type,
            offset: pos,
            header_size,
            raw: &data[pos..end],
        });

        pos = end;
    }

    Ok(boxes)
}

/// Children of a container box.
pub fn children<'a>(parent: &Mp4Box<'a>) -> Result<Vec<Mp4Box<'a>>> {
    read_boxes(parent.payload())
}

/// First child of `parent` with the given type.
pub fn find_child<'a>(parent: &Mp4Box<'a>, box_type: BoxType) -> Result<Option<Mp4Box<'a>>> {
    Ok(children(parent)?
        .into_iter()
        .find(|b| b.box_type == box_type))
}

/// Big-endian field cursor over a box payload.
#[derive(Debug)]
pub struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let need = self.pos + n;
        if need > self.data.len() {
            return Err(Error::BufferUnderflow {
                need,
                have: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..need];
        self.pos = need;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn fourcc(&mut self) -> Result<[u8; 4]> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    /// Read the full-box version byte and 24-bit flags.
    pub fn version_and_flags(&mut self) -> Result<(u8, u32)> {
        let word = self.u32()?;
        Ok(((word >> 24) as u8, word & 0x00FF_FFFF))
    }
}
