//! MP4 box type codes and parsed box views.

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const STYP: Self = Self(*b"styp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TREX: Self = Self(*b"trex");
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const MDAT: Self = Self(*b"mdat");
    pub const SIDX: Self = Self(*b"sidx");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Boxes that belong to the initialization segment.
    pub fn is_init(&self) -> bool {
        matches!(*self, Self::FTYP | Self::MOOV)
    }

    /// Padding boxes that carry nothing a player needs.
    pub fn is_padding(&self) -> bool {
        matches!(*self, Self::FREE | Self::SKIP)
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A box located inside a byte buffer.
#[derive(Debug, Clone, Copy)]
pub struct Mp4Box<'a> {
    /// Box type code.
    pub box_type: BoxType,
    /// Offset of the box header within the parsed buffer.
    pub offset: usize,
    /// Size of the header (8 or 16 bytes).
    pub header_size: usize,
    /// The whole box including its header.
    pub raw: &'a [u8],
}

impl<'a> Mp4Box<'a> {
    /// Box payload (everything after the header).
    pub fn payload(&self) -> &'a [u8] {
        &self.raw[self.header_size..]
    }

    /// Total size including header.
    pub fn size(&self) -> usize {
        self.raw.len()
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Text,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"text" | b"subt" => Self::Text,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }
}
