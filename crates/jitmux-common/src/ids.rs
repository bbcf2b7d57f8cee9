//! Typed ID wrappers for streams and buffer tracks.
//!
//! Stream ids come straight from the engine's diagnostic output and are
//! passed back to it verbatim in `-map` arguments, so [`StreamId`] keeps the
//! original `"<input>:<index>"` text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a stream inside an input container, e.g. `"0:1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Build an id from input and stream indices.
    #[must_use]
    pub fn new(input: u32, index: u32) -> Self {
        Self(format!("{input}:{index}"))
    }

    /// The id as passed to the engine.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Index of the input file this stream belongs to.
    pub fn input(&self) -> u32 {
        self.split().0
    }

    /// Index of the stream within its input.
    pub fn index(&self) -> u32 {
        self.split().1
    }

    fn split(&self) -> (u32, u32) {
        // Validated on construction.
        let (input, index) = self.0.split_once(':').unwrap_or(("0", "0"));
        (input.parse().unwrap_or(0), index.parse().unwrap_or(0))
    }
}

impl FromStr for StreamId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (input, index) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid stream id: {}", s))?;
        let valid = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if valid(input) && valid(index) {
            Ok(Self(s.to_string()))
        } else {
            Err(format!("Invalid stream id: {}", s))
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Handle of a track added to a playback buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(u32);

impl TrackId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_parse() {
        let id: StreamId = "0:1".parse().unwrap();
        assert_eq!(id.as_str(), "0:1");
        assert_eq!(id.input(), 0);
        assert_eq!(id.index(), 1);
        assert_eq!(id, StreamId::new(0, 1));
    }

    #[test]
    fn test_stream_id_rejects_garbage() {
        assert!("".parse::<StreamId>().is_err());
        assert!("0".parse::<StreamId>().is_err());
        assert!("0:".parse::<StreamId>().is_err());
        assert!("a:1".parse::<StreamId>().is_err());
        assert!("0:1:2".parse::<StreamId>().is_err());
    }

    #[test]
    fn test_stream_id_serializes_transparently() {
        let id = StreamId::new(0, 3);
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""0:3""#);
    }

    #[test]
    fn test_track_id_display() {
        assert_eq!(TrackId::new(2).to_string(), "track2");
    }
}
