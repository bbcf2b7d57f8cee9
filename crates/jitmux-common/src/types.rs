//! Core type definitions for streams and buffered time ranges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an elementary stream as reported by the engine (`Video`, `Audio`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video stream.
    Video,
    /// Audio stream.
    Audio,
    /// Subtitle stream.
    Subtitle,
    /// Anything else (data, attachment, ...).
    Other,
}

impl MediaKind {
    /// Map the engine's capitalised stream kind label.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Video" => Self::Video,
            "Audio" => Self::Audio,
            "Subtitle" => Self::Subtitle,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A closed interval of media time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether `time` lies inside the range, both ends inclusive.
    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time <= self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3} - {:.3}]", self.start, self.end)
    }
}

/// Ordered set of disjoint buffered ranges.
///
/// Ranges that overlap or touch are merged on insertion, so iteration always
/// yields strictly increasing, non-overlapping intervals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `[start, end]`, merging with any range it overlaps or touches.
    ///
    /// Empty or inverted intervals are ignored.
    pub fn add(&mut self, start: f64, end: f64) {
        if !(start < end) {
            return;
        }

        let mut merged = TimeRange::new(start, end);
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        let mut inserted = false;

        for range in self.ranges.drain(..) {
            if range.end < merged.start {
                kept.push(range);
            } else if merged.end < range.start {
                if !inserted {
                    kept.push(merged);
                    inserted = true;
                }
                kept.push(range);
            } else {
                merged.start = merged.start.min(range.start);
                merged.end = merged.end.max(range.end);
            }
        }
        if !inserted {
            kept.push(merged);
        }

        self.ranges = kept;
    }

    /// The range containing `time`, if any.
    pub fn find(&self, time: f64) -> Option<TimeRange> {
        self.ranges.iter().copied().find(|r| r.contains(time))
    }

    pub fn contains(&self, time: f64) -> bool {
        self.find(time).is_some()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.ranges.iter()
    }

    /// Total buffered seconds.
    pub fn total(&self) -> f64 {
        self.ranges.iter().map(TimeRange::duration).sum()
    }
}

impl FromIterator<(f64, f64)> for TimeRanges {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        let mut ranges = Self::new();
        for (start, end) in iter {
            ranges.add(start, end);
        }
        ranges
    }
}

impl fmt::Display for TimeRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ranges.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_label() {
        assert_eq!(MediaKind::from_label("Video"), MediaKind::Video);
        assert_eq!(MediaKind::from_label("Audio"), MediaKind::Audio);
        assert_eq!(MediaKind::from_label("Subtitle"), MediaKind::Subtitle);
        assert_eq!(MediaKind::from_label("Attachment"), MediaKind::Other);
    }

    #[test]
    fn test_media_kind_serialization() {
        let json = serde_json::to_string(&MediaKind::Audio).unwrap();
        assert_eq!(json, r#""audio""#);
    }

    #[test]
    fn test_add_disjoint_keeps_order() {
        let mut ranges = TimeRanges::new();
        ranges.add(20.0, 30.0);
        ranges.add(0.0, 10.0);

        let collected: Vec<_> = ranges.iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(collected, vec![(0.0, 10.0), (20.0, 30.0)]);
    }

    #[test]
    fn test_add_merges_overlap() {
        let mut ranges = TimeRanges::new();
        ranges.add(0.0, 10.1);
        ranges.add(10.0, 20.1);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges.find(15.0), Some(TimeRange::new(0.0, 20.1)));
    }

    #[test]
    fn test_add_bridges_multiple_ranges() {
        let mut ranges: TimeRanges = [(0.0, 5.0), (10.0, 15.0), (20.0, 25.0)]
            .into_iter()
            .collect();
        ranges.add(4.0, 21.0);
        assert_eq!(ranges.len(), 1);
        assert!((ranges.total() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_add_ignores_empty_interval() {
        let mut ranges = TimeRanges::new();
        ranges.add(5.0, 5.0);
        ranges.add(6.0, 1.0);
        assert!(ranges.is_empty());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let ranges: TimeRanges = [(0.0, 10.0)].into_iter().collect();
        assert!(ranges.contains(0.0));
        assert!(ranges.contains(10.0));
        assert!(!ranges.contains(10.5));
    }
}
