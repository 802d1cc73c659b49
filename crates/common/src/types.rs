//! Common data types for the OMAF player components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a logical video stream slot in the decoder manager.
///
/// Stream ids are small integers indexing a fixed-capacity slot table. An id
/// is not reused while its slot is configured; it is released explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub u32);

impl StreamId {
    /// Slot index for table lookups.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Build a stream id from a slot index, if it fits.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DASH segment number. Segment numbering starts at 1.
pub type SegmentId = u32;

/// Identifier of a DASH adaptation set within one MPD.
pub type AdaptationSetId = u32;

/// A small set of stream ids, kept in insertion order without duplicates.
///
/// Used to express "the base tile set", "the enhancement set" and so on; the
/// sets passed to one call are disjoint and their union covers every stream
/// relevant to that call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streams(Vec<StreamId>);

impl Streams {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a stream; returns false if it was already present.
    pub fn add(&mut self, stream: StreamId) -> bool {
        if self.contains(stream) {
            return false;
        }
        self.0.push(stream);
        true
    }

    /// Add every stream of `other`.
    pub fn add_all(&mut self, other: &Streams) {
        for stream in other {
            self.add(stream);
        }
    }

    /// Union of several sets, preserving first-seen order.
    #[must_use]
    pub fn union_of(sets: &[&Streams]) -> Self {
        let mut all = Self::new();
        for set in sets {
            all.add_all(set);
        }
        all
    }

    #[must_use]
    pub fn contains(&self, stream: StreamId) -> bool {
        self.0.contains(&stream)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<StreamId> {
        self.0.first().copied()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<StreamId> for Streams {
    fn from_iter<I: IntoIterator<Item = StreamId>>(iter: I) -> Self {
        let mut streams = Self::new();
        for stream in iter {
            streams.add(stream);
        }
        streams
    }
}

impl<'a> IntoIterator for &'a Streams {
    type Item = StreamId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, StreamId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

impl From<&[u32]> for Streams {
    fn from(ids: &[u32]) -> Self {
        ids.iter().copied().map(StreamId).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_streams_deduplicates() {
        let mut streams = Streams::new();
        assert!(streams.add(StreamId(3)));
        assert!(!streams.add(StreamId(3)));
        assert!(streams.add(StreamId(1)));
        assert_eq!(streams.len(), 2);
        assert_eq!(streams.first(), Some(StreamId(3)));
    }

    #[test]
    fn test_union_preserves_order() {
        let base = Streams::from(&[1, 2][..]);
        let enhancement = Streams::from(&[2, 5][..]);
        let all = Streams::union_of(&[&base, &enhancement]);
        let ids: Vec<u32> = all.iter().map(|s| s.0).collect();
        assert_eq!(ids, vec![1, 2, 5]);
    }

    #[test]
    fn test_stream_id_serde() {
        let json = serde_json::to_string(&StreamId(7)).unwrap();
        assert_eq!(json, "7");
        let back: StreamId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StreamId(7));
    }
}
