use std::fmt::{Debug, Formatter};
use std::ops::Range;

use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A half-open byte range `[start, end)` in the snapshot frame.
///
/// This is an internal replacement for Range<usize>. The main use for this is
/// that std::Range doesn't implement Copy, and these get passed around a lot.
#[derive(Copy, Clone, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SnapRange {
    pub start: usize,
    pub end: usize,
}

impl SnapRange {
    #[inline]
    pub fn new(start: usize, end: usize) -> SnapRange {
        SnapRange { start, end }
    }

    #[inline]
    pub fn new_from_len(start: usize, len: usize) -> SnapRange {
        SnapRange { start, end: start + len }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        debug_assert!(self.start <= self.end);
        self.start == self.end
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }
}

impl Debug for SnapRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "S {}..{}", self.start, self.end)
    }
}

impl From<Range<usize>> for SnapRange {
    fn from(range: Range<usize>) -> Self {
        SnapRange { start: range.start, end: range.end }
    }
}

impl From<SnapRange> for Range<usize> {
    fn from(range: SnapRange) -> Self {
        range.start..range.end
    }
}

/// The set of snapshot ranges a tick's deletes will remove.
///
/// The set is kept sorted and coalesced at all times: inserting a range that
/// touches existing entries replaces the whole group with their union. That
/// makes containment queries a binary search, and it makes applying the
/// deletes order-independent.
#[derive(Debug, Clone, Default)]
pub struct DeletedRanges(SmallVec<[SnapRange; 4]>);

impl DeletedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ranges(&self) -> &[SnapRange] {
        &self.0
    }

    /// Add a range, merging it with every existing range it touches.
    pub fn insert(&mut self, r: SnapRange) {
        if r.is_empty() {
            return;
        }

        // Entries below lo end before r starts; entries at hi and beyond
        // start after r ends. Everything in lo..hi touches r.
        let lo = self.0.partition_point(|x| x.end < r.start);
        let hi = self.0.partition_point(|x| x.start <= r.end);

        if lo == hi {
            self.0.insert(lo, r);
        } else {
            let merged = SnapRange {
                start: r.start.min(self.0[lo].start),
                end: r.end.max(self.0[hi - 1].end),
            };
            self.0[lo] = merged;
            self.0.drain(lo + 1..hi);
        }
    }

    /// The deleted range containing `pos`, if any.
    pub fn containing(&self, pos: usize) -> Option<SnapRange> {
        let idx = self.0.partition_point(|x| x.end <= pos);
        match self.0.get(idx) {
            Some(r) if r.contains(pos) => Some(*r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set_of(ranges: &[(usize, usize)]) -> DeletedRanges {
        let mut set = DeletedRanges::new();
        for &(s, e) in ranges {
            set.insert(SnapRange::new(s, e));
        }
        set
    }

    #[test]
    fn insert_disjoint_stays_sorted() {
        let set = set_of(&[(10, 12), (0, 2), (5, 7)]);
        assert_eq!(
            set.ranges(),
            &[SnapRange::new(0, 2), SnapRange::new(5, 7), SnapRange::new(10, 12)]
        );
    }

    #[test]
    fn overlapping_and_touching_ranges_merge() {
        let set = set_of(&[(0, 3), (5, 8), (2, 5)]);
        assert_eq!(set.ranges(), &[SnapRange::new(0, 8)]);

        // Exactly touching closures merge too.
        let set = set_of(&[(0, 2), (2, 4)]);
        assert_eq!(set.ranges(), &[SnapRange::new(0, 4)]);
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let mut set = set_of(&[(3, 6)]);
        set.insert(SnapRange::new(3, 6));
        assert_eq!(set.ranges(), &[SnapRange::new(3, 6)]);
    }

    #[test]
    fn insert_swallowing_several() {
        let set = set_of(&[(1, 2), (4, 5), (7, 8), (0, 9)]);
        assert_eq!(set.ranges(), &[SnapRange::new(0, 9)]);
    }

    #[test]
    fn containing_respects_half_open_ends() {
        let set = set_of(&[(2, 5), (8, 10)]);
        assert_eq!(set.containing(1), None);
        assert_eq!(set.containing(2), Some(SnapRange::new(2, 5)));
        assert_eq!(set.containing(4), Some(SnapRange::new(2, 5)));
        // The exclusive end is not inside the range.
        assert_eq!(set.containing(5), None);
        assert_eq!(set.containing(9), Some(SnapRange::new(8, 10)));
        assert_eq!(set.containing(10), None);
    }

    #[test]
    fn empty_ranges_are_ignored() {
        let set = set_of(&[(3, 3)]);
        assert!(set.is_empty());
    }
}
