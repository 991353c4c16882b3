use serde::{Deserialize, Serialize};

/// A contiguous byte range `[start, start + length)` within a stream's address
/// space.
///
/// Zero-length extents denote no content; set-producing operations elide them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Extent {
    pub start: u64,
    pub length: u64,
}

impl Extent {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// Builds an extent from a half-open `[start, end)` pair. A reversed pair is
    /// treated as empty rather than panicking.
    pub fn from_bounds(start: u64, end: u64) -> Self {
        Self {
            start,
            length: end.saturating_sub(start),
        }
    }

    /// Exclusive end offset. Saturates rather than wrapping so callers that feed
    /// in unvalidated ranges degrade to an empty/clipped result.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// True iff the two ranges share at least one byte.
    pub fn overlaps(&self, other: &Extent) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end() && other.start < self.end()
    }

    /// True iff the ranges overlap or are directly adjacent, i.e. their union is
    /// a single contiguous range.
    pub fn touches(&self, other: &Extent) -> bool {
        self.start <= other.end() && other.start <= self.end()
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end()
    }

    /// The overlapping sub-range, if any.
    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        let start = self.start.max(other.start);
        let end = self.end().min(other.end());
        if start < end {
            Some(Extent::from_bounds(start, end))
        } else {
            None
        }
    }

    fn merge(&self, other: &Extent) -> Extent {
        Extent::from_bounds(self.start.min(other.start), self.end().max(other.end()))
    }
}

/// Merges two ascending, disjoint extent sets into one, coalescing overlapping
/// and touching ranges.
pub fn union(a: &[Extent], b: &[Extent]) -> Vec<Extent> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    let mut cur: Option<Extent> = None;

    while i < a.len() || j < b.len() {
        let next = if j >= b.len() || (i < a.len() && a[i].start <= b[j].start) {
            let e = a[i];
            i += 1;
            e
        } else {
            let e = b[j];
            j += 1;
            e
        };
        if next.is_empty() {
            continue;
        }
        match cur {
            Some(c) if c.touches(&next) => cur = Some(c.merge(&next)),
            Some(c) => {
                out.push(c);
                cur = Some(next);
            }
            None => cur = Some(next),
        }
    }
    if let Some(c) = cur {
        out.push(c);
    }
    out
}

/// Clips `set` to `range`, preserving order.
pub fn intersect(set: &[Extent], range: Extent) -> Vec<Extent> {
    set.iter()
        .filter_map(|e| e.intersection(&range))
        .collect()
}

/// Carves `range` out of `set`, splitting any extent that straddles a boundary.
pub fn subtract(set: &[Extent], range: Extent) -> Vec<Extent> {
    let mut out = Vec::with_capacity(set.len() + 1);
    for e in set {
        if e.is_empty() {
            continue;
        }
        if range.is_empty() || !e.overlaps(&range) {
            out.push(*e);
            continue;
        }
        if e.start < range.start {
            out.push(Extent::from_bounds(e.start, range.start));
        }
        if e.end() > range.end() {
            out.push(Extent::from_bounds(range.end(), e.end()));
        }
    }
    out
}

/// True iff `set` is strictly ascending by start with no overlapping and no
/// uncoalesced adjacent entries, and contains no empty extents.
pub fn is_normalized(set: &[Extent]) -> bool {
    if set.iter().any(Extent::is_empty) {
        return false;
    }
    set.windows(2).all(|w| w[0].end() < w[1].start)
}
