//! Time ranges and clip boundaries

use serde::{Deserialize, Serialize};

/// Half-open span of a timeline in seconds, used during detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Overlapping or sharing an endpoint.
    pub fn touches(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn intersection(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (end > start).then_some(TimeRange { start, end })
    }
}

/// A detected clip within a recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipBoundary {
    pub start_time_sec: f64,
    pub end_time_sec: f64,
}

impl ClipBoundary {
    pub fn duration(&self) -> f64 {
        self.end_time_sec - self.start_time_sec
    }
}

impl From<TimeRange> for ClipBoundary {
    fn from(range: TimeRange) -> Self {
        Self {
            start_time_sec: range.start,
            end_time_sec: range.end,
        }
    }
}

/// Intersection of two sorted, non-overlapping range lists.
pub fn intersect_pair(a: &[TimeRange], b: &[TimeRange]) -> Vec<TimeRange> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if let Some(overlap) = a[i].intersection(&b[j]) {
            out.push(overlap);
        }
        if a[i].end < b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

/// Spans where every list is active at once. Empty input yields nothing.
pub fn intersect_all(lists: &[Vec<TimeRange>]) -> Vec<TimeRange> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    rest.iter()
        .fold(first.clone(), |acc, list| intersect_pair(&acc, list))
}

/// Expand `seed` by absorbing every range that touches it, until nothing
/// more can be absorbed.
pub fn grow(seed: TimeRange, candidates: &[TimeRange]) -> TimeRange {
    let mut current = seed;
    loop {
        let mut changed = false;
        for range in candidates {
            if range.touches(&current) && (range.start < current.start || range.end > current.end)
            {
                current.start = current.start.min(range.start);
                current.end = current.end.max(range.end);
                changed = true;
            }
        }
        if !changed {
            return current;
        }
    }
}

/// Sort and merge ranges that overlap or touch.
pub fn merge_overlapping(mut ranges: Vec<TimeRange>) -> Vec<TimeRange> {
    ranges.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(start: f64, end: f64) -> TimeRange {
        TimeRange::new(start, end)
    }

    #[test]
    fn test_intersect_pair() {
        let a = vec![r(0.0, 5.0), r(8.0, 12.0)];
        let b = vec![r(3.0, 9.0), r(11.0, 15.0)];
        assert_eq!(intersect_pair(&a, &b), vec![r(3.0, 5.0), r(8.0, 9.0), r(11.0, 12.0)]);
    }

    #[test]
    fn test_intersect_all_requires_every_list() {
        let lists = vec![
            vec![r(0.0, 10.0)],
            vec![r(2.0, 8.0)],
            vec![r(20.0, 30.0)],
        ];
        assert!(intersect_all(&lists).is_empty());
        assert!(intersect_all(&[]).is_empty());
    }

    #[test]
    fn test_grow_chains_through_touching_ranges() {
        // 1-3 touches the seed, 0-1 only touches after 1-3 is absorbed
        let candidates = vec![r(0.0, 1.0), r(1.0, 3.0), r(8.0, 9.0), r(20.0, 21.0)];
        let grown = grow(r(2.0, 8.0), &candidates);
        assert_eq!(grown, r(0.0, 9.0));
    }

    #[test]
    fn test_merge_overlapping() {
        let merged = merge_overlapping(vec![r(5.0, 9.0), r(0.0, 2.0), r(1.0, 3.0), r(9.0, 10.0)]);
        assert_eq!(merged, vec![r(0.0, 3.0), r(5.0, 10.0)]);
    }

    #[test]
    fn test_empty_intersection() {
        assert!(r(0.0, 1.0).intersection(&r(1.0, 2.0)).is_none());
        assert!(r(0.0, 1.0).touches(&r(1.0, 2.0)));
    }
}
