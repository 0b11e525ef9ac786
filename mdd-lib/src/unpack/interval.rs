use serde::{Deserialize, Serialize};

/// A sorted set of non-overlapping half-open byte ranges.
///
/// Used to track which parts of an accumulation file have not yet been
/// resolved into decoded blocks. Insertions coalesce with any range they
/// touch or overlap; subtraction removes exactly the given sub-range,
/// splitting a covering range in two if necessary. Both operations are
/// idempotent, and ranges with `start >= end` are ignored.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalSet(Vec<(u64, u64)>);

impl IntervalSet {
    #[must_use]
    pub fn new() -> Self {
        IntervalSet::default()
    }

    #[must_use]
    pub fn from_spans(spans: &[(u64, u64)]) -> Self {
        let mut set = IntervalSet::default();
        for &(start, end) in spans {
            set.insert(start, end);
        }
        set
    }

    pub fn insert(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let mut merged = Vec::with_capacity(self.0.len() + 1);
        let (mut s, mut e) = (start, end);
        let mut placed = false;
        for &(a, b) in &self.0 {
            if b < s {
                merged.push((a, b));
            } else if a > e {
                if !placed {
                    merged.push((s, e));
                    placed = true;
                }
                merged.push((a, b));
            } else {
                // touches or overlaps; adjacent ranges coalesce
                s = s.min(a);
                e = e.max(b);
            }
        }
        if !placed {
            merged.push((s, e));
        }
        self.0 = merged;
    }

    pub fn subtract(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let mut remaining = Vec::with_capacity(self.0.len() + 1);
        for &(a, b) in &self.0 {
            if b <= start || a >= end {
                remaining.push((a, b));
                continue;
            }
            if a < start {
                remaining.push((a, start));
            }
            if b > end {
                remaining.push((end, b));
            }
        }
        self.0 = remaining;
    }

    /// True if any part of `start..end` is in the set.
    #[must_use]
    pub fn intersects(&self, start: u64, end: u64) -> bool {
        if start >= end {
            return false;
        }
        self.0.iter().any(|&(a, b)| a < end && b > start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn spans(&self) -> &[(u64, u64)] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_disjoint_stays_sorted() {
        let mut set = IntervalSet::new();
        set.insert(10, 20);
        set.insert(0, 5);
        set.insert(30, 40);
        assert_eq!(set.spans(), &[(0, 5), (10, 20), (30, 40)]);
    }

    #[test]
    fn insert_coalesces_overlap_and_touch() {
        let mut set = IntervalSet::from_spans(&[(0, 5), (10, 20)]);
        set.insert(5, 10); // bridges both by touching
        assert_eq!(set.spans(), &[(0, 20)]);

        let mut set = IntervalSet::from_spans(&[(0, 10), (20, 30)]);
        set.insert(5, 25);
        assert_eq!(set.spans(), &[(0, 30)]);
    }

    #[test]
    fn insert_is_idempotent() {
        let mut set = IntervalSet::from_spans(&[(0, 10)]);
        set.insert(0, 10);
        set.insert(2, 8);
        assert_eq!(set.spans(), &[(0, 10)]);
    }

    #[test]
    fn insert_rejects_empty_range() {
        let mut set = IntervalSet::new();
        set.insert(5, 5);
        set.insert(9, 3);
        assert!(set.is_empty());
    }

    #[test]
    fn subtract_splits_interior() {
        let mut set = IntervalSet::from_spans(&[(0, 100)]);
        set.subtract(40, 60);
        assert_eq!(set.spans(), &[(0, 40), (60, 100)]);
    }

    #[test]
    fn subtract_trims_edges() {
        let mut set = IntervalSet::from_spans(&[(10, 20)]);
        set.subtract(10, 12);
        set.subtract(18, 25);
        assert_eq!(set.spans(), &[(12, 18)]);
    }

    #[test]
    fn subtract_is_idempotent() {
        let mut set = IntervalSet::from_spans(&[(0, 10), (20, 30)]);
        set.subtract(10, 20);
        assert_eq!(set.spans(), &[(0, 10), (20, 30)]);
        set.subtract(0, 10);
        set.subtract(0, 10);
        assert_eq!(set.spans(), &[(20, 30)]);
    }

    #[test]
    fn subtract_spanning_multiple() {
        let mut set = IntervalSet::from_spans(&[(0, 10), (20, 30), (40, 50)]);
        set.subtract(5, 45);
        assert_eq!(set.spans(), &[(0, 5), (45, 50)]);
    }

    #[test]
    fn intersects() {
        let set = IntervalSet::from_spans(&[(10, 20)]);
        assert!(set.intersects(15, 16));
        assert!(set.intersects(0, 11));
        assert!(set.intersects(19, 100));
        assert!(!set.intersects(0, 10));
        assert!(!set.intersects(20, 30));
        assert!(!set.intersects(15, 15));
    }

    #[test]
    fn serde_round_trip() {
        let set = IntervalSet::from_spans(&[(4059, 4060)]);
        let js = serde_json::to_string(&set).unwrap();
        assert_eq!(js, "[[4059,4060]]");
        let back: IntervalSet = serde_json::from_str(&js).unwrap();
        assert_eq!(back, set);
    }
}
