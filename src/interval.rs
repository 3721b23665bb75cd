use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Earliest representable instant; the lower bound of every inverted set.
pub const ZERO_TIME: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// Latest representable instant; the upper bound of every inverted set.
pub const INFINITY: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

const NANO: TimeDelta = TimeDelta::nanoseconds(1);

/// A time range `[start, end]`.
///
/// Callers are expected to keep `start <= end`; nothing here enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        compare(self, other) == Ordering::Equal
    }

    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Overlap ordering used by the interval tree.
///
/// `Greater` when `a` starts strictly after `b` ends, `Less` when `a` ends
/// strictly before `b` starts, `Equal` for any overlap. Touching endpoints
/// count as overlap.
pub fn compare(a: &Interval, b: &Interval) -> Ordering {
    if a.start > b.end {
        Ordering::Greater
    } else if a.end < b.start {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

/// Ascending by start, ties broken by ascending end.
pub fn sort(intervals: &mut [Interval]) {
    intervals.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
}

/// Coalesce overlapping and touching intervals.
pub fn merge(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted = intervals.to_vec();
    sort(&mut sorted);

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        if let Some(last) = merged.last_mut()
            && interval.start <= last.end
        {
            last.end = last.end.max(interval.end);
            continue;
        }
        merged.push(interval);
    }
    merged
}

/// Complement of `intervals` over `[ZERO_TIME, INFINITY]`.
///
/// Gaps are offset by one nanosecond from their neighbours so they never
/// touch the intervals they separate. An empty input yields no gaps.
pub fn invert(intervals: &[Interval]) -> Vec<Interval> {
    let mut merged = merge(intervals);
    if merged.is_empty() {
        return Vec::new();
    }
    sort(&mut merged);

    let mut gaps = Vec::with_capacity(merged.len() + 1);

    if let Some(end) = merged[0].start.checked_sub_signed(NANO) {
        gaps.push(Interval::new(ZERO_TIME, end));
    }

    for pair in merged.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if let (Some(start), Some(end)) = (
            prev.end.checked_add_signed(NANO),
            next.start.checked_sub_signed(NANO),
        ) {
            gaps.push(Interval::new(start, end));
        }
    }

    if let Some(last) = merged.last()
        && let Some(start) = last.end.checked_add_signed(NANO)
    {
        gaps.push(Interval::new(start, INFINITY));
    }

    gaps
}

/// Clamp each interval to `bounds`, dropping those entirely outside it and
/// any left reversed.
pub fn clip(intervals: &[Interval], bounds: &Interval) -> Vec<Interval> {
    intervals
        .iter()
        .filter(|i| i.overlaps(bounds))
        .map(|i| Interval::new(i.start.max(bounds.start), i.end.min(bounds.end)))
        .filter(|i| i.start <= i.end)
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    pub(crate) fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub(crate) fn iv(start: i64, end: i64) -> Interval {
        Interval::new(at(start), at(end))
    }

    #[test]
    fn compare_orders_disjoint_intervals() {
        assert_eq!(compare(&iv(10, 20), &iv(0, 5)), Ordering::Greater);
        assert_eq!(compare(&iv(0, 5), &iv(10, 20)), Ordering::Less);
    }

    #[test]
    fn compare_reports_overlap_and_containment() {
        assert_eq!(compare(&iv(0, 10), &iv(5, 15)), Ordering::Equal);
        assert_eq!(compare(&iv(0, 100), &iv(40, 50)), Ordering::Equal);
        assert_eq!(compare(&iv(40, 50), &iv(0, 100)), Ordering::Equal);
    }

    #[test]
    fn compare_touching_endpoints_overlap() {
        assert_eq!(compare(&iv(0, 10), &iv(10, 20)), Ordering::Equal);
        let a = iv(0, 10);
        let b = Interval::new(a.end + NANO, at(20));
        assert_eq!(compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn sort_breaks_ties_on_end() {
        let mut xs = vec![iv(5, 9), iv(0, 8), iv(0, 3)];
        sort(&mut xs);
        assert_eq!(xs, vec![iv(0, 3), iv(0, 8), iv(5, 9)]);
    }

    #[test]
    fn merge_overlapping_pair() {
        assert_eq!(merge(&[iv(0, 2), iv(1, 4)]), vec![iv(0, 4)]);
    }

    #[test]
    fn merge_touching_and_unsorted() {
        let merged = merge(&[iv(30, 40), iv(10, 20), iv(20, 25), iv(50, 60)]);
        assert_eq!(merged, vec![iv(10, 25), iv(30, 40), iv(50, 60)]);
    }

    #[test]
    fn merge_contained_interval_keeps_outer_end() {
        assert_eq!(merge(&[iv(0, 100), iv(10, 20)]), vec![iv(0, 100)]);
    }

    #[test]
    fn merge_empty() {
        assert!(merge(&[]).is_empty());
    }

    #[test]
    fn invert_empty_yields_nothing() {
        assert!(invert(&[]).is_empty());
    }

    #[test]
    fn invert_produces_offset_gaps() {
        let gaps = invert(&[iv(20, 50), iv(40, 60), iv(120, 180)]);
        assert_eq!(gaps.len(), 3);
        assert_eq!(gaps[0], Interval::new(ZERO_TIME, at(20) - NANO));
        assert_eq!(gaps[1], Interval::new(at(60) + NANO, at(120) - NANO));
        assert_eq!(gaps[2], Interval::new(at(180) + NANO, INFINITY));
    }

    #[test]
    fn invert_of_point_inside_allowed_region_clears_all_gaps() {
        let gaps = invert(&[iv(20, 50), iv(40, 60), iv(120, 180)]);
        assert!(gaps.iter().all(|g| !g.overlaps(&iv(44, 55))));
        assert!(gaps.iter().any(|g| g.overlaps(&iv(1, 8))));
        assert!(gaps.iter().any(|g| g.overlaps(&iv(55, 65))));
    }

    #[test]
    fn invert_unbounded_edges_drop_outer_gaps() {
        let gaps = invert(&[Interval::new(ZERO_TIME, at(10)), Interval::new(at(20), INFINITY)]);
        assert_eq!(gaps, vec![Interval::new(at(10) + NANO, at(20) - NANO)]);
    }

    #[test]
    fn clip_clamps_and_drops() {
        let clipped = clip(&[iv(0, 10), iv(20, 30), iv(40, 50)], &iv(5, 25));
        assert_eq!(clipped, vec![iv(5, 10), iv(20, 25)]);
    }

    fn arb_intervals() -> impl Strategy<Value = Vec<Interval>> {
        prop::collection::vec((0i64..1_000, 0i64..200), 0..40).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(start, len)| iv(start, start + len))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(xs in arb_intervals()) {
            let once = merge(&xs);
            prop_assert_eq!(merge(&once), once);
        }

        #[test]
        fn merged_intervals_are_disjoint_and_sorted(xs in arb_intervals()) {
            let merged = merge(&xs);
            for pair in merged.windows(2) {
                prop_assert_eq!(compare(&pair[0], &pair[1]), Ordering::Less);
            }
        }

        #[test]
        fn gaps_never_touch_inputs(xs in arb_intervals()) {
            let gaps = invert(&xs);
            for gap in &gaps {
                for x in &xs {
                    prop_assert!(!gap.overlaps(x));
                }
            }
        }
    }
}
