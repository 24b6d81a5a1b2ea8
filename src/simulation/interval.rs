//! Closed numeric ranges on the real line.
//!
//! `Interval` is the building block of [`AngleInterval`](super::angle_interval::AngleInterval):
//! every circular arc is stored as one or two of these. Intersection returns a
//! tagged [`IntervalIntersection`] and subtraction always returns a (possibly
//! empty) collection, so callers never have to deal with absent markers.

/// Closed range `[low, high]`. Empty when `high <= low`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    low: f64,
    high: f64,
}

/// Outcome of intersecting two intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntervalIntersection {
    Empty,
    Overlap(Interval),
}

impl IntervalIntersection {
    pub fn overlap(self) -> Option<Interval> {
        match self {
            IntervalIntersection::Empty => None,
            IntervalIntersection::Overlap(interval) => Some(interval),
        }
    }
}

impl Interval {
    /// Creates `[low, high]`. A reversed pair yields an empty interval.
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Re-ranges the interval in place.
    pub fn set_interval(&mut self, low: f64, high: f64) {
        self.low = low;
        self.high = high;
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// Length of the interval, zero when empty.
    pub fn size(&self) -> f64 {
        (self.high - self.low).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.high <= self.low
    }

    pub fn contains_value(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    /// True if `other` lies completely inside this interval.
    pub fn contains(&self, other: &Interval) -> bool {
        other.low >= self.low && other.high <= self.high
    }

    /// Overlap of the two intervals. Intervals that only touch at a single
    /// value do not overlap.
    pub fn intersect_with(&self, other: &Interval) -> IntervalIntersection {
        let low = self.low.max(other.low);
        let high = self.high.min(other.high);
        if high <= low {
            IntervalIntersection::Empty
        } else {
            IntervalIntersection::Overlap(Interval::new(low, high))
        }
    }

    /// This interval minus `other`: zero, one or two intervals.
    pub fn subtract(&self, other: &Interval) -> Vec<Interval> {
        if self.is_empty() {
            return Vec::new();
        }
        let Some(overlap) = self.intersect_with(other).overlap() else {
            return vec![*self];
        };

        let mut remainder = Vec::with_capacity(2);
        if overlap.low > self.low {
            remainder.push(Interval::new(self.low, overlap.low));
        }
        if overlap.high < self.high {
            remainder.push(Interval::new(overlap.high, self.high));
        }
        remainder
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.4}, {:.4}]", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn disjoint_and_touching_intervals_do_not_intersect() {
        let a = Interval::new(0.0, 1.0);
        assert_eq!(a.intersect_with(&Interval::new(2.0, 3.0)), IntervalIntersection::Empty);
        assert_eq!(a.intersect_with(&Interval::new(1.0, 3.0)), IntervalIntersection::Empty);
    }

    #[test]
    fn subtract_splits_in_two() {
        let parts = Interval::new(0.0, 10.0).subtract(&Interval::new(3.0, 4.0));
        assert_eq!(parts, vec![Interval::new(0.0, 3.0), Interval::new(4.0, 10.0)]);
    }

    #[test]
    fn subtract_full_removal_is_empty_collection() {
        assert!(Interval::new(2.0, 3.0).subtract(&Interval::new(0.0, 10.0)).is_empty());
    }

    #[test]
    fn set_interval_reranges() {
        let mut interval = Interval::new(0.0, 1.0);
        interval.set_interval(5.0, 2.0);
        assert!(interval.is_empty());
        assert_eq!(interval.size(), 0.0);
    }

    fn interval_strategy() -> impl Strategy<Value = Interval> {
        (-100.0f64..100.0, 0.01f64..50.0).prop_map(|(low, len)| Interval::new(low, low + len))
    }

    proptest! {
        #[test]
        fn intersection_is_commutative(a in interval_strategy(), b in interval_strategy()) {
            prop_assert_eq!(a.intersect_with(&b), b.intersect_with(&a));
        }

        #[test]
        fn subtract_and_intersect_partition(a in interval_strategy(), b in interval_strategy()) {
            let removed = a.intersect_with(&b).overlap().map(|i| i.size()).unwrap_or(0.0);
            let kept: f64 = a.subtract(&b).iter().map(|i| i.size()).sum();
            prop_assert!((removed + kept - a.size()).abs() < 1e-9);
            for part in a.subtract(&b) {
                prop_assert!(a.contains(&part));
                prop_assert!(part.intersect_with(&b) == IntervalIntersection::Empty);
            }
        }
    }
}
