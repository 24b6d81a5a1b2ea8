//! Circular intervals of directions on `[0, 2π)`.
//!
//! An `AngleInterval` is one contiguous arc. Internally it is stored as at
//! most two [`Interval`] pieces: an arc crossing angle zero is split into
//! `[start, 2π]` and `[0, end]`, with the wrapping piece stored first.
//!
//! Set operations work piece-wise on `Interval`s and then re-assemble the
//! pieces into arcs. Two pieces are only re-joined when they are the circular
//! split of a single arc (one touches 0, the other touches 2π); a genuine
//! double intersection is reported as [`AngleIntersection::Disjoint`].

use std::f64::consts::{PI, TAU};

use super::interval::Interval;
use super::types::{Line, Point};

/// Arcs smaller than this (radians) are treated as empty.
pub const ANGLE_EPSILON: f64 = 0.001;

/// Tolerance used when checking whether a piece touches 0 or 2π.
const WRAP_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct AngleInterval {
    pieces: Vec<Interval>,
}

/// Outcome of intersecting two arcs. Two arcs on a circle overlap in at most
/// two disjoint arcs (both arcs wider than half the circle).
#[derive(Debug, Clone, PartialEq)]
pub enum AngleIntersection {
    Empty,
    Arc(AngleInterval),
    Disjoint(AngleInterval, AngleInterval),
}

impl AngleIntersection {
    /// The resulting arcs, in no particular order.
    pub fn arcs(self) -> Vec<AngleInterval> {
        match self {
            AngleIntersection::Empty => Vec::new(),
            AngleIntersection::Arc(arc) => vec![arc],
            AngleIntersection::Disjoint(a, b) => vec![a, b],
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, AngleIntersection::Empty)
    }
}

impl AngleInterval {
    /// Arc from `start` to `end` (radians, counter-clockwise in atan2 terms).
    ///
    /// `end < start` gives the empty interval, a span of at least 2π gives the
    /// full circle. Otherwise both bounds are normalized into `[0, 2π)` and
    /// the arc is split at zero if needed.
    pub fn new(start: f64, end: f64) -> Self {
        if end < start {
            return Self::empty();
        }
        if end - start >= TAU {
            return Self::full();
        }

        let start_norm = normalize(start);
        let end_norm = normalize(end);

        if start_norm < end_norm {
            return Self {
                pieces: vec![Interval::new(start_norm, end_norm)],
            };
        }
        if start_norm == end_norm {
            return Self::empty();
        }

        let pieces = [Interval::new(start_norm, TAU), Interval::new(0.0, end_norm)].into_iter().filter(|p| !p.is_empty()).collect();
        Self { pieces }
    }

    pub fn full() -> Self {
        Self {
            pieces: vec![Interval::new(0.0, TAU)],
        }
    }

    pub fn empty() -> Self {
        Self { pieces: Vec::new() }
    }

    /// Arc under which `line` is seen from `source`. Lines seen under more
    /// than π are impossible, so a larger raw difference means the arc wraps.
    pub fn of_line(source: &Point, line: &Line) -> Self {
        let a1 = source.angle_to(&line.p1);
        let a2 = source.angle_to(&line.p2);
        let min = a1.min(a2);
        let max = a1.max(a2);
        if max - min > PI { Self::new(max, min + TAU) } else { Self::new(min, max) }
    }

    pub fn pieces(&self) -> &[Interval] {
        &self.pieces
    }

    /// Total angular size in radians.
    pub fn size(&self) -> f64 {
        self.pieces.iter().map(Interval::size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.size() < ANGLE_EPSILON
    }

    pub fn is_full(&self) -> bool {
        self.size() >= TAU - WRAP_TOLERANCE
    }

    /// First direction of the arc, `None` when there are no pieces.
    pub fn start_angle(&self) -> Option<f64> {
        self.pieces.first().map(Interval::low)
    }

    /// Last direction of the arc. Smaller than `start_angle` for a wrapping arc.
    pub fn end_angle(&self) -> Option<f64> {
        self.pieces.last().map(Interval::high)
    }

    pub fn contains_angle(&self, angle: f64) -> bool {
        let angle = normalize(angle);
        self.pieces.iter().any(|p| p.contains_value(angle))
    }

    /// True if every direction of `other` is also in this arc.
    pub fn contains(&self, other: &AngleInterval) -> bool {
        other.pieces.iter().all(|piece| self.pieces.iter().any(|own| own.contains(piece)))
    }

    pub fn intersects(&self, other: &AngleInterval) -> bool {
        !self.intersect_with(other).is_empty()
    }

    pub fn intersect_with(&self, other: &AngleInterval) -> AngleIntersection {
        let raw: Vec<Interval> = self.pieces.iter().flat_map(|a| other.pieces.iter().filter_map(move |b| a.intersect_with(b).overlap())).collect();

        let mut arcs = arcs_from_pieces(raw).into_iter();
        match (arcs.next(), arcs.next()) {
            (None, _) => AngleIntersection::Empty,
            (Some(arc), None) => AngleIntersection::Arc(arc),
            (Some(a), Some(b)) => AngleIntersection::Disjoint(a, b),
        }
    }

    /// This arc minus `other`: zero, one or two arcs.
    pub fn subtract(&self, other: &AngleInterval) -> Vec<AngleInterval> {
        let mut remaining = self.pieces.clone();
        for cut in &other.pieces {
            remaining = remaining.iter().flat_map(|piece| piece.subtract(cut)).collect();
        }
        arcs_from_pieces(remaining)
    }

    /// Intersects every arc of `intervals` with `with`, collecting the results.
    pub fn intersect_all(intervals: &[AngleInterval], with: &AngleInterval) -> Vec<AngleInterval> {
        intervals.iter().flat_map(|interval| interval.intersect_with(with).arcs()).collect()
    }

    /// Removes `minus` from every arc of `intervals`.
    pub fn subtract_all(intervals: &[AngleInterval], minus: &AngleInterval) -> Vec<AngleInterval> {
        intervals.iter().flat_map(|interval| interval.subtract(minus)).collect()
    }
}

impl std::fmt::Display for AngleInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.start_angle(), self.end_angle()) {
            (Some(start), Some(end)) => write!(f, "{:.1}° -> {:.1}°", start.to_degrees(), end.to_degrees()),
            _ => write!(f, "(empty)"),
        }
    }
}

fn normalize(angle: f64) -> f64 {
    let normalized = angle.rem_euclid(TAU);
    // rem_euclid may round tiny negative angles up to exactly 2π
    if normalized >= TAU { 0.0 } else { normalized }
}

/// Re-assembles raw pieces into arcs. Overlapping or touching pieces are
/// merged; a piece starting at 0 is joined with a piece ending at 2π.
///
/// Arcs produced from a single intersection or subtraction never exceed two;
/// more than that means the piece invariant is broken.
fn arcs_from_pieces(mut pieces: Vec<Interval>) -> Vec<AngleInterval> {
    pieces.retain(|p| !p.is_empty());
    pieces.sort_by(|a, b| a.low().total_cmp(&b.low()));

    let mut merged: Vec<Interval> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        match merged.last_mut() {
            Some(last) if piece.low() <= last.high() => {
                let high = last.high().max(piece.high());
                let low = last.low();
                last.set_interval(low, high);
            }
            _ => merged.push(piece),
        }
    }

    let starts_at_zero = merged.first().is_some_and(|p| p.low() <= WRAP_TOLERANCE);
    let ends_at_full = merged.last().is_some_and(|p| p.high() >= TAU - WRAP_TOLERANCE);

    let mut arcs = Vec::with_capacity(2);
    if merged.len() >= 2 && starts_at_zero && ends_at_full {
        let head = merged.remove(0);
        if let Some(tail) = merged.pop() {
            arcs.push(AngleInterval { pieces: vec![tail, head] });
        }
    }
    arcs.extend(merged.into_iter().map(|piece| AngleInterval { pieces: vec![piece] }));

    if arcs.len() > 2 {
        log::error!("Angle interval operation produced {} arcs: {:?}", arcs.len(), arcs);
        panic!("angle interval invariant violated: {} arcs from a single operation", arcs.len());
    }
    arcs
}
