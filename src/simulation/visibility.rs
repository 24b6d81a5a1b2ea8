//! Visibility resolution by angular shadow casting.
//!
//! Given a viewer position, an optional sector and an optional "look-through"
//! boundary, finds the obstacle edge segments that are directly visible:
//! - candidate rectangles are fetched per unresolved angular region
//! - their facing edges are cropped to the region
//! - a candidate shadowed by a nearer one is dropped or splits the region
//! - an unshadowed candidate is accepted and its footprint marked resolved
//!
//! Results are memoized in a small most-recently-used cache that is discarded
//! whenever the obstacle set changes.

use std::collections::VecDeque;

use super::angle_interval::AngleInterval;
use super::geometry::{self, MIN_SEGMENT_LENGTH};
use super::obstacle_world::ObstacleQuery;
use super::types::{Line, OUT_BOTTOM, OUT_LEFT, OUT_RIGHT, OUT_TOP, Point, Rect};

/// Number of memoized visibility results.
pub const VISIBILITY_CACHE_CAPACITY: usize = 30;

/// Candidates closer than this (sum of endpoint deviations) to the
/// look-through line are the look-through line itself.
const LOOK_THROUGH_TOLERANCE: f64 = 0.01;

/// Relative padding of a shadow segment's bounding box.
const SHADOW_PADDING: f64 = 0.01;

/// Safety cap on the resolution loop.
const MAX_RESOLVE_ITERATIONS: usize = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    source: Point,
    angle_interval: Option<AngleInterval>,
    look_through: Option<Line>,
    segments: Vec<Line>,
}

impl CacheEntry {
    fn matches(&self, source: &Point, angle_interval: Option<&AngleInterval>, look_through: Option<&Line>) -> bool {
        self.source == *source && self.angle_interval.as_ref() == angle_interval && self.look_through.as_ref() == look_through
    }
}

/// Visibility resolver with its recency-ordered result cache.
#[derive(Debug, Default)]
pub struct VisibilityResolver {
    cache: VecDeque<CacheEntry>,
    generation: Option<u64>,
}

enum ScanOutcome {
    Visible(Line),
    Split,
    AllShadowed,
}

impl VisibilityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Cached source points, most recently used first.
    #[cfg(test)]
    fn cached_sources(&self) -> Vec<Point> {
        self.cache.iter().map(|entry| entry.source).collect()
    }

    /// Unshadowed obstacle edges visible from `source`.
    ///
    /// # Parameters
    /// * `angle_interval` - sector to search, the full circle when `None`
    /// * `look_through` - only report segments behind this boundary, as seen from `source`
    pub fn resolve_visible(&mut self, obstacles: &dyn ObstacleQuery, source: &Point, angle_interval: Option<&AngleInterval>, look_through: Option<&Line>) -> Vec<Line> {
        let generation = obstacles.generation();
        if self.generation != Some(generation) {
            if !self.cache.is_empty() {
                log::debug!("Obstacle set changed, dropping {} cached visibility results", self.cache.len());
            }
            self.cache.clear();
            self.generation = Some(generation);
        }

        if let Some(position) = self.cache.iter().position(|entry| entry.matches(source, angle_interval, look_through)) {
            if let Some(entry) = self.cache.remove(position) {
                let segments = entry.segments.clone();
                self.cache.push_front(entry);
                return segments;
            }
        }

        let segments = compute_visible(obstacles, source, angle_interval, look_through);

        if self.cache.len() >= VISIBILITY_CACHE_CAPACITY {
            self.cache.pop_back();
        }
        self.cache.push_front(CacheEntry {
            source: *source,
            angle_interval: angle_interval.cloned(),
            look_through: look_through.copied(),
            segments: segments.clone(),
        });
        segments
    }
}

/// Edges of `rect` facing `source`.
fn facing_edges(rect: &Rect, source: &Point) -> Vec<Line> {
    let outcode = rect.outcode(source);
    let mut edges = Vec::with_capacity(2);
    if outcode & OUT_BOTTOM != 0 {
        edges.push(Line::from_coords(rect.min_x(), rect.max_y(), rect.max_x(), rect.max_y()));
    }
    if outcode & OUT_TOP != 0 {
        edges.push(Line::from_coords(rect.min_x(), rect.min_y(), rect.max_x(), rect.min_y()));
    }
    if outcode & OUT_LEFT != 0 {
        edges.push(Line::from_coords(rect.min_x(), rect.min_y(), rect.min_x(), rect.max_y()));
    }
    if outcode & OUT_RIGHT != 0 {
        edges.push(Line::from_coords(rect.max_x(), rect.min_y(), rect.max_x(), rect.max_y()));
    }
    edges
}

/// Look-through filter: the candidate must not be the boundary itself and
/// must lie beyond it as seen from `source`.
fn admit(candidate: Line, source: &Point, look_through: Option<&Line>) -> Option<Line> {
    let Some(boundary) = look_through else {
        return Some(candidate);
    };
    if candidate.endpoint_deviation(boundary) < LOOK_THROUGH_TOLERANCE {
        return None;
    }
    let towards_source = Line::new(candidate.bounds().center(), *source);
    geometry::lines_intersect(&towards_source, boundary).then_some(candidate)
}

/// Crops `edge` to the part seen inside `check`.
fn crop_edge(source: &Point, edge: &Line, check: &AngleInterval, look_through: Option<&Line>) -> Vec<Line> {
    let edge_arc = AngleInterval::of_line(source, edge);
    if check.contains(&edge_arc) {
        return admit(*edge, source, look_through).into_iter().collect();
    }

    let mut cropped = Vec::new();
    for arc in edge_arc.intersect_with(check).arcs() {
        let (Some(start), Some(end)) = (arc.start_angle(), arc.end_angle()) else {
            continue;
        };
        let to_start = geometry::directed_line(source, start, 1.0);
        let to_end = geometry::directed_line(source, end, 1.0);
        let (Some(p1), Some(p2)) = (geometry::intersection_point_infinite(&to_start, edge), geometry::intersection_point_infinite(&to_end, edge)) else {
            continue;
        };
        if p1.distance(&p2) <= MIN_SEGMENT_LENGTH {
            log::trace!("Discarding degenerate crop of {} at {}", edge, p1);
            continue;
        }
        cropped.extend(admit(Line::new(p1, p2), source, look_through));
    }
    cropped
}

/// Angular footprint of `line` inside `check`.
fn footprint(source: &Point, line: &Line, check: &AngleInterval) -> Vec<AngleInterval> {
    AngleInterval::of_line(source, line).intersect_with(check).arcs()
}

fn arcs_contain(outer: &[AngleInterval], inner: &[AngleInterval]) -> bool {
    inner.iter().all(|i| outer.iter().any(|o| o.contains(i)))
}

fn arcs_intersect(a: &[AngleInterval], b: &[AngleInterval]) -> bool {
    a.iter().any(|x| b.iter().any(|y| x.intersects(y)))
}

fn subtract_arcs(from: Vec<AngleInterval>, arcs: &[AngleInterval]) -> Vec<AngleInterval> {
    arcs.iter().fold(from, |acc, arc| AngleInterval::subtract_all(&acc, arc))
}

/// Bounding box of a shadow candidate, grown slightly so coincident edges
/// still register.
fn shadow_bounds(shadow: &Line) -> Rect {
    let mut bounds = shadow.bounds();
    let delta = SHADOW_PADDING * bounds.width.max(bounds.height);
    let center = bounds.center();
    bounds.add_point(&Point::new(center.x + delta, center.y + delta));
    bounds
}

/// Looks for the first candidate that is not shadowed by another one,
/// updating `unhandled` as regions are resolved or split.
fn scan_candidates(source: &Point, check: &AngleInterval, candidates: &[Line], unhandled: &mut Vec<AngleInterval>) -> ScanOutcome {
    for (i, visible) in candidates.iter().enumerate() {
        let visible_arcs = footprint(source, visible, check);
        let visible_distance = visible.p1.distance(source) + visible.p2.distance(source);
        let visible_far = visible.p1.distance(source).max(visible.p2.distance(source));

        let mut unshadowed = true;
        for (j, shadow) in candidates.iter().enumerate() {
            if i == j {
                continue;
            }
            let shadow_close = shadow.p1.distance(source).min(shadow.p2.distance(source));
            if shadow_close > visible_far || !geometry::triangle_intersects_rect(source, &visible.p1, &visible.p2, &shadow_bounds(shadow)) {
                continue;
            }

            let shadow_arcs = footprint(source, shadow, check);
            if arcs_contain(&shadow_arcs, &visible_arcs) {
                // Identical footprints: the nearer segment wins
                if arcs_contain(&visible_arcs, &shadow_arcs) {
                    let shadow_distance = shadow.p1.distance(source) + shadow.p2.distance(source);
                    if visible_distance > shadow_distance {
                        unshadowed = false;
                        break;
                    }
                } else {
                    unshadowed = false;
                    break;
                }
            } else if arcs_intersect(&visible_arcs, &shadow_arcs) {
                // Partly covered: split the region into the shadowed overlap and the rest
                let mut replacement = Vec::new();
                for v in &visible_arcs {
                    for s in &shadow_arcs {
                        for overlap in v.intersect_with(s).arcs() {
                            replacement.extend(AngleInterval::intersect_all(unhandled, &overlap));
                        }
                    }
                }
                for rest in subtract_arcs(visible_arcs.clone(), &shadow_arcs) {
                    if !rest.is_empty() {
                        replacement.extend(AngleInterval::intersect_all(unhandled, &rest));
                    }
                }

                *unhandled = subtract_arcs(std::mem::take(unhandled), &visible_arcs);
                unhandled.extend(replacement.into_iter().filter(|arc| !arc.is_empty()));
                return ScanOutcome::Split;
            }
        }

        if unshadowed {
            *unhandled = subtract_arcs(std::mem::take(unhandled), &visible_arcs);
            return ScanOutcome::Visible(*visible);
        }
    }
    ScanOutcome::AllShadowed
}

fn compute_visible(obstacles: &dyn ObstacleQuery, source: &Point, angle_interval: Option<&AngleInterval>, look_through: Option<&Line>) -> Vec<Line> {
    let mut unhandled: Vec<AngleInterval> = match (look_through, angle_interval) {
        (Some(boundary), None) => vec![AngleInterval::of_line(source, boundary)],
        (Some(boundary), Some(sector)) => AngleInterval::of_line(source, boundary).intersect_with(sector).arcs(),
        (None, None) => vec![AngleInterval::full()],
        (None, Some(sector)) => vec![sector.clone()],
    };
    let mut visible = Vec::new();
    let mut iterations = 0;

    while let Some(check) = unhandled.first().cloned() {
        iterations += 1;
        if iterations > MAX_RESOLVE_ITERATIONS {
            log::warn!("Visibility from {} did not settle after {} iterations, {} regions left unresolved", source, MAX_RESOLVE_ITERATIONS, unhandled.len());
            break;
        }

        if check.is_empty() {
            unhandled.remove(0);
            continue;
        }

        let candidates = obstacles.obstacles_in_angle_interval(source, &check);
        let edges: Vec<Line> = candidates.iter().flat_map(|rect| facing_edges(rect, source)).collect();
        let cropped: Vec<Line> = edges.iter().flat_map(|edge| crop_edge(source, edge, &check, look_through)).collect();
        if cropped.is_empty() {
            unhandled.remove(0);
            continue;
        }

        match scan_candidates(source, &check, &cropped, &mut unhandled) {
            ScanOutcome::Visible(line) => visible.push(line),
            ScanOutcome::Split => {}
            ScanOutcome::AllShadowed => {
                log::warn!("Every candidate in {} from {} is shadowed, dropping region", check, source);
                unhandled.remove(0);
            }
        }
    }

    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::obstacle_world::ObstacleWorld;

    fn world(rects: &[Rect]) -> ObstacleWorld {
        let mut world = ObstacleWorld::new();
        for rect in rects {
            world.add_obstacle(*rect, false);
        }
        world
    }

    #[test]
    fn empty_world_has_no_visible_segments() {
        let world = ObstacleWorld::new();
        let mut resolver = VisibilityResolver::new();
        assert!(resolver.resolve_visible(&world, &Point::new(0.0, 0.0), None, None).is_empty());
    }

    #[test]
    fn single_obstacle_shows_its_facing_edge() {
        let world = world(&[Rect::new(10.0, -1.0, 1.0, 2.0)]);
        let mut resolver = VisibilityResolver::new();
        let visible = resolver.resolve_visible(&world, &Point::new(0.0, 0.0), None, None);
        assert_eq!(visible, vec![Line::from_coords(10.0, -1.0, 10.0, 1.0)]);
    }

    #[test]
    fn nearer_obstacle_shadows_the_middle_of_a_farther_one() {
        let world = world(&[Rect::new(10.0, -1.0, 1.0, 2.0), Rect::new(20.0, -4.0, 1.0, 8.0)]);
        let mut resolver = VisibilityResolver::new();
        let visible = resolver.resolve_visible(&world, &Point::new(0.0, 0.0), None, None);

        assert_eq!(visible.len(), 3);
        assert!(visible.contains(&Line::from_coords(10.0, -1.0, 10.0, 1.0)));
        let far_length: f64 = visible.iter().filter(|l| (l.p1.x - 20.0).abs() < 1e-9).map(Line::length).sum();
        assert!((far_length - 4.0).abs() < 1e-6, "far length {far_length}");
    }

    #[test]
    fn look_through_skips_boundary_and_sees_behind_it() {
        let boundary = Line::from_coords(10.0, -1.0, 10.0, 1.0);
        let world = world(&[Rect::new(10.0, -1.0, 1.0, 2.0), Rect::new(20.0, -4.0, 1.0, 8.0)]);
        let mut resolver = VisibilityResolver::new();
        let visible = resolver.resolve_visible(&world, &Point::new(0.0, 0.0), None, Some(&boundary));

        assert_eq!(visible.len(), 1);
        assert!((visible[0].p1.x - 20.0).abs() < 1e-9);
        assert!((visible[0].length() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn sector_limits_search() {
        let world = world(&[Rect::new(10.0, -1.0, 1.0, 2.0), Rect::new(-11.0, -1.0, 1.0, 2.0)]);
        let mut resolver = VisibilityResolver::new();
        let east = AngleInterval::new(-0.5, 0.5);
        let visible = resolver.resolve_visible(&world, &Point::new(0.0, 0.0), Some(&east), None);
        assert_eq!(visible, vec![Line::from_coords(10.0, -1.0, 10.0, 1.0)]);
    }

    #[test]
    fn cache_hits_and_invalidation() {
        let mut world = world(&[Rect::new(10.0, -1.0, 1.0, 2.0)]);
        let mut resolver = VisibilityResolver::new();
        let source = Point::new(0.0, 0.0);

        let first = resolver.resolve_visible(&world, &source, None, None);
        let second = resolver.resolve_visible(&world, &source, None, None);
        assert_eq!(first, second);
        assert_eq!(resolver.cache_len(), 1);

        resolver.resolve_visible(&world, &Point::new(1.0, 0.0), None, None);
        assert_eq!(resolver.cache_len(), 2);

        world.remove_all();
        assert!(resolver.resolve_visible(&world, &source, None, None).is_empty());
        assert_eq!(resolver.cache_len(), 1);
    }

    #[test]
    fn cache_is_bounded() {
        let world = world(&[Rect::new(10.0, -1.0, 1.0, 2.0)]);
        let mut resolver = VisibilityResolver::new();
        for i in 0..(VISIBILITY_CACHE_CAPACITY + 5) {
            resolver.resolve_visible(&world, &Point::new(0.0, i as f64 * 0.1), None, None);
        }
        assert_eq!(resolver.cache_len(), VISIBILITY_CACHE_CAPACITY);
    }

    #[test]
    fn touched_entry_survives_eviction() {
        let world = world(&[Rect::new(10.0, -1.0, 1.0, 2.0)]);
        let mut resolver = VisibilityResolver::new();
        let sources: Vec<Point> = (0..=VISIBILITY_CACHE_CAPACITY).map(|i| Point::new(0.0, i as f64 * 0.1)).collect();

        for source in &sources[..VISIBILITY_CACHE_CAPACITY] {
            resolver.resolve_visible(&world, source, None, None);
        }
        assert_eq!(resolver.cached_sources().last(), Some(&sources[0]));

        // Hit on the oldest entry moves it to the front without growing the cache
        resolver.resolve_visible(&world, &sources[0], None, None);
        assert_eq!(resolver.cached_sources()[0], sources[0]);
        assert_eq!(resolver.cache_len(), VISIBILITY_CACHE_CAPACITY);

        resolver.resolve_visible(&world, &sources[VISIBILITY_CACHE_CAPACITY], None, None);
        let cached = resolver.cached_sources();
        assert_eq!(cached.len(), VISIBILITY_CACHE_CAPACITY);
        assert_eq!(cached[0], sources[VISIBILITY_CACHE_CAPACITY]);
        assert_eq!(cached[1], sources[0]);
        assert!(!cached.contains(&sources[1]));

        // The evicted source is computed again and becomes the newest entry
        let recomputed = resolver.resolve_visible(&world, &sources[1], None, None);
        assert_eq!(recomputed.len(), 1);
        let cached = resolver.cached_sources();
        assert_eq!(cached[0], sources[1]);
        assert!(!cached.contains(&sources[2]));
        assert!(cached.contains(&sources[0]));
    }
}
