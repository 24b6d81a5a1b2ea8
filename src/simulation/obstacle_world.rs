//! Obstacle store: the set of axis-aligned rectangles the signal interacts with.
//!
//! The propagation engine only relies on the read queries of [`ObstacleQuery`].
//! [`ObstacleWorld`] is the concrete store used by the channel model:
//! - coordinates are rounded to millimetres when added
//! - rectangles can be merged with neighbours when the union adds no area
//! - a generation counter is bumped on every mutation so callers can drop
//!   results derived from an older obstacle set

use super::angle_interval::AngleInterval;
use super::types::{Point, Rect};

/// Offset of the probes used by corner and proximity queries (1 cm).
pub const PROBE_DISTANCE: f64 = 0.01;

/// Relative area tolerance when deciding whether two rectangles can merge.
const MERGE_TOLERANCE: f64 = 0.01;

/// Read-only queries the propagation engine runs against the obstacle set.
pub trait ObstacleQuery {
    /// Candidate rectangles that may be visible from `point` inside
    /// `interval`, nearest first. May return more than strictly visible.
    fn obstacles_in_angle_interval(&self, point: &Point, interval: &AngleInterval) -> Vec<Rect>;

    /// Rectangles lying at or very near `point`.
    fn obstacles_near(&self, point: &Point) -> Vec<Rect>;

    /// True if `point` sits on an outer corner of exactly one obstacle.
    fn point_is_near_corner(&self, point: &Point) -> bool;

    /// Changes whenever the obstacle set changes.
    fn generation(&self) -> u64;
}

#[derive(Debug, Clone, Default)]
pub struct ObstacleWorld {
    obstacles: Vec<Rect>,
    outer_bounds: Option<Rect>,
    generation: u64,
}

fn round_mm(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Shortest distance from `point` to any point of `rect` (zero inside).
fn distance_to_rect(point: &Point, rect: &Rect) -> f64 {
    let dx = (rect.min_x() - point.x).max(0.0).max(point.x - rect.max_x());
    let dy = (rect.min_y() - point.y).max(0.0).max(point.y - rect.max_y());
    (dx * dx + dy * dy).sqrt()
}

impl ObstacleWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Rect> {
        self.obstacles.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rect> {
        self.obstacles.iter()
    }

    /// Bounding box of all obstacles, `None` when the world is empty.
    pub fn outer_bounds(&self) -> Option<Rect> {
        self.outer_bounds
    }

    /// Adds an obstacle, rounding its coordinates to millimetres. With
    /// `merge`, the obstacle is merged with every existing rectangle it can be
    /// joined with without adding area. Returns the rectangle finally stored,
    /// or `None` if the rounded rectangle has no area.
    pub fn add_obstacle(&mut self, obstacle: Rect, merge: bool) -> Option<Rect> {
        let rounded = Rect::new(round_mm(obstacle.x), round_mm(obstacle.y), round_mm(obstacle.width), round_mm(obstacle.height));
        if !(rounded.width > 0.0 && rounded.height > 0.0) {
            log::warn!("Rejecting obstacle ({}, {}) {}x{}: thinner than 1 mm", obstacle.x, obstacle.y, obstacle.width, obstacle.height);
            return None;
        }
        self.push(rounded);

        let mut current = rounded;
        if merge {
            while let Some(merged) = self.merge_once(&current) {
                log::debug!("Merged obstacle into ({}, {}) {}x{}", merged.x, merged.y, merged.width, merged.height);
                current = merged;
            }
        }
        Some(current)
    }

    /// Removes the first obstacle equal to `obstacle`. Returns false if none was found.
    pub fn remove_obstacle(&mut self, obstacle: &Rect) -> bool {
        let Some(index) = self.obstacles.iter().position(|o| o == obstacle) else {
            return false;
        };
        self.obstacles.remove(index);
        self.recreate_outer_bounds();
        self.generation += 1;
        true
    }

    pub fn remove_all(&mut self) {
        self.obstacles.clear();
        self.outer_bounds = None;
        self.generation += 1;
    }

    fn push(&mut self, obstacle: Rect) {
        self.obstacles.push(obstacle);
        self.outer_bounds = Some(match self.outer_bounds {
            Some(bounds) => bounds.union(&obstacle),
            None => obstacle,
        });
        self.generation += 1;
    }

    fn recreate_outer_bounds(&mut self) {
        self.outer_bounds = self.obstacles.iter().copied().reduce(|acc, o| acc.union(&o));
    }

    /// Merges `candidate` with the first existing obstacle whose union with
    /// it covers no more than their combined area (within tolerance).
    fn merge_once(&mut self, candidate: &Rect) -> Option<Rect> {
        let candidate_area = candidate.area();
        let existing = self.obstacles.iter().copied().find(|existing| {
            if existing == candidate {
                return false;
            }
            let union = existing.union(candidate);
            let tolerance = (candidate_area * MERGE_TOLERANCE).min(existing.area() * MERGE_TOLERANCE);
            union.area() - tolerance <= existing.area() + candidate_area
        })?;

        let union = existing.union(candidate);
        self.remove_obstacle(candidate);
        self.remove_obstacle(&existing);
        self.push(union);
        Some(union)
    }
}

impl ObstacleQuery for ObstacleWorld {
    fn obstacles_in_angle_interval(&self, point: &Point, interval: &AngleInterval) -> Vec<Rect> {
        let mut candidates: Vec<Rect> = self
            .obstacles
            .iter()
            .filter(|rect| rect.contains_inclusive(point) || rect.diagonals().iter().any(|diagonal| AngleInterval::of_line(point, diagonal).intersects(interval)))
            .copied()
            .collect();
        candidates.sort_by(|a, b| distance_to_rect(point, a).total_cmp(&distance_to_rect(point, b)));
        candidates
    }

    fn obstacles_near(&self, point: &Point) -> Vec<Rect> {
        self.obstacles.iter().filter(|rect| rect.padded(PROBE_DISTANCE).contains_inclusive(point)).copied().collect()
    }

    fn point_is_near_corner(&self, point: &Point) -> bool {
        let probes = [
            Point::new(point.x - PROBE_DISTANCE, point.y - PROBE_DISTANCE),
            Point::new(point.x - PROBE_DISTANCE, point.y + PROBE_DISTANCE),
            Point::new(point.x + PROBE_DISTANCE, point.y - PROBE_DISTANCE),
            Point::new(point.x + PROBE_DISTANCE, point.y + PROBE_DISTANCE),
        ];

        let mut contained = 0;
        for obstacle in &self.obstacles {
            contained += probes.iter().filter(|probe| obstacle.contains(probe)).count();
            if contained > 1 {
                return false;
            }
        }
        contained == 1
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn coordinates_are_rounded_to_millimetres() {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(1.00049, 2.0, 3.0004, 4.0), false);
        assert_eq!(world.get(0), Some(Rect::new(1.0, 2.0, 3.0, 4.0)));
    }

    #[test]
    fn rectangles_thinner_than_a_millimetre_are_rejected() {
        let mut world = ObstacleWorld::new();
        let generation = world.generation();
        assert_eq!(world.add_obstacle(Rect::new(0.0, 0.0, 0.0004, 5.0), false), None);
        assert_eq!(world.add_obstacle(Rect::new(0.0, 0.0, 5.0, -1.0), true), None);
        assert!(world.is_empty());
        assert_eq!(world.generation(), generation);
        // Rounds up to a full millimetre
        assert_eq!(world.add_obstacle(Rect::new(0.0, 0.0, 0.0006, 5.0), false), Some(Rect::new(0.0, 0.0, 0.001, 5.0)));
    }

    #[test]
    fn adjacent_rectangles_merge() {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(0.0, 0.0, 1.0, 1.0), true);
        let merged = world.add_obstacle(Rect::new(1.0, 0.0, 2.0, 1.0), true);
        assert_eq!(world.len(), 1);
        assert_eq!(merged, Some(Rect::new(0.0, 0.0, 3.0, 1.0)));
        assert_eq!(world.outer_bounds(), Some(Rect::new(0.0, 0.0, 3.0, 1.0)));
    }

    #[test]
    fn diagonal_neighbours_do_not_merge() {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(0.0, 0.0, 1.0, 1.0), true);
        world.add_obstacle(Rect::new(1.0, 1.0, 1.0, 1.0), true);
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn generation_changes_on_mutation() {
        let mut world = ObstacleWorld::new();
        let g0 = world.generation();
        world.add_obstacle(Rect::new(0.0, 0.0, 1.0, 1.0), false);
        let g1 = world.generation();
        assert_ne!(g0, g1);
        assert!(world.remove_obstacle(&Rect::new(0.0, 0.0, 1.0, 1.0)));
        assert_ne!(world.generation(), g1);
        assert!(world.is_empty());
        assert_eq!(world.outer_bounds(), None);
    }

    #[test]
    fn angle_query_filters_and_orders_by_distance() {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(20.0, -1.0, 1.0, 2.0), false);
        world.add_obstacle(Rect::new(10.0, -1.0, 1.0, 2.0), false);
        world.add_obstacle(Rect::new(-10.0, -1.0, 1.0, 2.0), false);

        let origin = Point::new(0.0, 0.0);
        let east = AngleInterval::new(-0.3, 0.3);
        let found = world.obstacles_in_angle_interval(&origin, &east);
        assert_eq!(found, vec![Rect::new(10.0, -1.0, 1.0, 2.0), Rect::new(20.0, -1.0, 1.0, 2.0)]);

        let west = AngleInterval::new(PI - 0.3, PI + 0.3);
        assert_eq!(world.obstacles_in_angle_interval(&origin, &west).len(), 1);
    }

    #[test]
    fn corner_detection() {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(0.0, 0.0, 10.0, 10.0), false);
        assert!(world.point_is_near_corner(&Point::new(0.0, 0.0)));
        assert!(world.point_is_near_corner(&Point::new(10.0, 10.0)));
        // Middle of an edge has two probes inside
        assert!(!world.point_is_near_corner(&Point::new(5.0, 0.0)));
        assert!(!world.point_is_near_corner(&Point::new(-5.0, -5.0)));
    }

    #[test]
    fn near_query_includes_points_on_the_border() {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(0.0, 0.0, 10.0, 10.0), false);
        assert_eq!(world.obstacles_near(&Point::new(10.0, 5.0)).len(), 1);
        assert!(world.obstacles_near(&Point::new(10.5, 5.0)).is_empty());
    }
}
