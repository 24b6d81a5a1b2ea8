//! Geometry calculations for ray tracing through rectangular obstacles.
//!
//! Contains helper functions for:
//! - Segment-segment intersection tests with collinear handling
//! - Intersection points of segments and of infinite lines
//! - Clipping a segment against a rectangle (penetration length)
//! - Triangle vs. rectangle overlap (shadow tests)
//!
//! Parallel or non-intersecting queries never fail: they return `None` and
//! leave a trace-level diagnostic.

use super::types::{Line, Point, Rect};

/// Segments shorter than this are rounding noise, not geometry.
pub const MIN_SEGMENT_LENGTH: f64 = 0.001;

/// Orientation of ordered triplet (a,b,c): returns 1 if clockwise, -1 if
/// counter-clockwise, and 0 if collinear.
fn orientation(a: &Point, b: &Point, c: &Point) -> i32 {
    let val = (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y);
    if val > 0.0 {
        1
    } else if val < 0.0 {
        -1
    } else {
        0
    }
}

/// True if point b lies on segment a–c, assuming collinearity.
fn on_segment(a: &Point, b: &Point, c: &Point) -> bool {
    b.x >= a.x.min(c.x) && b.x <= a.x.max(c.x) && b.y >= a.y.min(c.y) && b.y <= a.y.max(c.y)
}

/// Robust segment–segment intersection including collinear overlap.
///
/// Handles proper crossings, touching endpoints and collinear overlap using
/// the orientation of point triplets.
pub fn segments_intersect(p1: &Point, q1: &Point, p2: &Point, q2: &Point) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && on_segment(p1, p2, q1)) || (o2 == 0 && on_segment(p1, q2, q1)) || (o3 == 0 && on_segment(p2, p1, q2)) || (o4 == 0 && on_segment(p2, q1, q2))
}

/// Segment–segment intersection test on `Line` values.
pub fn lines_intersect(a: &Line, b: &Line) -> bool {
    segments_intersect(&a.p1, &a.p2, &b.p1, &b.p2)
}

/// Parameter along `second` where the infinite extensions of both lines meet.
fn crossing_parameter(first: &Line, second: &Line) -> Option<f64> {
    let dx1 = first.p2.x - first.p1.x;
    let dy1 = first.p2.y - first.p1.y;
    let dx2 = second.p2.x - second.p1.x;
    let dy2 = second.p2.y - second.p1.y;
    let det = dx2 * dy1 - dy2 * dx1;

    if det == 0.0 {
        log::trace!("Lines {} and {} are parallel", first, second);
        return None;
    }

    Some(((first.p1.x - second.p1.x) * dy1 - (first.p1.y - second.p1.y) * dx1) / det)
}

fn point_along(line: &Line, mu: f64) -> Point {
    Point::new(line.p1.x + mu * (line.p2.x - line.p1.x), line.p1.y + mu * (line.p2.y - line.p1.y))
}

/// Intersection point of `first` with the segment `second`.
///
/// The point is computed along `second`, so for an axis-aligned `second` the
/// fixed coordinate is reproduced exactly. Returns `None` when the lines are
/// parallel or the crossing falls outside `second`.
pub fn intersection_point(first: &Line, second: &Line) -> Option<Point> {
    let mu = crossing_parameter(first, second)?;
    if (0.0..=1.0).contains(&mu) {
        Some(point_along(second, mu))
    } else {
        log::trace!("Lines {} and {} do not intersect within segment", first, second);
        None
    }
}

/// Intersection point of the two lines stretched to infinity, computed along
/// `second`. Returns `None` only for parallel lines.
pub fn intersection_point_infinite(first: &Line, second: &Line) -> Option<Point> {
    crossing_parameter(first, second).map(|mu| point_along(second, mu))
}

/// Line of length `length` starting at `source` in direction `angle` (radians).
pub fn directed_line(source: &Point, angle: f64, length: f64) -> Line {
    Line::new(*source, Point::new(source.x + length * angle.cos(), source.y + length * angle.sin()))
}

/// Returns the part of segment `line` that lies inside `rect`, or `None` if
/// the segment does not pass through it.
///
/// Used to measure how far a refracted ray travels through an obstacle.
pub fn intersection_line(line: &Line, rect: &Rect) -> Option<Line> {
    // Entire line inside rectangle
    if rect.contains(&line.p1) && rect.contains(&line.p2) {
        return Some(*line);
    }

    let mut points: Vec<Point> = rect
        .edges()
        .iter()
        .filter(|side| lines_intersect(side, line))
        .filter_map(|side| intersection_point(line, side))
        .collect();

    if points.is_empty() {
        return None;
    }

    // If only one side was crossed, one endpoint must be inside the rectangle
    if points.len() == 1 {
        if rect.contains(&line.p1) {
            points.push(line.p1);
        } else if rect.contains(&line.p2) {
            points.push(line.p2);
        } else {
            // Border case, touching a single edge
            return None;
        }
    }

    if points.len() != 2 {
        // A segment through a corner touches two edges at the same point
        points.dedup_by(|a, b| a.distance(b) < MIN_SEGMENT_LENGTH);
        if points.len() != 2 {
            log::trace!("Segment {} crosses rectangle border in {} points", line, points.len());
            return None;
        }
    }

    if points[0].distance(&points[1]) < MIN_SEGMENT_LENGTH {
        return None;
    }

    Some(Line::new(points[0], points[1]))
}

/// Point-in-triangle test (border inclusive).
fn point_in_triangle(p: &Point, a: &Point, b: &Point, c: &Point) -> bool {
    let d1 = orientation(a, b, p);
    let d2 = orientation(b, c, p);
    let d3 = orientation(c, a, p);
    let has_cw = d1 > 0 || d2 > 0 || d3 > 0;
    let has_ccw = d1 < 0 || d2 < 0 || d3 < 0;
    !(has_cw && has_ccw)
}

/// True if the triangle `a`,`b`,`c` overlaps `rect`.
///
/// This is the area test of the shadow check: the triangle spans from the
/// viewer to both endpoints of a visible candidate.
pub fn triangle_intersects_rect(a: &Point, b: &Point, c: &Point, rect: &Rect) -> bool {
    if [a, b, c].iter().any(|p| rect.contains(p)) {
        return true;
    }
    if rect.corners().iter().any(|corner| point_in_triangle(corner, a, b, c)) {
        return true;
    }
    let triangle = [Line::new(*a, *b), Line::new(*b, *c), Line::new(*c, *a)];
    triangle.iter().any(|side| rect.edges().iter().any(|edge| lines_intersect(side, edge)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    #[test]
    fn geometry_segments_intersect_basic_cases() {
        assert!(segments_intersect(&p(0.0, 0.0), &p(10.0, 10.0), &p(0.0, 10.0), &p(10.0, 0.0)));

        // Collinear overlap
        assert!(segments_intersect(&p(0.0, 0.0), &p(10.0, 0.0), &p(5.0, 0.0), &p(15.0, 0.0)));

        // Disjoint
        assert!(!segments_intersect(&p(0.0, 0.0), &p(1.0, 1.0), &p(2.0, 2.0), &p(3.0, 3.0)));
    }

    #[test]
    fn intersection_point_lies_exactly_on_axis_aligned_second_line() {
        let ray = Line::new(p(0.3, 0.0), p(7.1, 13.0));
        let wall = Line::new(p(-5.0, 5.0), p(20.0, 5.0));
        let hit = intersection_point(&ray, &wall).unwrap();
        assert_eq!(hit.y, 5.0);
    }

    #[test]
    fn parallel_lines_have_no_intersection() {
        let a = Line::new(p(0.0, 0.0), p(10.0, 0.0));
        let b = Line::new(p(0.0, 1.0), p(10.0, 1.0));
        assert!(intersection_point(&a, &b).is_none());
        assert!(intersection_point_infinite(&a, &b).is_none());
    }

    #[test]
    fn infinite_intersection_extends_beyond_segments() {
        let a = Line::new(p(0.0, 0.0), p(1.0, 0.0));
        let b = Line::new(p(5.0, 1.0), p(5.0, 2.0));
        assert!(intersection_point(&a, &b).is_none());
        let hit = intersection_point_infinite(&a, &b).unwrap();
        assert!((hit.x - 5.0).abs() < 1e-12 && hit.y.abs() < 1e-12);
    }

    #[test]
    fn intersection_line_measures_penetration() {
        let rect = Rect::new(0.0, 0.0, 10.0, 4.0);
        let through = Line::new(p(5.0, -3.0), p(5.0, 10.0));
        let inside = intersection_line(&through, &rect).unwrap();
        assert!((inside.length() - 4.0).abs() < 1e-9);

        let half = Line::new(p(5.0, 2.0), p(5.0, 10.0));
        assert!((intersection_line(&half, &rect).unwrap().length() - 2.0).abs() < 1e-9);

        let miss = Line::new(p(20.0, -3.0), p(20.0, 10.0));
        assert!(intersection_line(&miss, &rect).is_none());
    }

    #[test]
    fn triangle_rectangle_overlap() {
        let rect = Rect::new(4.0, -1.0, 1.0, 2.0);
        assert!(triangle_intersects_rect(&p(0.0, 0.0), &p(10.0, -5.0), &p(10.0, 5.0), &rect));
        let far = Rect::new(-10.0, 20.0, 1.0, 1.0);
        assert!(!triangle_intersects_rect(&p(0.0, 0.0), &p(10.0, -5.0), &p(10.0, 5.0), &far));
    }

    #[test]
    fn directed_line_points_along_angle() {
        let line = directed_line(&p(1.0, 1.0), std::f64::consts::FRAC_PI_2, 2.0);
        assert!((line.p2.x - 1.0).abs() < 1e-12);
        assert!((line.p2.y - 3.0).abs() < 1e-12);
    }
}
