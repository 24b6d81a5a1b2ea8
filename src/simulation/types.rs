//! Type definitions for the propagation engine.
//!
//! Contains the plain geometric values shared across the engine:
//! - Points, line segments and axis-aligned rectangles (obstacles)
//! - Persisted configuration records (parameters and obstacles)
//!
//! Coordinates are world units (meters) in a plane where the y axis grows
//! "downwards", i.e. a rectangle's `y` is its minimum y coordinate.

use serde::{Deserialize, Serialize};

/// Simple 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Bearing from this point towards `other`, in radians (`atan2`).
    pub fn angle_to(&self, other: &Point) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Line segment between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub p1: Point,
    pub p2: Point,
}

impl Line {
    pub fn new(p1: Point, p2: Point) -> Self {
        Self { p1, p2 }
    }

    pub fn from_coords(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(Point::new(x1, y1), Point::new(x2, y2))
    }

    pub fn length(&self) -> f64 {
        self.p1.distance(&self.p2)
    }

    /// Axis-aligned bounding box of the segment (may have zero width or height).
    pub fn bounds(&self) -> Rect {
        let min_x = self.p1.x.min(self.p2.x);
        let min_y = self.p1.y.min(self.p2.y);
        Rect::new(min_x, min_y, self.p1.x.max(self.p2.x) - min_x, self.p1.y.max(self.p2.y) - min_y)
    }

    /// Manhattan-style distance between the endpoints of two segments.
    ///
    /// Used to decide whether a candidate edge is "the same" as a look-through line.
    pub fn endpoint_deviation(&self, other: &Line) -> f64 {
        (self.p1.x - other.p1.x).abs() + (self.p1.y - other.p1.y).abs() + (self.p2.x - other.p2.x).abs() + (self.p2.y - other.p2.y).abs()
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.p1, self.p2)
    }
}

/// Point lies left of the rectangle.
pub const OUT_LEFT: u8 = 1;
/// Point lies above the rectangle (smaller y).
pub const OUT_TOP: u8 = 2;
/// Point lies right of the rectangle.
pub const OUT_RIGHT: u8 = 4;
/// Point lies below the rectangle (larger y).
pub const OUT_BOTTOM: u8 = 8;

/// Axis-aligned rectangle, the only obstacle shape the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn min_x(&self) -> f64 {
        self.x
    }

    pub fn min_y(&self) -> f64 {
        self.y
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Half-open containment test: the low edges belong to the rectangle, the
    /// high edges do not.
    pub fn contains(&self, p: &Point) -> bool {
        !self.is_degenerate() && p.x >= self.x && p.y >= self.y && p.x < self.max_x() && p.y < self.max_y()
    }

    /// Inclusive containment test, used when points on the border count as inside.
    pub fn contains_inclusive(&self, p: &Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x <= self.max_x() && p.y <= self.max_y()
    }

    /// Smallest rectangle containing both rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Grow the rectangle so that it also covers `p`.
    pub fn add_point(&mut self, p: &Point) {
        let min_x = self.x.min(p.x);
        let min_y = self.y.min(p.y);
        let max_x = self.max_x().max(p.x);
        let max_y = self.max_y().max(p.y);
        *self = Rect::new(min_x, min_y, max_x - min_x, max_y - min_y);
    }

    /// Same rectangle with every side pushed outwards by `margin`.
    pub fn padded(&self, margin: f64) -> Rect {
        Rect::new(self.x - margin, self.y - margin, self.width + 2.0 * margin, self.height + 2.0 * margin)
    }

    /// Bit mask describing on which sides of the rectangle `p` lies
    /// (`OUT_LEFT`, `OUT_TOP`, `OUT_RIGHT`, `OUT_BOTTOM`). Zero when `p` is
    /// inside or on the border.
    pub fn outcode(&self, p: &Point) -> u8 {
        let mut out = 0;
        if self.width <= 0.0 {
            out |= OUT_LEFT | OUT_RIGHT;
        } else if p.x < self.x {
            out |= OUT_LEFT;
        } else if p.x > self.max_x() {
            out |= OUT_RIGHT;
        }
        if self.height <= 0.0 {
            out |= OUT_TOP | OUT_BOTTOM;
        } else if p.y < self.y {
            out |= OUT_TOP;
        } else if p.y > self.max_y() {
            out |= OUT_BOTTOM;
        }
        out
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min_x(), self.min_y()),
            Point::new(self.max_x(), self.min_y()),
            Point::new(self.max_x(), self.max_y()),
            Point::new(self.min_x(), self.max_y()),
        ]
    }

    /// The four border segments: top, right, bottom, left.
    pub fn edges(&self) -> [Line; 4] {
        let [a, b, c, d] = self.corners();
        [Line::new(a, b), Line::new(b, c), Line::new(d, c), Line::new(a, d)]
    }

    /// Both diagonals of the rectangle.
    pub fn diagonals(&self) -> [Line; 2] {
        let [a, b, c, d] = self.corners();
        [Line::new(a, c), Line::new(d, b)]
    }
}

/// One persisted `(parameterId, textValue)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedParameter {
    pub id: String,
    pub value: String,
}

/// One persisted rectangle obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedObstacle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<&Rect> for PersistedObstacle {
    fn from(rect: &Rect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

/// Logical save/load form of a channel model: every parameter as text, in
/// canonical order, followed by the obstacle list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedConfig {
    pub parameters: Vec<PersistedParameter>,
    #[serde(default)]
    pub obstacles: Vec<PersistedObstacle>,
}
