//! Polyline from transmitter to receiver produced by the path extractor.

use super::types::{Line, Point};

/// Interaction at a path vertex. The kind of a vertex describes what
/// happens at its start of the next sub-path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayKind {
    Origin,
    Refraction,
    Reflection,
    Diffraction,
    Destination,
}

impl std::fmt::Display for RayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RayKind::Origin => "origin",
            RayKind::Refraction => "refraction",
            RayKind::Reflection => "reflection",
            RayKind::Diffraction => "diffraction",
            RayKind::Destination => "destination",
        };
        f.write_str(name)
    }
}

/// Ordered vertices from origin to destination, each tagged with its kind.
///
/// Paths are assembled backwards (destination first) with [`RayPath::push_front`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RayPath {
    points: Vec<Point>,
    kinds: Vec<RayKind>,
}

impl RayPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_front(&mut self, point: Point, kind: RayKind) {
        self.points.insert(0, point);
        self.kinds.insert(0, kind);
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn kinds(&self) -> &[RayKind] {
        &self.kinds
    }

    pub fn sub_path_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// Segment from vertex `index` to vertex `index + 1`.
    pub fn sub_path(&self, index: usize) -> Option<Line> {
        Some(Line::new(*self.points.get(index)?, *self.points.get(index + 1)?))
    }

    /// Kind of vertex `index`, i.e. the interaction starting sub-path `index`.
    pub fn kind(&self, index: usize) -> Option<RayKind> {
        self.kinds.get(index).copied()
    }

    /// Sub-paths with the kind of their start vertex.
    pub fn sub_paths(&self) -> impl Iterator<Item = (Line, RayKind)> + '_ {
        self.points.windows(2).zip(&self.kinds).map(|(pair, kind)| (Line::new(pair[0], pair[1]), *kind))
    }

    pub fn total_length(&self) -> f64 {
        self.points.windows(2).map(|pair| pair[0].distance(&pair[1])).sum()
    }
}

impl std::fmt::Display for RayPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (point, kind)) in self.points.iter().zip(&self.kinds).enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{} [{}]", point, kind)?;
        }
        Ok(())
    }
}
