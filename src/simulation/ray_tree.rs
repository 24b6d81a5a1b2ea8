//! Ray tree construction and path extraction.
//!
//! The ray tree is an arena of [`RayNode`]s addressed by index. Starting from
//! the transmitter, every visible obstacle edge spawns:
//! - a refraction child (same origin, looking through the edge)
//! - a reflection child (origin mirrored across the edge)
//! - a diffraction child for every visible edge endpoint on an obstacle corner
//!
//! each one consuming one unit of the matching budget and of the total ray
//! budget. The tree is built depth-first and walked breadth-first by the
//! [`RayTracer::connecting_paths`] extractor, which climbs from every node
//! that can see the receiver back to the root to assemble a [`RayPath`].

use super::angle_interval::AngleInterval;
use super::geometry;
use super::obstacle_world::ObstacleQuery;
use super::parameters::RayBudget;
use super::ray_path::{RayKind, RayPath};
use super::types::{Line, Point};
use super::visibility::VisibilityResolver;

/// Sub-paths shorter than this make a path degenerate.
pub const MIN_SUB_PATH_LENGTH: f64 = 0.01;

/// Half-width (radians) of the sector searched by the direct-path test.
const DIRECT_PATH_SECTOR: f64 = 0.1;

/// Obstructions closer than this to the destination do not block it.
const DIRECT_PATH_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub enum RayInteraction {
    Origin,
    Refraction { boundary: Line },
    Reflection { boundary: Line },
    Diffraction,
}

impl RayInteraction {
    pub fn kind(&self) -> RayKind {
        match self {
            RayInteraction::Origin => RayKind::Origin,
            RayInteraction::Refraction { .. } => RayKind::Refraction,
            RayInteraction::Reflection { .. } => RayKind::Reflection,
            RayInteraction::Diffraction => RayKind::Diffraction,
        }
    }

    /// Boundary segment the ray passes or bounces at, if any.
    pub fn boundary(&self) -> Option<&Line> {
        match self {
            RayInteraction::Refraction { boundary } | RayInteraction::Reflection { boundary } => Some(boundary),
            RayInteraction::Origin | RayInteraction::Diffraction => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RayNode {
    pub interaction: RayInteraction,
    /// Point rays of this node start from (a mirrored pseudo-source for reflections).
    pub origin: Point,
    /// Budgets left for the node's descendants.
    pub budget: RayBudget,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Arena of ray nodes. Index 0 is always the `Origin` root.
#[derive(Debug, Clone)]
pub struct RayTree {
    nodes: Vec<RayNode>,
}

impl RayTree {
    fn with_root(source: Point, budget: RayBudget) -> Self {
        Self {
            nodes: vec![RayNode {
                interaction: RayInteraction::Origin,
                origin: source,
                budget,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> &RayNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: usize) -> Option<&RayNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[RayNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn add_child(&mut self, parent: usize, interaction: RayInteraction, origin: Point, budget: RayBudget) -> usize {
        let index = self.nodes.len();
        self.nodes.push(RayNode {
            interaction,
            origin,
            budget,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(index);
        index
    }

    /// Node indices in breadth-first order starting at the root.
    pub fn breadth_first(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        if self.nodes.is_empty() {
            return order;
        }
        order.push(0);
        let mut next = 0;
        while next < order.len() {
            order.extend(self.nodes[order[next]].children.iter().copied());
            next += 1;
        }
        order
    }
}

/// Mirror `source` across an axis-aligned `side`: the coordinate along which
/// the side is thin gets reflected.
pub fn mirror_across(source: &Point, side: &Line) -> Point {
    let bounds = side.bounds();
    if bounds.height > bounds.width {
        Point::new(2.0 * side.p1.x - source.x, source.y)
    } else {
        Point::new(source.x, 2.0 * side.p1.y - source.y)
    }
}

/// Ray tracing queries over one obstacle set, sharing the visibility cache.
pub struct RayTracer<'a> {
    obstacles: &'a dyn ObstacleQuery,
    visibility: &'a mut VisibilityResolver,
}

/// Switches that influence which paths are extracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathOptions {
    pub disallow_direct_path: bool,
    pub ignore_non_direct: bool,
}

impl<'a> RayTracer<'a> {
    pub fn new(obstacles: &'a dyn ObstacleQuery, visibility: &'a mut VisibilityResolver) -> Self {
        Self { obstacles, visibility }
    }

    /// Builds the full ray tree rooted at `source`.
    pub fn build_tree(&mut self, source: Point, budget: RayBudget) -> RayTree {
        let mut tree = RayTree::with_root(source, budget);
        self.expand(&mut tree, 0);
        log::trace!("Ray tree from {} has {} nodes", source, tree.len());
        tree
    }

    fn expand(&mut self, tree: &mut RayTree, index: usize) {
        let node = tree.nodes[index].clone();
        let budget = node.budget;
        if budget.total_rays <= 0 {
            return;
        }

        let visible = self.visibility.resolve_visible(self.obstacles, &node.origin, None, node.interaction.boundary());

        if budget.refractions > 0 {
            for side in &visible {
                let child_budget = RayBudget {
                    total_rays: budget.total_rays - 1,
                    refractions: budget.refractions - 1,
                    ..budget
                };
                let child = tree.add_child(index, RayInteraction::Refraction { boundary: *side }, node.origin, child_budget);
                self.expand(tree, child);
            }
        }

        if budget.reflections > 0 {
            for side in &visible {
                let child_budget = RayBudget {
                    total_rays: budget.total_rays - 1,
                    reflections: budget.reflections - 1,
                    ..budget
                };
                let pseudo_source = mirror_across(&node.origin, side);
                let child = tree.add_child(index, RayInteraction::Reflection { boundary: *side }, pseudo_source, child_budget);
                self.expand(tree, child);
            }
        }

        if budget.diffractions > 0 {
            for corner in self.diffraction_sources(&visible) {
                let child_budget = RayBudget {
                    total_rays: budget.total_rays - 1,
                    diffractions: budget.diffractions - 1,
                    ..budget
                };
                let child = tree.add_child(index, RayInteraction::Diffraction, corner, child_budget);
                self.expand(tree, child);
            }
        }
    }

    /// Endpoints of visible sides that lie on an obstacle corner.
    fn diffraction_sources(&self, visible: &[Line]) -> Vec<Point> {
        let mut sources: Vec<Point> = Vec::new();
        for side in visible {
            for endpoint in [side.p1, side.p2] {
                if self.obstacles.point_is_near_corner(&endpoint) && !sources.contains(&endpoint) {
                    sources.push(endpoint);
                }
            }
        }
        sources
    }

    /// True if nothing visible from `source` crosses the segment to `dest`.
    ///
    /// Only edges facing `source` are considered, so an obstacle containing
    /// `source` (or with `source` on its border) does not block. The test is
    /// therefore not symmetric.
    pub fn is_direct_path(&mut self, source: &Point, dest: &Point) -> bool {
        let to_dest = Line::new(*source, *dest);
        let angle = source.angle_to(dest);
        let sector = AngleInterval::new(angle - DIRECT_PATH_SECTOR, angle + DIRECT_PATH_SECTOR);

        let visible = self.visibility.resolve_visible(self.obstacles, source, Some(&sector), None);
        for side in visible.iter().filter(|side| geometry::lines_intersect(side, &to_dest)) {
            match geometry::intersection_point_infinite(side, &to_dest) {
                Some(crossing) if dest.distance(&crossing) > DIRECT_PATH_TOLERANCE => return false,
                Some(_) => {}
                None => log::trace!("Side {} runs along {}, not treated as blocking", side, to_dest),
            }
        }
        true
    }

    /// Every admissible path from `origin` to `dest` through `tree`.
    pub fn connecting_paths(&mut self, origin: &Point, dest: &Point, tree: &RayTree, options: PathOptions) -> Vec<RayPath> {
        let mut paths = Vec::new();

        for index in tree.breadth_first() {
            let node = &tree.nodes[index];
            let to_dest = Line::new(node.origin, *dest);

            // Last vertex before the destination, if the node can see it
            let before_dest = match &node.interaction {
                RayInteraction::Origin => {
                    if options.disallow_direct_path {
                        continue;
                    }
                    node.origin
                }
                RayInteraction::Refraction { boundary } | RayInteraction::Reflection { boundary } => {
                    if !geometry::lines_intersect(&to_dest, boundary) {
                        continue;
                    }
                    match geometry::intersection_point(&to_dest, boundary) {
                        Some(point) => point,
                        None => continue,
                    }
                }
                RayInteraction::Diffraction => node.origin,
            };

            if !self.is_direct_path(&before_dest, dest) {
                continue;
            }

            if let Some(path) = self.trace_back(tree, index, origin, dest, before_dest) {
                let direct = node.interaction == RayInteraction::Origin;
                paths.push(path);
                if direct && options.ignore_non_direct {
                    return paths;
                }
            }
        }

        paths
    }

    /// Climbs from node `index` to the root, building the path backwards.
    /// Returns `None` if any sub-path is degenerate or a diffraction hop is obstructed.
    fn trace_back(&mut self, tree: &RayTree, index: usize, origin: &Point, dest: &Point, before_dest: Point) -> Option<RayPath> {
        let start = &tree.nodes[index];
        let mut path = RayPath::new();
        path.push_front(*dest, RayKind::Destination);
        path.push_front(before_dest, start.interaction.kind());

        let mut last = *dest;
        let mut newest = before_dest;

        if start.interaction != RayInteraction::Origin && newest.distance(&last) < MIN_SUB_PATH_LENGTH {
            return None;
        }
        // A diffracted ray must also be unobstructed seen from the destination
        if start.interaction == RayInteraction::Diffraction && !self.is_direct_path(&last, &newest) {
            return None;
        }

        let mut current = start;
        while current.interaction != RayInteraction::Origin {
            current = &tree.nodes[current.parent?];
            last = newest;
            newest = match &current.interaction {
                RayInteraction::Origin => *origin,
                RayInteraction::Refraction { boundary } | RayInteraction::Reflection { boundary } => {
                    geometry::intersection_point_infinite(&Line::new(current.origin, last), boundary)?
                }
                RayInteraction::Diffraction => current.origin,
            };
            path.push_front(newest, current.interaction.kind());

            if newest.distance(&last) < MIN_SUB_PATH_LENGTH {
                return None;
            }
            if current.interaction == RayInteraction::Diffraction && !self.is_direct_path(&last, &newest) {
                return None;
            }
        }

        Some(path)
    }
}
