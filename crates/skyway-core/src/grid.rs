//! Grid pathfinder: walkability raster plus A*.
//!
//! Deterministic safety net behind the swarm optimizer. The grid spans the
//! start/end box padded on every side, marks a node walkable when its centre
//! lies outside every buffer by at least half a cell diagonal, and searches
//! the 8-connected lattice.

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::cancel::CancelToken;
use crate::error::{PlanError, Result};
use crate::geometry::{GeometryKernel, Point};
use crate::obstacles::ObstacleField;
use crate::spatial::{length_2d, turn_angle, PlanarBox, Xy};

/// Expansions between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 4096;
const NO_PARENT: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub cell_size_m: f64,
    /// Margin added around the start/end box
    pub padding_m: f64,
    /// Upper bound on grid nodes; the cell grows until the grid fits
    pub max_nodes: usize,
    /// Interior points turning less than this are collapsed
    pub collinear_tolerance_deg: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size_m: 20.0,
            padding_m: 500.0,
            max_nodes: 250_000,
            collinear_tolerance_deg: 5.0,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.cell_size_m.is_finite() || self.cell_size_m <= 0.0 {
            return Err(PlanError::invalid_config(format!(
                "grid cell_size_m must be positive, got {}",
                self.cell_size_m
            )));
        }
        if !self.padding_m.is_finite() || self.padding_m < 0.0 {
            return Err(PlanError::invalid_config(format!(
                "grid padding_m must be non-negative, got {}",
                self.padding_m
            )));
        }
        if self.max_nodes < 4 {
            return Err(PlanError::invalid_config("grid max_nodes must be at least 4"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridNode {
    pub x: usize,
    pub y: usize,
    pub lat: f64,
    pub lng: f64,
    pub walkable: bool,
}

/// Arena of grid nodes indexed by `y * cols + x`.
#[derive(Debug, Clone)]
pub struct WalkabilityGrid {
    cols: usize,
    rows: usize,
    cell_m: f64,
    origin: Xy,
    nodes: Vec<GridNode>,
}

impl WalkabilityGrid {
    pub fn build<K: GeometryKernel>(
        kernel: &K,
        field: &ObstacleField,
        start: Xy,
        end: Xy,
        config: &GridConfig,
    ) -> Self {
        let bbox = PlanarBox::segment(start, end).expanded(config.padding_m);
        let width = (bbox.max_x - bbox.min_x).max(f64::EPSILON);
        let height = (bbox.max_y - bbox.min_y).max(f64::EPSILON);
        let max_nodes = config.max_nodes.max(4) as f64;

        let mut cell_m = config
            .cell_size_m
            .max((width * height / max_nodes).sqrt());
        let dims = |cell: f64| {
            (
                (width / cell).ceil() as usize + 1,
                (height / cell).ceil() as usize + 1,
            )
        };
        let (mut cols, mut rows) = dims(cell_m);
        while (cols * rows) as f64 > max_nodes {
            cell_m *= 1.05;
            (cols, rows) = dims(cell_m);
        }

        // Any edge between two walkable nodes then stays outside every buffer.
        let clearance_km = cell_m * std::f64::consts::SQRT_2 / 2.0 / 1000.0;
        let origin = (bbox.min_x, bbox.min_y);
        let mut nodes = Vec::with_capacity(cols * rows);
        for y in 0..rows {
            for x in 0..cols {
                let xy = (origin.0 + x as f64 * cell_m, origin.1 + y as f64 * cell_m);
                let p = kernel.unproject(xy);
                nodes.push(GridNode {
                    x,
                    y,
                    lat: p.lat,
                    lng: p.lng,
                    walkable: field.point_has_clearance(kernel, p, clearance_km),
                });
            }
        }

        Self {
            cols,
            rows,
            cell_m,
            origin,
            nodes,
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cell_size_m(&self) -> f64 {
        self.cell_m
    }

    pub fn node(&self, x: usize, y: usize) -> Option<&GridNode> {
        if x >= self.cols || y >= self.rows {
            return None;
        }
        self.nodes.get(y * self.cols + x)
    }

    fn center(&self, idx: usize) -> Xy {
        let (x, y) = (idx % self.cols, idx / self.cols);
        (
            self.origin.0 + x as f64 * self.cell_m,
            self.origin.1 + y as f64 * self.cell_m,
        )
    }

    fn walkable(&self, x: isize, y: isize) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        self.node(x as usize, y as usize).is_some_and(|n| n.walkable)
    }

    /// Index of the walkable node closest to `xy`.
    pub fn nearest_walkable(&self, xy: Xy) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.walkable)
            .map(|(idx, _)| (idx, length_2d(self.center(idx), xy)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
    }

    pub fn walkable_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.walkable).count()
    }
}

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    idx: usize,
    g_score: FloatOrd,
    f_score: FloatOrd,
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_score
            .cmp(&other.f_score)
            .then_with(|| self.g_score.cmp(&other.g_score))
            .then_with(|| self.idx.cmp(&other.idx))
    }
}

/// Result of a grid search.
#[derive(Debug, Clone)]
pub struct GridOutcome {
    /// Full polyline, start and end included.
    pub waypoints: Vec<Point>,
    pub nodes_visited: usize,
    /// True when no path was found and the direct line was returned.
    pub fallback: bool,
    pub errors: Vec<String>,
}

impl GridOutcome {
    fn direct(start: Point, end: Point, nodes_visited: usize, error: Option<String>) -> Self {
        Self {
            waypoints: vec![start, end],
            nodes_visited,
            fallback: error.is_some(),
            errors: error.into_iter().collect(),
        }
    }
}

/// Plan `start -> end` on a walkability grid.
pub fn find_path<K: GeometryKernel>(
    kernel: &K,
    field: &ObstacleField,
    start: Point,
    end: Point,
    config: &GridConfig,
    cancel: &CancelToken,
) -> Result<GridOutcome> {
    if field.segment_is_clear(kernel, start, end) {
        return Ok(GridOutcome::direct(start, end, 0, None));
    }

    let start_xy = kernel.project(start);
    let end_xy = kernel.project(end);
    let grid = WalkabilityGrid::build(kernel, field, start_xy, end_xy, config);
    tracing::debug!(
        "grid {}x{} at {:.1} m, {} walkable",
        grid.cols(),
        grid.rows(),
        grid.cell_size_m(),
        grid.walkable_count()
    );

    let (Some(start_idx), Some(goal_idx)) =
        (grid.nearest_walkable(start_xy), grid.nearest_walkable(end_xy))
    else {
        tracing::warn!("grid has no walkable node near start or end; using direct line");
        return Ok(GridOutcome::direct(
            start,
            end,
            0,
            Some("no walkable start or end node".to_string()),
        ));
    };

    let (nodes, nodes_visited) = match astar(&grid, start_idx, goal_idx, cancel)? {
        (Some(nodes), visited) => (nodes, visited),
        (None, visited) => {
            tracing::warn!("A* exhausted {visited} nodes without reaching the goal");
            return Ok(GridOutcome::direct(
                start,
                end,
                visited,
                Some("A* failed to find a path".to_string()),
            ));
        }
    };

    let mut path: Vec<Xy> = Vec::with_capacity(nodes.len() + 2);
    path.push(start_xy);
    path.extend(nodes.iter().map(|idx| grid.center(*idx)));
    path.push(end_xy);
    path.dedup_by(|a, b| length_2d(*a, *b) < 1e-6);

    let collapsed = collapse_collinear(&path, config.collinear_tolerance_deg.to_radians(), |a, b| {
        field.segment_is_clear(kernel, kernel.unproject(a), kernel.unproject(b))
    });
    let smoothed = smooth_path(kernel, field, &collapsed);

    let mut waypoints: Vec<Point> = smoothed.iter().map(|xy| kernel.unproject(*xy)).collect();
    if let Some(first) = waypoints.first_mut() {
        *first = start;
    }
    if let Some(last) = waypoints.last_mut() {
        *last = end;
    }

    Ok(GridOutcome {
        waypoints,
        nodes_visited,
        fallback: false,
        errors: Vec::new(),
    })
}

fn astar(
    grid: &WalkabilityGrid,
    start_idx: usize,
    goal_idx: usize,
    cancel: &CancelToken,
) -> Result<(Option<Vec<usize>>, usize)> {
    const NEIGHBORS: [(isize, isize); 8] = [
        (1, 0),
        (-1, 0),
        (0, 1),
        (0, -1),
        (1, 1),
        (1, -1),
        (-1, 1),
        (-1, -1),
    ];

    let n = grid.nodes.len();
    let goal_xy = grid.center(goal_idx);
    let mut g_score = vec![f64::INFINITY; n];
    let mut came_from = vec![NO_PARENT; n];
    let mut closed = vec![false; n];
    let mut open_set: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();

    g_score[start_idx] = 0.0;
    open_set.push(Reverse(OpenNode {
        idx: start_idx,
        g_score: FloatOrd(0.0),
        f_score: FloatOrd(length_2d(grid.center(start_idx), goal_xy)),
    }));

    let mut nodes_visited = 0usize;
    while let Some(Reverse(current)) = open_set.pop() {
        if closed[current.idx] || current.g_score.0 > g_score[current.idx] + 1e-9 {
            continue;
        }
        nodes_visited += 1;
        if nodes_visited % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(PlanError::Cancelled);
        }

        if current.idx == goal_idx {
            let mut path = vec![goal_idx];
            let mut cursor = came_from[goal_idx];
            while cursor != NO_PARENT {
                path.push(cursor);
                cursor = came_from[cursor];
            }
            path.reverse();
            return Ok((Some(path), nodes_visited));
        }
        closed[current.idx] = true;

        let cx = (current.idx % grid.cols) as isize;
        let cy = (current.idx / grid.cols) as isize;
        for (dx, dy) in NEIGHBORS {
            let (nx, ny) = (cx + dx, cy + dy);
            if !grid.walkable(nx, ny) {
                continue;
            }
            // No corner cutting past a blocked orthogonal neighbour.
            if dx != 0 && dy != 0 && (!grid.walkable(cx + dx, cy) || !grid.walkable(cx, cy + dy)) {
                continue;
            }
            let next = ny as usize * grid.cols + nx as usize;
            if closed[next] {
                continue;
            }

            let step = if dx != 0 && dy != 0 {
                std::f64::consts::SQRT_2
            } else {
                1.0
            } * grid.cell_m;
            let tentative_g = g_score[current.idx] + step;
            if tentative_g < g_score[next] {
                came_from[next] = current.idx;
                g_score[next] = tentative_g;
                open_set.push(Reverse(OpenNode {
                    idx: next,
                    g_score: FloatOrd(tentative_g),
                    f_score: FloatOrd(tentative_g + length_2d(grid.center(next), goal_xy)),
                }));
            }
        }
    }

    Ok((None, nodes_visited))
}

/// Drop interior points whose turn is below `tolerance_rad`, as long as the
/// chord that replaces them stays clear.
fn collapse_collinear<F>(path: &[Xy], tolerance_rad: f64, is_clear: F) -> Vec<Xy>
where
    F: Fn(Xy, Xy) -> bool,
{
    if path.len() <= 2 {
        return path.to_vec();
    }
    let mut out = vec![path[0]];
    for i in 1..path.len() - 1 {
        let prev = out[out.len() - 1];
        if turn_angle(prev, path[i], path[i + 1]) >= tolerance_rad || !is_clear(prev, path[i + 1]) {
            out.push(path[i]);
        }
    }
    out.push(path[path.len() - 1]);
    out
}

/// Line-of-sight shortcutting: from each kept point jump to the furthest
/// point whose chord is clear of every buffer.
fn smooth_path<K: GeometryKernel>(kernel: &K, field: &ObstacleField, path: &[Xy]) -> Vec<Xy> {
    if path.len() <= 2 {
        return path.to_vec();
    }

    let mut smoothed = vec![path[0]];
    let mut current_idx = 0usize;
    while current_idx < path.len() - 1 {
        let current = kernel.unproject(path[current_idx]);
        let mut furthest_valid = current_idx + 1;
        for target_idx in (current_idx + 2)..path.len() {
            if field.segment_is_clear(kernel, current, kernel.unproject(path[target_idx])) {
                furthest_valid = target_idx;
            }
        }
        smoothed.push(path[furthest_valid]);
        current_idx = furthest_valid;
    }
    smoothed
}
