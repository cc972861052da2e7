//! Fast geometric router used in place of the optimizer when latency matters.
//!
//! Works against the union of all buffers and cascades through weaker
//! strategies until one yields a clear route: direct line, tangent bends,
//! boundary following, perpendicular offset, and finally the unsafe direct
//! line.

use serde::{Deserialize, Serialize};

use crate::geometry::{GeometryKernel, Point, Region};
use crate::obstacles::ObstacleField;
use crate::pso::refine::drop_redundant;
use crate::spatial::{length_2d, ring_signed_area2, segment_crossing_param, Xy};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Boundary samples for the tangent search, shared across all merged
    /// polygons in proportion to their perimeter
    pub tangent_samples: usize,
    /// Distance samples and walked vertices are pushed off the boundary
    pub boundary_clearance_m: f64,
    /// Walked vertices closer than this to the previous kept one are dropped
    pub simplify_distance_m: f64,
    /// Perpendicular offset beyond the region, as a multiple of the safety buffer
    pub perpendicular_offset_factor: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            tangent_samples: 20,
            boundary_clearance_m: 10.0,
            simplify_distance_m: 50.0,
            perpendicular_offset_factor: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteStrategy {
    Direct,
    Tangent,
    EdgeFollowing,
    PerpendicularOffset,
    UnsafeDirect,
}

impl RouteStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStrategy::Direct => "direct",
            RouteStrategy::Tangent => "tangent",
            RouteStrategy::EdgeFollowing => "edge-following",
            RouteStrategy::PerpendicularOffset => "perpendicular-offset",
            RouteStrategy::UnsafeDirect => "unsafe-direct",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeuristicOutcome {
    /// Full polyline, start and end included.
    pub waypoints: Vec<Point>,
    pub strategy: RouteStrategy,
    pub is_safe: bool,
}

/// A merged polygon in the local frame.
struct RegionRing {
    /// Index into `Region::polygons`
    polygon: usize,
    ring: Vec<Xy>,
    /// +1 for counter-clockwise rings, -1 otherwise
    orientation: f64,
}

impl RegionRing {
    fn edge_normal(&self, i: usize) -> Xy {
        let n = self.ring.len();
        let (a, b) = (self.ring[i], self.ring[(i + 1) % n]);
        let len = length_2d(a, b);
        if len <= f64::EPSILON {
            return (0.0, 0.0);
        }
        (
            self.orientation * (b.1 - a.1) / len,
            self.orientation * -(b.0 - a.0) / len,
        )
    }

    fn vertex_normal(&self, i: usize) -> Xy {
        let n = self.ring.len();
        let prev = self.edge_normal((i + n - 1) % n);
        let next = self.edge_normal(i);
        let sum = (prev.0 + next.0, prev.1 + next.1);
        let len = length_2d((0.0, 0.0), sum);
        if len <= f64::EPSILON {
            return next;
        }
        (sum.0 / len, sum.1 / len)
    }

    fn perimeter(&self) -> f64 {
        let n = self.ring.len();
        (0..n).map(|i| length_2d(self.ring[i], self.ring[(i + 1) % n])).sum()
    }

    /// Crossings of `a -> b` with the ring as `(t, edge)` sorted along the segment.
    fn crossings(&self, a: Xy, b: Xy) -> Vec<(f64, usize)> {
        let n = self.ring.len();
        let mut hits: Vec<(f64, usize)> = (0..n)
            .filter_map(|i| {
                segment_crossing_param(a, b, self.ring[i], self.ring[(i + 1) % n]).map(|t| (t, i))
            })
            .collect();
        hits.sort_by(|x, y| x.0.total_cmp(&y.0));
        hits
    }
}

fn offset(p: Xy, dir: Xy, distance: f64) -> Xy {
    (p.0 + dir.0 * distance, p.1 + dir.1 * distance)
}

fn polyline_length(points: &[Xy]) -> f64 {
    points.windows(2).map(|pair| length_2d(pair[0], pair[1])).sum()
}

fn lerp(a: Xy, b: Xy, t: f64) -> Xy {
    (a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1))
}

pub struct HeuristicRouter<'a, K> {
    kernel: &'a K,
    field: &'a ObstacleField,
    config: HeuristicConfig,
    region: Region,
    rings: Vec<RegionRing>,
}

impl<'a, K: GeometryKernel> HeuristicRouter<'a, K> {
    pub fn new(kernel: &'a K, field: &'a ObstacleField, config: HeuristicConfig) -> Self {
        let buffers: Vec<_> = field.buffers().cloned().collect();
        let region = if buffers.is_empty() {
            Region::default()
        } else {
            kernel.union_polygons(&buffers).unwrap_or_else(|| {
                tracing::warn!("buffer union failed; routing against individual buffers");
                Region::new(buffers)
            })
        };
        Self::with_region(kernel, field, config, region)
    }

    fn with_region(
        kernel: &'a K,
        field: &'a ObstacleField,
        config: HeuristicConfig,
        region: Region,
    ) -> Self {
        let rings = region
            .polygons()
            .iter()
            .enumerate()
            .map(|(polygon, outline)| {
                let ring: Vec<Xy> = outline.ring().iter().map(|p| kernel.project(*p)).collect();
                let orientation = if ring_signed_area2(&ring) >= 0.0 { 1.0 } else { -1.0 };
                RegionRing {
                    polygon,
                    ring,
                    orientation,
                }
            })
            .filter(|r| r.ring.len() >= 3)
            .collect();

        Self {
            kernel,
            field,
            config,
            region,
            rings,
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn route(&self, start: Point, end: Point) -> HeuristicOutcome {
        let done = |route: Vec<Xy>, strategy| self.outcome(start, end, &route, strategy);
        let (s, e) = (self.kernel.project(start), self.kernel.project(end));

        if self.segment_ok(s, e) {
            return HeuristicOutcome {
                waypoints: vec![start, end],
                strategy: RouteStrategy::Direct,
                is_safe: self.field.route_is_safe(self.kernel, &[start, end]),
            };
        }
        if let Some(route) = self.tangent_route(s, e) {
            return done(route, RouteStrategy::Tangent);
        }
        if let Some(route) = self.edge_following_route(s, e) {
            return done(route, RouteStrategy::EdgeFollowing);
        }
        if let Some(route) = self.perpendicular_route(s, e) {
            return done(route, RouteStrategy::PerpendicularOffset);
        }

        tracing::warn!("no clear heuristic route; returning direct line");
        HeuristicOutcome {
            waypoints: vec![start, end],
            strategy: RouteStrategy::UnsafeDirect,
            is_safe: false,
        }
    }

    fn outcome(
        &self,
        start: Point,
        end: Point,
        route: &[Xy],
        strategy: RouteStrategy,
    ) -> HeuristicOutcome {
        let mut waypoints: Vec<Point> = route.iter().map(|xy| self.kernel.unproject(*xy)).collect();
        if let Some(first) = waypoints.first_mut() {
            *first = start;
        }
        if let Some(last) = waypoints.last_mut() {
            *last = end;
        }
        let is_safe = self.field.route_is_safe(self.kernel, &waypoints);
        HeuristicOutcome {
            waypoints,
            strategy,
            is_safe,
        }
    }

    /// Clear of the merged region and of every individual buffer and footprint.
    fn segment_ok(&self, a: Xy, b: Xy) -> bool {
        let (pa, pb) = (self.kernel.unproject(a), self.kernel.unproject(b));
        !self.kernel.segment_intersects_region(pa, pb, &self.region)
            && self.field.segment_is_clear(self.kernel, pa, pb)
    }

    fn route_ok(&self, route: &[Xy]) -> bool {
        route.windows(2).all(|pair| self.segment_ok(pair[0], pair[1]))
    }

    fn point_outside(&self, p: Xy) -> bool {
        !self.kernel.point_in_region(self.kernel.unproject(p), &self.region)
    }

    /// Arc-length spaced boundary samples pushed outward.
    fn boundary_samples(&self) -> Vec<Xy> {
        let clearance = self.config.boundary_clearance_m;
        let budget = self.config.tangent_samples.max(1);
        let total_perimeter: f64 = self.rings.iter().map(RegionRing::perimeter).sum();
        let mut samples = Vec::new();
        for ring in &self.rings {
            let perimeter = ring.perimeter();
            if perimeter <= f64::EPSILON {
                continue;
            }
            let share = (budget as f64 * perimeter / total_perimeter).floor() as usize;
            let count = share.max(1);
            let spacing = perimeter / count as f64;
            let n = ring.ring.len();
            let mut edge = 0usize;
            let mut edge_start = 0.0;
            for k in 0..count {
                let target = (k as f64 + 0.5) * spacing;
                let mut edge_len = length_2d(ring.ring[edge], ring.ring[(edge + 1) % n]);
                while edge_start + edge_len < target && edge + 1 < n {
                    edge_start += edge_len;
                    edge += 1;
                    edge_len = length_2d(ring.ring[edge], ring.ring[(edge + 1) % n]);
                }
                let t = if edge_len > f64::EPSILON {
                    ((target - edge_start) / edge_len).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let on_boundary = lerp(ring.ring[edge], ring.ring[(edge + 1) % n], t);
                let pushed = offset(on_boundary, ring.edge_normal(edge), clearance);
                if self.point_outside(pushed) {
                    samples.push(pushed);
                }
            }
        }
        samples.truncate(budget);
        samples
    }

    /// Best single bend, else best pair of bends, through boundary samples.
    fn tangent_route(&self, s: Xy, e: Xy) -> Option<Vec<Xy>> {
        let samples = self.boundary_samples();
        let from_start: Vec<bool> = samples.iter().map(|p| self.segment_ok(s, *p)).collect();
        let to_end: Vec<bool> = samples.iter().map(|p| self.segment_ok(*p, e)).collect();

        let single = samples
            .iter()
            .enumerate()
            .filter(|(i, _)| from_start[*i] && to_end[*i])
            .map(|(_, p)| (length_2d(s, *p) + length_2d(*p, e), *p))
            .min_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((_, p)) = single {
            return Some(vec![s, p, e]);
        }

        let mut best: Option<(f64, Xy, Xy)> = None;
        for (i, a) in samples.iter().enumerate() {
            if !from_start[i] {
                continue;
            }
            for (j, b) in samples.iter().enumerate() {
                if i == j || !to_end[j] {
                    continue;
                }
                let len = length_2d(s, *a) + length_2d(*a, *b) + length_2d(*b, e);
                if best.is_some_and(|(best_len, _, _)| len >= best_len) {
                    continue;
                }
                if self.segment_ok(*a, *b) {
                    best = Some((len, *a, *b));
                }
            }
        }
        best.map(|(_, a, b)| vec![s, a, b, e])
    }

    /// Walk the boundary of each crossed polygon from entry to exit.
    fn edge_following_route(&self, s: Xy, e: Xy) -> Option<Vec<Xy>> {
        let clearance = self.config.boundary_clearance_m;
        let mut route = vec![s];
        let mut current = s;

        for _ in 0..self.rings.len() {
            // Nearest polygon still crossed between the current point and the end.
            let next = self
                .rings
                .iter()
                .filter_map(|ring| {
                    let hits = ring.crossings(current, e);
                    (hits.len() >= 2).then(|| (ring, hits))
                })
                .min_by(|a, b| a.1[0].0.total_cmp(&b.1[0].0));
            let Some((ring, hits)) = next else {
                break;
            };

            let (t_in, edge_in) = hits[0];
            let (t_out, edge_out) = hits[hits.len() - 1];
            let entry = offset(lerp(current, e, t_in), ring.edge_normal(edge_in), clearance);
            let exit = offset(lerp(current, e, t_out), ring.edge_normal(edge_out), clearance);

            let detour = if self.segment_ok(entry, exit) {
                vec![entry, exit]
            } else {
                let forward = self.walk(ring, entry, exit, edge_in, edge_out, true);
                let backward = self.walk(ring, entry, exit, edge_in, edge_out, false);
                let (short, long) = if polyline_length(&forward) <= polyline_length(&backward) {
                    (forward, backward)
                } else {
                    (backward, forward)
                };
                if self.route_ok(&short) {
                    short
                } else {
                    long
                }
            };

            route.extend(detour);
            current = route[route.len() - 1];
        }

        route.push(e);
        route.dedup_by(|a, b| length_2d(*a, *b) < 1e-6);
        if route.len() <= 2 {
            return None;
        }
        let route = drop_redundant(&route, &|a, b| self.segment_ok(a, b));
        self.route_ok(&route).then_some(route)
    }

    /// Boundary vertices between the entry and exit edges, pushed outward.
    /// A vertex closer than the simplification distance to the last kept one
    /// is dropped when the chord past it stays clear.
    fn walk(
        &self,
        ring: &RegionRing,
        entry: Xy,
        exit: Xy,
        edge_in: usize,
        edge_out: usize,
        forward: bool,
    ) -> Vec<Xy> {
        let n = ring.ring.len();
        let clearance = self.config.boundary_clearance_m;
        let steps = if forward {
            (edge_out + n - edge_in) % n
        } else {
            (edge_in + n - edge_out) % n
        };
        let steps = if steps == 0 { n } else { steps };

        let vertices: Vec<Xy> = (0..steps)
            .map(|k| {
                let idx = if forward {
                    (edge_in + 1 + k) % n
                } else {
                    (edge_in + n - k) % n
                };
                offset(ring.ring[idx], ring.vertex_normal(idx), clearance)
            })
            .collect();

        let mut path = vec![entry];
        for (k, p) in vertices.iter().enumerate() {
            let last = path[path.len() - 1];
            let next = vertices.get(k + 1).copied().unwrap_or(exit);
            if length_2d(last, *p) < self.config.simplify_distance_m
                && self.segment_ok(last, next)
            {
                continue;
            }
            path.push(*p);
        }
        path.push(exit);
        path
    }

    /// Single waypoint beside the first crossed polygon, on either side of the
    /// start-end line.
    fn perpendicular_route(&self, s: Xy, e: Xy) -> Option<Vec<Xy>> {
        let len = length_2d(s, e);
        if len <= f64::EPSILON {
            return None;
        }
        let normal = (-(e.1 - s.1) / len, (e.0 - s.0) / len);
        let distance =
            self.field.safety_buffer_km() * 1000.0 * self.config.perpendicular_offset_factor;

        let (ring, _) = self
            .rings
            .iter()
            .filter_map(|ring| ring.crossings(s, e).first().map(|hit| (ring, hit.0)))
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        let polygon = self.region.polygons().get(ring.polygon)?;
        let centroid = self.kernel.project(self.kernel.centroid(polygon)?);

        [1.0, -1.0]
            .into_iter()
            .filter_map(|side: f64| {
                let dir = (normal.0 * side, normal.1 * side);
                let extent = ring
                    .ring
                    .iter()
                    .map(|p| (p.0 - centroid.0) * dir.0 + (p.1 - centroid.1) * dir.1)
                    .fold(0.0_f64, f64::max);
                let candidate = vec![s, offset(centroid, dir, extent + distance), e];
                self.route_ok(&candidate)
                    .then(|| (polyline_length(&candidate), candidate))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, route)| route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PlanarKernel, Polygon};
    use crate::obstacles::Obstacle;

    fn rect(kernel: &PlanarKernel, x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
        Polygon::new(vec![
            kernel.unproject((x0, y0)),
            kernel.unproject((x1, y0)),
            kernel.unproject((x1, y1)),
            kernel.unproject((x0, y1)),
        ])
    }

    fn kernel() -> PlanarKernel {
        PlanarKernel::new(Point::new(47.6, -122.3))
    }

    #[test]
    fn empty_field_gives_direct_line() {
        let kernel = kernel();
        let field = ObstacleField::prepare(&kernel, &[], 0.1);
        let router = HeuristicRouter::new(&kernel, &field, HeuristicConfig::default());
        let (start, end) = (kernel.unproject((-250.0, 0.0)), kernel.unproject((250.0, 0.0)));
        let outcome = router.route(start, end);
        assert_eq!(outcome.waypoints, vec![start, end]);
        assert_eq!(outcome.strategy, RouteStrategy::Direct);
        assert!(outcome.is_safe);
    }

    #[test]
    fn bends_around_a_bisecting_building() {
        let kernel = kernel();
        let building = Obstacle::new(rect(&kernel, -25.0, -60.0, 25.0, 60.0));
        let field = ObstacleField::prepare(&kernel, &[building], 0.1);
        let router = HeuristicRouter::new(&kernel, &field, HeuristicConfig::default());
        let (start, end) = (kernel.unproject((-500.0, 0.0)), kernel.unproject((500.0, 0.0)));

        let outcome = router.route(start, end);
        assert!(outcome.is_safe, "strategy {:?}", outcome.strategy);
        assert!(outcome.waypoints.len() >= 3);
        assert_ne!(outcome.strategy, RouteStrategy::UnsafeDirect);
        for pair in outcome.waypoints.windows(2) {
            assert!(field.segment_is_clear(&kernel, pair[0], pair[1]));
        }
    }

    #[test]
    fn overlapping_buffers_are_routed_as_one_region() {
        let kernel = kernel();
        let obstacles = vec![
            Obstacle::new(rect(&kernel, -60.0, -40.0, -10.0, 40.0)),
            Obstacle::new(rect(&kernel, 10.0, -40.0, 60.0, 40.0)),
        ];
        let field = ObstacleField::prepare(&kernel, &obstacles, 0.1);
        let router = HeuristicRouter::new(&kernel, &field, HeuristicConfig::default());
        assert_eq!(router.region().len(), 1);

        let (start, end) = (kernel.unproject((-600.0, 10.0)), kernel.unproject((600.0, -10.0)));
        let outcome = router.route(start, end);
        assert!(outcome.is_safe);
        assert!(outcome.waypoints.len() >= 3);
    }

    #[test]
    fn edge_following_detours_around_the_region() {
        let kernel = kernel();
        let building = Obstacle::new(rect(&kernel, -40.0, -40.0, 40.0, 40.0));
        let field = ObstacleField::prepare(&kernel, &[building], 0.1);
        let router = HeuristicRouter::new(&kernel, &field, HeuristicConfig::default());

        let route = router
            .edge_following_route((-400.0, 0.0), (400.0, 0.0))
            .expect("boundary walk finds a detour");
        assert!(route.len() >= 3);
        assert!(router.route_ok(&route));
    }

    #[test]
    fn perpendicular_offset_clears_the_region() {
        let kernel = kernel();
        let building = Obstacle::new(rect(&kernel, -40.0, -40.0, 40.0, 40.0));
        let field = ObstacleField::prepare(&kernel, &[building], 0.1);
        let router = HeuristicRouter::new(&kernel, &field, HeuristicConfig::default());

        let route = router
            .perpendicular_route((-600.0, 0.0), (600.0, 0.0))
            .expect("offset waypoint clears the buffer");
        assert_eq!(route.len(), 3);
        assert!(route[1].1.abs() > 140.0);
    }

    #[test]
    fn perpendicular_offset_uses_the_crossed_polygon_when_slivers_are_skipped() {
        let kernel = kernel();
        let building = Obstacle::new(rect(&kernel, -40.0, -40.0, 40.0, 40.0));
        let field = ObstacleField::prepare(&kernel, &[building], 0.1);
        let sliver = Polygon::new(vec![
            kernel.unproject((0.0, 3000.0)),
            kernel.unproject((10.0, 3000.0)),
        ]);
        let mut polygons = vec![sliver];
        polygons.extend(field.buffers().cloned());
        let region = Region::new(polygons);
        let config = HeuristicConfig::default();
        let router = HeuristicRouter::with_region(&kernel, &field, config, region);
        assert_eq!(router.rings.len(), 1);
        assert_eq!(router.rings[0].polygon, 1);

        let route = router
            .perpendicular_route((-600.0, 0.0), (600.0, 0.0))
            .expect("offset waypoint clears the buffer");
        assert!(route[1].0.abs() < 5.0);
        assert!(route[1].1.abs() > 140.0 && route[1].1.abs() < 400.0);
    }

    #[test]
    fn tangent_samples_are_shared_across_polygons() {
        let kernel = kernel();
        let obstacles: Vec<Obstacle> = [-600.0, -200.0, 200.0, 600.0]
            .into_iter()
            .map(|x| Obstacle::new(rect(&kernel, x - 20.0, -20.0, x + 20.0, 20.0)))
            .collect();
        let field = ObstacleField::prepare(&kernel, &obstacles, 0.1);
        let router = HeuristicRouter::new(&kernel, &field, HeuristicConfig::default());
        assert_eq!(router.region().len(), 4);

        let samples = router.boundary_samples();
        assert!(samples.len() <= HeuristicConfig::default().tangent_samples);
        assert!(!samples.is_empty());
    }

    #[test]
    fn unbufferable_footprint_is_avoided_while_planning() {
        let kernel = kernel();
        let building = Obstacle::new(rect(&kernel, -25.0, -60.0, 25.0, 60.0));
        let bow_tie = Obstacle::named(
            "broken",
            Polygon::new(vec![
                kernel.unproject((-40.0, 120.0)),
                kernel.unproject((40.0, 200.0)),
                kernel.unproject((40.0, 120.0)),
                kernel.unproject((-40.0, 200.0)),
            ]),
        );
        let field = ObstacleField::prepare(&kernel, &[building, bow_tie], 0.1);
        assert_eq!(field.len(), 1);
        let router = HeuristicRouter::new(&kernel, &field, HeuristicConfig::default());

        let outcome = router.route(kernel.unproject((-500.0, 0.0)), kernel.unproject((500.0, 0.0)));
        assert!(outcome.is_safe, "strategy {:?}", outcome.strategy);
        assert!(field.route_is_safe(&kernel, &outcome.waypoints));
    }

    #[test]
    fn end_inside_buffer_is_never_reported_safe() {
        let kernel = kernel();
        let building = Obstacle::new(rect(&kernel, -40.0, -40.0, 40.0, 40.0));
        let field = ObstacleField::prepare(&kernel, &[building], 0.1);
        let router = HeuristicRouter::new(&kernel, &field, HeuristicConfig::default());

        let outcome = router.route(kernel.unproject((-500.0, 0.0)), kernel.unproject((0.0, 100.0)));
        assert!(!outcome.is_safe);
        assert_eq!(outcome.strategy, RouteStrategy::UnsafeDirect);
    }
}
