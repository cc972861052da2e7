//! Geometry kernel: polygons, buffering, unions and collision primitives.
//!
//! Planners talk to geometry only through [`GeometryKernel`], so the
//! projection and the polygon-clipping backend can be replaced without
//! touching planner logic. [`PlanarKernel`] is the shipped implementation.

use std::f64::consts::PI;

use geo::{Area, BooleanOps, Centroid, LineString, MultiPolygon};
use serde::{Deserialize, Serialize};

use crate::spatial::{
    distance_point_segment_2d, distance_segment_segment_2d, haversine_distance, length_2d,
    ring_signed_area2, segments_intersect_2d, LocalFrame, PlanarBox, Xy,
};

/// Vertex count of the polygon standing in for a circle when buffering.
const CIRCLE_SEGMENTS: usize = 16;
/// Two coordinates closer than this (degrees) are the same position.
const SAME_POSITION_EPS_DEG: f64 = 1e-11;
/// Ring vertices closer than this (metres) are collapsed.
const RING_DEDUPE_EPS_M: f64 = 1e-6;
/// Rings with less area than this (square metres) are degenerate.
const MIN_RING_AREA_M2: f64 = 1e-4;

/// A geographic coordinate treated as locally planar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Build from a GeoJSON position (`[lng, lat]`).
    pub fn from_lng_lat(pair: [f64; 2]) -> Self {
        Self::new(pair[1], pair[0])
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    pub fn same_position(&self, other: &Point) -> bool {
        (self.lat - other.lat).abs() <= SAME_POSITION_EPS_DEG
            && (self.lng - other.lng).abs() <= SAME_POSITION_EPS_DEG
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &Point) -> f64 {
        haversine_distance(self.lat, self.lng, other.lat, other.lng) / 1000.0
    }
}

/// A simple polygon given by its exterior ring.
///
/// The ring is stored open: a closing vertex equal to the first one is
/// dropped on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    ring: Vec<Point>,
}

impl Polygon {
    pub fn new(mut ring: Vec<Point>) -> Self {
        while ring.len() > 1
            && ring
                .first()
                .zip(ring.last())
                .is_some_and(|(first, last)| first.same_position(last))
        {
            ring.pop();
        }
        Self { ring }
    }

    /// Build from a GeoJSON linear ring of `[lng, lat]` positions.
    pub fn from_lng_lat(coords: &[[f64; 2]]) -> Self {
        Self::new(coords.iter().copied().map(Point::from_lng_lat).collect())
    }

    pub fn ring(&self) -> &[Point] {
        &self.ring
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// Result of a union: one or more disjoint polygons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    polygons: Vec<Polygon>,
}

impl Region {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }
}

/// Collision and construction primitives every planner relies on.
///
/// Distances cross this boundary in kilometres; `project`/`unproject` expose
/// the planar frame (metres) for planners that do their own vector math.
pub trait GeometryKernel {
    fn project(&self, p: Point) -> Xy;

    fn unproject(&self, xy: Xy) -> Point;

    fn point_in_polygon(&self, p: Point, polygon: &Polygon) -> bool;

    fn segment_intersects_polygon(&self, p1: Point, p2: Point, polygon: &Polygon) -> bool;

    fn distance_point_to_segment(&self, p: Point, p1: Point, p2: Point) -> f64;

    /// Gap between a segment and a polygon's boundary; zero when they intersect.
    fn distance_segment_to_polygon(&self, p1: Point, p2: Point, polygon: &Polygon) -> f64;

    /// Expand `polygon` outward by `distance_km`.
    ///
    /// Returns `None` for degenerate or self-intersecting input; callers
    /// exclude that obstacle and keep planning.
    fn buffer_polygon(&self, polygon: &Polygon, distance_km: f64) -> Option<Polygon>;

    /// Pairwise union fold. A failed pairwise step skips that operand and
    /// keeps everything merged so far. `None` when nothing usable remains.
    fn union_polygons(&self, polygons: &[Polygon]) -> Option<Region>;

    fn centroid(&self, polygon: &Polygon) -> Option<Point>;

    fn area_km2(&self, polygon: &Polygon) -> f64;

    /// Planar distance in kilometres.
    fn distance(&self, a: Point, b: Point) -> f64 {
        length_2d(self.project(a), self.project(b)) / 1000.0
    }

    fn segment_intersects_region(&self, p1: Point, p2: Point, region: &Region) -> bool {
        region
            .polygons()
            .iter()
            .any(|polygon| self.segment_intersects_polygon(p1, p2, polygon))
    }

    fn point_in_region(&self, p: Point, region: &Region) -> bool {
        region
            .polygons()
            .iter()
            .any(|polygon| self.point_in_polygon(p, polygon))
    }
}

/// Kernel backed by one equirectangular frame and `geo` boolean operations.
#[derive(Debug, Clone, Copy)]
pub struct PlanarKernel {
    frame: LocalFrame,
}

impl PlanarKernel {
    pub fn new(origin: Point) -> Self {
        Self {
            frame: LocalFrame::new(origin.lat, origin.lng),
        }
    }

    /// Frame anchored halfway between the two endpoints of a request.
    pub fn centered_on(a: Point, b: Point) -> Self {
        Self::new(Point::new((a.lat + b.lat) / 2.0, (a.lng + b.lng) / 2.0))
    }

    pub fn frame(&self) -> &LocalFrame {
        &self.frame
    }

    pub fn ring_xy(&self, polygon: &Polygon) -> Vec<Xy> {
        polygon.ring().iter().map(|p| self.project(*p)).collect()
    }

    fn polygon_from_geo(&self, polygon: &geo::Polygon<f64>) -> Polygon {
        Polygon::new(
            polygon
                .exterior()
                .coords()
                .map(|c| self.unproject((c.x, c.y)))
                .collect(),
        )
    }
}

impl GeometryKernel for PlanarKernel {
    fn project(&self, p: Point) -> Xy {
        self.frame.project(p.lat, p.lng)
    }

    fn unproject(&self, xy: Xy) -> Point {
        let (lat, lng) = self.frame.unproject(xy);
        Point::new(lat, lng)
    }

    fn point_in_polygon(&self, p: Point, polygon: &Polygon) -> bool {
        ring_contains(&self.ring_xy(polygon), self.project(p))
    }

    fn segment_intersects_polygon(&self, p1: Point, p2: Point, polygon: &Polygon) -> bool {
        segment_intersects_ring(&self.ring_xy(polygon), self.project(p1), self.project(p2))
    }

    fn distance_point_to_segment(&self, p: Point, p1: Point, p2: Point) -> f64 {
        distance_point_segment_2d(self.project(p), self.project(p1), self.project(p2)) / 1000.0
    }

    fn distance_segment_to_polygon(&self, p1: Point, p2: Point, polygon: &Polygon) -> f64 {
        let ring = self.ring_xy(polygon);
        let (a, b) = (self.project(p1), self.project(p2));
        if ring.is_empty() {
            return f64::INFINITY;
        }
        if segment_intersects_ring(&ring, a, b) {
            return 0.0;
        }
        let n = ring.len();
        let mut best = f64::INFINITY;
        for i in 0..n {
            let d = distance_segment_segment_2d(a, b, ring[i], ring[(i + 1) % n]);
            best = best.min(d);
        }
        best / 1000.0
    }

    fn buffer_polygon(&self, polygon: &Polygon, distance_km: f64) -> Option<Polygon> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            tracing::warn!("rejecting buffer distance {distance_km} km");
            return None;
        }
        let ring = match validate_ring(&self.ring_xy(polygon)) {
            Ok(ring) => ring,
            Err(reason) => {
                tracing::warn!("cannot buffer obstacle polygon: {reason}");
                return None;
            }
        };

        let distance_m = distance_km * 1000.0;
        if distance_m <= RING_DEDUPE_EPS_M {
            return Some(Polygon::new(ring.iter().map(|xy| self.unproject(*xy)).collect()));
        }

        let (merged, skipped) = fold_union(buffer_pieces(&ring, distance_m));
        if !skipped.is_empty() {
            tracing::warn!(
                "buffer construction skipped {} piece(s) after failed unions",
                skipped.len()
            );
        }
        match merged.0.as_slice() {
            [single] => Some(self.polygon_from_geo(single)),
            other => {
                tracing::warn!(
                    "buffer construction produced {} polygons, expected one",
                    other.len()
                );
                None
            }
        }
    }

    fn union_polygons(&self, polygons: &[Polygon]) -> Option<Region> {
        let mut operands = Vec::with_capacity(polygons.len());
        for (idx, polygon) in polygons.iter().enumerate() {
            match validate_ring(&self.ring_xy(polygon)) {
                Ok(ring) => operands.push(to_geo(&ring)),
                Err(reason) => tracing::warn!("union skipping polygon {idx}: {reason}"),
            }
        }

        let (merged, skipped) = fold_union(operands);
        if !skipped.is_empty() {
            tracing::warn!("union skipped {} operand(s) after failed merges", skipped.len());
        }
        if merged.0.is_empty() {
            return None;
        }
        Some(Region::new(
            merged.0.iter().map(|p| self.polygon_from_geo(p)).collect(),
        ))
    }

    fn centroid(&self, polygon: &Polygon) -> Option<Point> {
        let ring = self.ring_xy(polygon);
        if ring.is_empty() {
            return None;
        }
        let c = to_geo(&ring).centroid()?;
        Some(self.unproject((c.x(), c.y())))
    }

    fn area_km2(&self, polygon: &Polygon) -> f64 {
        to_geo(&self.ring_xy(polygon)).unsigned_area() / 1_000_000.0
    }
}

/// Even-odd ray cast against a ring in the local frame.
pub(crate) fn ring_contains(ring: &[Xy], p: Xy) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if ((yi > p.1) != (yj > p.1)) && (p.0 < (xj - xi) * (p.1 - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

pub(crate) fn segment_intersects_ring(ring: &[Xy], a: Xy, b: Xy) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let Some(bbox) = PlanarBox::from_points(ring) else {
        return false;
    };
    if !bbox.overlaps(&PlanarBox::segment(a, b).expanded(1e-6)) {
        return false;
    }
    if ring_contains(ring, a) || ring_contains(ring, b) {
        return true;
    }
    (0..n).any(|i| segments_intersect_2d(a, b, ring[i], ring[(i + 1) % n]))
}

/// Reject rings that cannot be buffered or merged reliably.
fn validate_ring(raw: &[Xy]) -> Result<Vec<Xy>, &'static str> {
    if raw.iter().any(|p| !p.0.is_finite() || !p.1.is_finite()) {
        return Err("non-finite coordinate");
    }

    let mut ring: Vec<Xy> = Vec::with_capacity(raw.len());
    for p in raw {
        if ring.last().is_some_and(|last| length_2d(*last, *p) <= RING_DEDUPE_EPS_M) {
            continue;
        }
        ring.push(*p);
    }
    while ring.len() > 1
        && ring
            .first()
            .zip(ring.last())
            .is_some_and(|(first, last)| length_2d(*first, *last) <= RING_DEDUPE_EPS_M)
    {
        ring.pop();
    }

    if ring.len() < 3 {
        return Err("fewer than 3 distinct vertices");
    }
    if ring_signed_area2(&ring).abs() / 2.0 < MIN_RING_AREA_M2 {
        return Err("zero-area ring");
    }

    let n = ring.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            if segments_intersect_2d(ring[i], ring[(i + 1) % n], ring[j], ring[(j + 1) % n]) {
                return Err("self-intersecting ring");
            }
        }
    }

    Ok(ring)
}

fn to_geo(ring: &[Xy]) -> geo::Polygon<f64> {
    geo::Polygon::new(LineString::from(ring.to_vec()), Vec::new())
}

/// Minkowski sum of the ring with a disc: the ring itself, one rectangle per
/// edge and one circumscribed polygon per vertex, so the result never falls
/// inside the true buffer.
fn buffer_pieces(ring: &[Xy], distance_m: f64) -> Vec<geo::Polygon<f64>> {
    let n = ring.len();
    let radius = distance_m / (PI / CIRCLE_SEGMENTS as f64).cos();
    let mut pieces = Vec::with_capacity(2 * n + 1);
    pieces.push(to_geo(ring));

    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let len = length_2d(a, b);
        if len > RING_DEDUPE_EPS_M {
            let nx = -(b.1 - a.1) / len * distance_m;
            let ny = (b.0 - a.0) / len * distance_m;
            pieces.push(to_geo(&[
                (a.0 + nx, a.1 + ny),
                (b.0 + nx, b.1 + ny),
                (b.0 - nx, b.1 - ny),
                (a.0 - nx, a.1 - ny),
            ]));
        }

        let disc: Vec<Xy> = (0..CIRCLE_SEGMENTS)
            .map(|k| {
                let theta = 2.0 * PI * k as f64 / CIRCLE_SEGMENTS as f64;
                (a.0 + radius * theta.cos(), a.1 + radius * theta.sin())
            })
            .collect();
        pieces.push(to_geo(&disc));
    }

    pieces
}

/// Fold pieces into one multipolygon. Returns the merge and the indices of
/// operands that were skipped because merging them lost area.
fn fold_union<I>(pieces: I) -> (MultiPolygon<f64>, Vec<usize>)
where
    I: IntoIterator<Item = geo::Polygon<f64>>,
{
    let mut merged = MultiPolygon::new(Vec::new());
    let mut skipped = Vec::new();

    for (idx, piece) in pieces.into_iter().enumerate() {
        let operand = MultiPolygon::new(vec![piece]);
        if merged.0.is_empty() {
            merged = operand;
            continue;
        }
        let before = merged.unsigned_area();
        let next = merged.union(&operand);
        let tolerance = 1e-3 + before * 1e-9;
        if next.0.is_empty() || next.unsigned_area() + tolerance < before {
            skipped.push(idx);
            continue;
        }
        merged = next;
    }

    (merged, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: Point = Point::new(33.0, -117.0);

    fn square(kernel: &PlanarKernel, cx: f64, cy: f64, half: f64) -> Polygon {
        Polygon::new(vec![
            kernel.unproject((cx - half, cy - half)),
            kernel.unproject((cx + half, cy - half)),
            kernel.unproject((cx + half, cy + half)),
            kernel.unproject((cx - half, cy + half)),
        ])
    }

    #[test]
    fn polygon_drops_closing_vertex() {
        let polygon = Polygon::from_lng_lat(&[
            [-117.0, 33.0],
            [-116.99, 33.0],
            [-116.99, 33.01],
            [-117.0, 33.0],
        ]);
        assert_eq!(polygon.len(), 3);
        assert_eq!(polygon.ring()[0], Point::new(33.0, -117.0));
    }

    #[test]
    fn point_in_polygon_uses_interior() {
        let kernel = PlanarKernel::new(ORIGIN);
        let sq = square(&kernel, 0.0, 0.0, 50.0);
        assert!(kernel.point_in_polygon(kernel.unproject((10.0, -20.0)), &sq));
        assert!(!kernel.point_in_polygon(kernel.unproject((60.0, 0.0)), &sq));
    }

    #[test]
    fn segment_intersection_covers_crossing_and_containment() {
        let kernel = PlanarKernel::new(ORIGIN);
        let sq = square(&kernel, 0.0, 0.0, 50.0);
        let crossing = (kernel.unproject((-100.0, 0.0)), kernel.unproject((100.0, 0.0)));
        let inside = (kernel.unproject((-10.0, 0.0)), kernel.unproject((10.0, 0.0)));
        let clear = (kernel.unproject((-100.0, 80.0)), kernel.unproject((100.0, 80.0)));
        assert!(kernel.segment_intersects_polygon(crossing.0, crossing.1, &sq));
        assert!(kernel.segment_intersects_polygon(inside.0, inside.1, &sq));
        assert!(!kernel.segment_intersects_polygon(clear.0, clear.1, &sq));
        let gap = kernel.distance_segment_to_polygon(clear.0, clear.1, &sq);
        assert!((gap - 0.030).abs() < 1e-6, "gap={gap}");
    }

    #[test]
    fn buffer_covers_distance_and_stays_tight() {
        let kernel = PlanarKernel::new(ORIGIN);
        let sq = square(&kernel, 0.0, 0.0, 20.0);
        let buffered = kernel.buffer_polygon(&sq, 0.1).expect("square buffers");

        // Within 100 m of the edge or the corner: covered.
        assert!(kernel.point_in_polygon(kernel.unproject((119.0, 0.0)), &buffered));
        assert!(kernel.point_in_polygon(kernel.unproject((20.0 + 70.0, 20.0 + 70.0)), &buffered));
        // Beyond the buffer (plus the circumscription slack): not covered.
        assert!(!kernel.point_in_polygon(kernel.unproject((125.0, 0.0)), &buffered));
        assert!(!kernel.point_in_polygon(kernel.unproject((20.0 + 75.0, 20.0 + 75.0)), &buffered));
    }

    #[test]
    fn buffering_is_idempotent() {
        let kernel = PlanarKernel::new(ORIGIN);
        let sq = square(&kernel, 200.0, -50.0, 35.0);
        let first = kernel.buffer_polygon(&sq, 0.1).expect("first buffer");
        let second = kernel.buffer_polygon(&sq, 0.1).expect("second buffer");
        assert!((kernel.area_km2(&first) - kernel.area_km2(&second)).abs() < 1e-9);
        for p in first.ring() {
            let (x, y) = kernel.project(*p);
            let inward = kernel.unproject((x * 0.999 + 200.0 * 0.001, y * 0.999 - 50.0 * 0.001));
            assert!(kernel.point_in_polygon(inward, &second));
        }
    }

    #[test]
    fn self_intersecting_polygon_is_not_buffered() {
        let kernel = PlanarKernel::new(ORIGIN);
        let bow_tie = Polygon::new(vec![
            kernel.unproject((0.0, 0.0)),
            kernel.unproject((50.0, 50.0)),
            kernel.unproject((50.0, 0.0)),
            kernel.unproject((0.0, 50.0)),
        ]);
        assert!(kernel.buffer_polygon(&bow_tie, 0.1).is_none());

        let sliver = Polygon::new(vec![
            kernel.unproject((0.0, 0.0)),
            kernel.unproject((10.0, 0.0)),
        ]);
        assert!(kernel.buffer_polygon(&sliver, 0.1).is_none());
    }

    #[test]
    fn union_merges_overlaps_and_keeps_disjoint_parts() {
        let kernel = PlanarKernel::new(ORIGIN);
        let a = square(&kernel, 0.0, 0.0, 50.0);
        let b = square(&kernel, 60.0, 0.0, 50.0);
        let far = square(&kernel, 1000.0, 0.0, 10.0);

        let merged = kernel.union_polygons(&[a.clone(), b.clone()]).expect("merged");
        assert_eq!(merged.len(), 1);
        let area = kernel.area_km2(&merged.polygons()[0]);
        assert!((area - 0.016).abs() < 1e-6, "area={area}");

        let split = kernel.union_polygons(&[a, b, far]).expect("merged");
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn union_skips_degenerate_operand_without_losing_merged_data() {
        let kernel = PlanarKernel::new(ORIGIN);
        let a = square(&kernel, 0.0, 0.0, 50.0);
        let broken = Polygon::new(vec![kernel.unproject((0.0, 0.0)), kernel.unproject((1.0, 1.0))]);
        let b = square(&kernel, 500.0, 0.0, 50.0);

        let region = kernel.union_polygons(&[a, broken, b]).expect("region");
        assert_eq!(region.len(), 2);
        assert!(kernel.union_polygons(&[]).is_none());
    }

    #[test]
    fn centroid_of_square_is_its_center() {
        let kernel = PlanarKernel::new(ORIGIN);
        let sq = square(&kernel, 120.0, -40.0, 25.0);
        let c = kernel.project(kernel.centroid(&sq).expect("centroid"));
        assert!((c.0 - 120.0).abs() < 1e-6 && (c.1 + 40.0).abs() < 1e-6);
    }

    #[test]
    fn l_shape_area_and_centroid() {
        let kernel = PlanarKernel::new(ORIGIN);
        let l_shape = Polygon::new(
            [(0.0, 0.0), (200.0, 0.0), (200.0, 100.0), (100.0, 100.0), (100.0, 200.0), (0.0, 200.0)]
                .into_iter()
                .map(|xy| kernel.unproject(xy))
                .collect(),
        );
        assert!((kernel.area_km2(&l_shape) - 0.03).abs() < 1e-6);
        let c = kernel.project(kernel.centroid(&l_shape).expect("centroid"));
        let expected = 250.0 / 3.0;
        assert!((c.0 - expected).abs() < 1e-3 && (c.1 - expected).abs() < 1e-3);
    }
}
