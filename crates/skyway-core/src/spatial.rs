//! Spatial math for distance calculations and the local planar frame.
//!
//! All planar geometry for one planning request happens in a single
//! equirectangular frame measured in metres, so buffer distances, grid cells
//! and velocities share one unit.

/// A position in the local frame: `(east_m, north_m)`.
pub type Xy = (f64, f64);

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate distance between two points in meters using Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
///
/// # Returns
/// Distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Equirectangular projection anchored at one origin.
///
/// Scale factors are fixed at the origin latitude, which keeps every
/// conversion of a request consistent with every other one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin_lat: f64,
    origin_lon: f64,
    meters_lat: f64,
    meters_lon: f64,
}

impl LocalFrame {
    pub fn new(origin_lat: f64, origin_lon: f64) -> Self {
        Self {
            origin_lat,
            origin_lon,
            meters_lat: meters_per_deg_lat(origin_lat).max(1e-9),
            meters_lon: meters_per_deg_lon(origin_lat).max(1e-9),
        }
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_lat, self.origin_lon)
    }

    /// Convert degrees to `(east_m, north_m)` relative to the origin.
    pub fn project(&self, lat: f64, lon: f64) -> Xy {
        (
            (lon - self.origin_lon) * self.meters_lon,
            (lat - self.origin_lat) * self.meters_lat,
        )
    }

    /// Convert a local offset back to `(lat, lon)` degrees.
    pub fn unproject(&self, xy: Xy) -> (f64, f64) {
        (
            self.origin_lat + xy.1 / self.meters_lat,
            self.origin_lon + xy.0 / self.meters_lon,
        )
    }
}

/// Axis-aligned box in the local frame, used to skip exact tests early.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl PlanarBox {
    pub fn from_points(points: &[Xy]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            min_x: first.0,
            min_y: first.1,
            max_x: first.0,
            max_y: first.1,
        };
        for p in &points[1..] {
            bbox.min_x = bbox.min_x.min(p.0);
            bbox.min_y = bbox.min_y.min(p.1);
            bbox.max_x = bbox.max_x.max(p.0);
            bbox.max_y = bbox.max_y.max(p.1);
        }
        Some(bbox)
    }

    pub fn segment(a: Xy, b: Xy) -> Self {
        Self {
            min_x: a.0.min(b.0),
            min_y: a.1.min(b.1),
            max_x: a.0.max(b.0),
            max_y: a.1.max(b.1),
        }
    }

    pub fn expanded(&self, margin_m: f64) -> Self {
        Self {
            min_x: self.min_x - margin_m,
            min_y: self.min_y - margin_m,
            max_x: self.max_x + margin_m,
            max_y: self.max_y + margin_m,
        }
    }

    pub fn contains(&self, p: Xy) -> bool {
        p.0 >= self.min_x && p.0 <= self.max_x && p.1 >= self.min_y && p.1 <= self.max_y
    }

    pub fn overlaps(&self, other: &PlanarBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

pub fn length_2d(a: Xy, b: Xy) -> f64 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

/// Heading of `a -> b` in radians, counter-clockwise from east.
pub fn heading_2d(a: Xy, b: Xy) -> f64 {
    (b.1 - a.1).atan2(b.0 - a.0)
}

/// Absolute turn between the incoming `a -> b` and outgoing `b -> c` headings,
/// in radians within `[0, PI]`.
pub fn turn_angle(a: Xy, b: Xy, c: Xy) -> f64 {
    use std::f64::consts::PI;

    if length_2d(a, b) <= f64::EPSILON || length_2d(b, c) <= f64::EPSILON {
        return 0.0;
    }
    let diff = heading_2d(b, c) - heading_2d(a, b);
    let wrapped = (diff + PI).rem_euclid(2.0 * PI) - PI;
    wrapped.abs()
}

pub(crate) fn segments_intersect_2d(a1: Xy, a2: Xy, b1: Xy, b2: Xy) -> bool {
    // Epsilon in meters. This function is used on locally-projected coordinates; the chosen tolerance
    // is meant to absorb floating-point error from projection and arithmetic.
    const EPS_M: f64 = 1e-6;

    fn orient(p: Xy, q: Xy, r: Xy) -> f64 {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    }

    fn within(a: f64, b: f64, value: f64) -> bool {
        let min = a.min(b) - EPS_M;
        let max = a.max(b) + EPS_M;
        value >= min && value <= max
    }

    fn on_segment(p: Xy, q: Xy, r: Xy) -> bool {
        within(p.0, q.0, r.0) && within(p.1, q.1, r.1)
    }

    let o1 = orient(a1, a2, b1);
    let o2 = orient(a1, a2, b2);
    let o3 = orient(b1, b2, a1);
    let o4 = orient(b1, b2, a2);

    if o1.abs() <= EPS_M && on_segment(a1, a2, b1) {
        return true;
    }
    if o2.abs() <= EPS_M && on_segment(a1, a2, b2) {
        return true;
    }
    if o3.abs() <= EPS_M && on_segment(b1, b2, a1) {
        return true;
    }
    if o4.abs() <= EPS_M && on_segment(b1, b2, a2) {
        return true;
    }

    let a_crosses = (o1 > EPS_M && o2 < -EPS_M) || (o1 < -EPS_M && o2 > EPS_M);
    let b_crosses = (o3 > EPS_M && o4 < -EPS_M) || (o3 < -EPS_M && o4 > EPS_M);
    a_crosses && b_crosses
}

/// Parameter along `a1 -> a2` where it crosses `b1 -> b2`, if the two proper
/// segments cross at a single point.
pub(crate) fn segment_crossing_param(a1: Xy, a2: Xy, b1: Xy, b2: Xy) -> Option<f64> {
    let r = (a2.0 - a1.0, a2.1 - a1.1);
    let s = (b2.0 - b1.0, b2.1 - b1.1);
    let denom = r.0 * s.1 - r.1 * s.0;
    if denom.abs() < 1e-12 {
        return None;
    }
    let qp = (b1.0 - a1.0, b1.1 - a1.1);
    let t = (qp.0 * s.1 - qp.1 * s.0) / denom;
    let u = (qp.0 * r.1 - qp.1 * r.0) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(t)
    } else {
        None
    }
}

/// Minimum distance from a point to a line segment (in meters).
pub fn distance_point_segment_2d(p: Xy, seg_start: Xy, seg_end: Xy) -> f64 {
    let px = p.0 - seg_start.0;
    let py = p.1 - seg_start.1;
    let sx = seg_end.0 - seg_start.0;
    let sy = seg_end.1 - seg_start.1;

    // Segment length squared
    let seg_len_sq = sx * sx + sy * sy;

    if seg_len_sq < 0.0001 {
        // Segment is essentially a point
        return (px * px + py * py).sqrt();
    }

    // Project point onto segment line: t = ((P-A) · (B-A)) / |B-A|²
    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);

    let dx = px - t * sx;
    let dy = py - t * sy;

    (dx * dx + dy * dy).sqrt()
}

/// Minimum distance between two line segments in meters.
pub fn distance_segment_segment_2d(a1: Xy, a2: Xy, b1: Xy, b2: Xy) -> f64 {
    // Detect true crossings (including touches/overlaps); endpoint-only distance checks can miss X-crossings.
    if segments_intersect_2d(a1, a2, b1, b2) {
        return 0.0;
    }

    let d1 = distance_point_segment_2d(a1, b1, b2);
    let d2 = distance_point_segment_2d(a2, b1, b2);
    let d3 = distance_point_segment_2d(b1, a1, a2);
    let d4 = distance_point_segment_2d(b2, a1, a2);

    d1.min(d2).min(d3).min(d4)
}

/// Twice the signed area of a ring; positive for counter-clockwise winding.
pub(crate) fn ring_signed_area2(ring: &[Xy]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        sum += a.0 * b.1 - b.0 * a.1;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn test_haversine_same_point() {
        let dist = haversine_distance(33.6846, -117.8265, 33.6846, -117.8265);
        assert!(dist < 0.001);
    }

    #[test]
    fn frame_projection_round_trips_near_origin() {
        let frame = LocalFrame::new(33.0, -117.0);
        let xy = frame.project(33.004, -116.997);
        let (lat, lon) = frame.unproject(xy);
        assert!((lat - 33.004).abs() < 1e-12);
        assert!((lon + 116.997).abs() < 1e-12);
    }

    #[test]
    fn frame_distance_agrees_with_haversine_locally() {
        let frame = LocalFrame::new(33.0, -117.0);
        let a = frame.project(33.0, -117.0);
        let b = frame.project(33.003, -116.996);
        let planar = length_2d(a, b);
        let sphere = haversine_distance(33.0, -117.0, 33.003, -116.996);
        assert!((planar - sphere).abs() / sphere < 0.005, "planar={planar} sphere={sphere}");
    }

    #[test]
    fn segment_distance_detects_crossing_segments() {
        // Two segments that cross like an "X" should have minimum distance 0.
        let dist =
            distance_segment_segment_2d((0.0, 0.0), (100.0, 100.0), (0.0, 100.0), (100.0, 0.0));
        assert!(dist < 0.001, "expected crossing segments distance 0, got {dist}");
    }

    #[test]
    fn point_segment_distance_clamps_to_endpoints() {
        let above = distance_point_segment_2d((0.0, 10.0), (-5.0, 0.0), (5.0, 0.0));
        assert!((above - 10.0).abs() < 1e-9);
        let beyond = distance_point_segment_2d((8.0, 4.0), (-5.0, 0.0), (5.0, 0.0));
        assert!((beyond - 5.0).abs() < 1e-9);
    }

    #[test]
    fn turn_angle_is_zero_on_straight_line_and_pi_on_reversal() {
        assert!(turn_angle((0.0, 0.0), (1.0, 0.0), (2.0, 0.0)).abs() < 1e-12);
        let right = turn_angle((0.0, 0.0), (1.0, 0.0), (1.0, -1.0));
        assert!((right - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        let back = turn_angle((0.0, 0.0), (1.0, 0.0), (0.0, 0.0));
        assert!((back - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn crossing_param_finds_midpoint() {
        let t = segment_crossing_param((0.0, 0.0), (10.0, 0.0), (5.0, -5.0), (5.0, 5.0));
        assert!(matches!(t, Some(v) if (v - 0.5).abs() < 1e-12));
        assert!(segment_crossing_param((0.0, 0.0), (10.0, 0.0), (0.0, 1.0), (10.0, 1.0)).is_none());
    }
}
