//! Multi-term cost of a candidate route. Lower is better.

use crate::geometry::{GeometryKernel, Point};
use crate::obstacles::ObstacleField;
use crate::spatial::{turn_angle, PlanarBox, Xy};

use super::PsoConfig;

/// Multiplier applied to the whole cost when any segment crosses a footprint.
pub const RAW_COLLISION_MULTIPLIER: f64 = 1_000.0;
/// Penalty for a segment touching the buffer boundary; falls off
/// quadratically to zero at one safety distance.
pub const PROXIMITY_PENALTY: f64 = 5_000.0;

/// Individual terms of one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitnessBreakdown {
    pub distance: f64,
    pub collision: f64,
    pub proximity: f64,
    pub smoothness: f64,
    pub raw_collision: bool,
    pub total: f64,
}

pub struct FitnessEvaluator<'a, K> {
    kernel: &'a K,
    field: &'a ObstacleField,
    collision_weight: f64,
    distance_weight: f64,
    smoothness_weight: f64,
}

impl<'a, K: GeometryKernel> FitnessEvaluator<'a, K> {
    pub fn new(kernel: &'a K, field: &'a ObstacleField, config: &PsoConfig) -> Self {
        Self {
            kernel,
            field,
            collision_weight: config.collision_weight,
            distance_weight: config.distance_weight,
            smoothness_weight: config.smoothness_weight,
        }
    }

    pub fn evaluate(&self, route: &[Xy]) -> f64 {
        self.breakdown(route).total
    }

    /// Cost of the polyline `route` (start and end included).
    pub fn breakdown(&self, route: &[Xy]) -> FitnessBreakdown {
        let safety_km = self.field.safety_buffer_km();
        let safety_m = safety_km * 1000.0;
        let points: Vec<Point> = route.iter().map(|xy| self.kernel.unproject(*xy)).collect();
        let mut terms = FitnessBreakdown::default();

        for (i, pair) in route.windows(2).enumerate() {
            let (a, b) = (points[i], points[i + 1]);
            terms.distance += self.kernel.distance(a, b);

            let seg_box = PlanarBox::segment(pair[0], pair[1]);
            for obstacle in self.field.obstacles() {
                if !obstacle.buffer_box().expanded(safety_m).overlaps(&seg_box) {
                    continue;
                }
                if obstacle.footprint_box().overlaps(&seg_box)
                    && self
                        .kernel
                        .segment_intersects_polygon(a, b, &obstacle.footprint)
                {
                    terms.collision += self.collision_weight;
                    terms.raw_collision = true;
                }

                let gap = self
                    .kernel
                    .distance_segment_to_polygon(a, b, &obstacle.buffer);
                if gap <= 0.0 {
                    terms.proximity += self.collision_weight;
                } else if safety_km > 0.0 && gap < safety_km {
                    let closeness = 1.0 - gap / safety_km;
                    terms.proximity += PROXIMITY_PENALTY * closeness * closeness;
                }
            }

            // Footprints without a buffer only count when crossed.
            for (footprint, bbox) in self.field.unbuffered() {
                if bbox.overlaps(&seg_box)
                    && self.kernel.segment_intersects_polygon(a, b, footprint)
                {
                    terms.collision += self.collision_weight;
                    terms.raw_collision = true;
                }
            }
        }

        for triple in route.windows(3) {
            let angle = turn_angle(triple[0], triple[1], triple[2]);
            terms.smoothness += angle * angle;
        }

        terms.distance *= self.distance_weight;
        terms.smoothness *= self.smoothness_weight;
        terms.total = terms.distance + terms.collision + terms.proximity + terms.smoothness;
        if terms.raw_collision {
            terms.total *= RAW_COLLISION_MULTIPLIER;
        }
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PlanarKernel, Polygon};
    use crate::obstacles::Obstacle;

    fn setup() -> (PlanarKernel, ObstacleField) {
        let kernel = PlanarKernel::new(Point::new(33.0, -117.0));
        let building = Polygon::new(vec![
            kernel.unproject((-20.0, -20.0)),
            kernel.unproject((20.0, -20.0)),
            kernel.unproject((20.0, 20.0)),
            kernel.unproject((-20.0, 20.0)),
        ]);
        let field = ObstacleField::prepare(&kernel, &[Obstacle::new(building)], 0.1);
        (kernel, field)
    }

    #[test]
    fn straight_clear_route_costs_only_distance() {
        let (kernel, field) = setup();
        let eval = FitnessEvaluator::new(&kernel, &field, &PsoConfig::default());
        let terms = eval.breakdown(&[(-500.0, 1_000.0), (0.0, 1_000.0), (500.0, 1_000.0)]);
        assert_eq!(terms.collision, 0.0);
        assert_eq!(terms.proximity, 0.0);
        assert!(terms.smoothness.abs() < 1e-12);
        assert!((terms.total - 5.0).abs() < 1e-9, "total={}", terms.total);
    }

    #[test]
    fn crossing_the_footprint_dominates_everything() {
        let (kernel, field) = setup();
        let eval = FitnessEvaluator::new(&kernel, &field, &PsoConfig::default());
        let through = eval.breakdown(&[(-500.0, 0.0), (500.0, 0.0)]);
        assert!(through.raw_collision);
        let around = eval.breakdown(&[(-500.0, 0.0), (0.0, 400.0), (500.0, 0.0)]);
        assert!(!around.raw_collision);
        assert!(through.total > around.total * 100.0);
    }

    #[test]
    fn proximity_grows_as_gap_shrinks() {
        let (kernel, field) = setup();
        let eval = FitnessEvaluator::new(&kernel, &field, &PsoConfig::default());
        let far = eval.breakdown(&[(-500.0, 200.0), (500.0, 200.0)]);
        let near = eval.breakdown(&[(-500.0, 150.0), (500.0, 150.0)]);
        let grazing = eval.breakdown(&[(-500.0, 100.0), (500.0, 100.0)]);
        assert!(far.proximity < near.proximity);
        assert!(near.proximity < grazing.proximity);
        assert!(!grazing.raw_collision);
        assert_eq!(grazing.proximity, PsoConfig::default().collision_weight);
    }

    #[test]
    fn unbufferable_footprint_still_counts_as_collision() {
        let kernel = PlanarKernel::new(Point::new(33.0, -117.0));
        let bow_tie = Polygon::new(vec![
            kernel.unproject((-50.0, -50.0)),
            kernel.unproject((50.0, 50.0)),
            kernel.unproject((50.0, -50.0)),
            kernel.unproject((-50.0, 50.0)),
        ]);
        let field = ObstacleField::prepare(&kernel, &[Obstacle::new(bow_tie)], 0.1);
        assert!(field.is_empty());

        let eval = FitnessEvaluator::new(&kernel, &field, &PsoConfig::default());
        let through = eval.breakdown(&[(-500.0, 0.0), (500.0, 0.0)]);
        assert!(through.raw_collision);
        assert_eq!(through.collision, PsoConfig::default().collision_weight);
        let clear = eval.breakdown(&[(-500.0, 300.0), (500.0, 300.0)]);
        assert!(!clear.raw_collision);
    }
}
