//! No-fly obstacles and their safety buffers for one planning request.

use serde::{Deserialize, Serialize};

use crate::geometry::{GeometryKernel, Point, Polygon};
use crate::spatial::{PlanarBox, Xy};

/// A building footprint supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    #[serde(default)]
    pub name: Option<String>,
    pub footprint: Polygon,
}

impl Obstacle {
    pub fn new(footprint: Polygon) -> Self {
        Self {
            name: None,
            footprint,
        }
    }

    pub fn named(name: impl Into<String>, footprint: Polygon) -> Self {
        Self {
            name: Some(name.into()),
            footprint,
        }
    }

    fn label(&self, idx: usize) -> String {
        match &self.name {
            Some(name) => format!("obstacle {idx} ({name})"),
            None => format!("obstacle {idx}"),
        }
    }
}

/// An obstacle whose buffer was built successfully.
#[derive(Debug, Clone)]
pub struct BufferedObstacle {
    pub name: Option<String>,
    pub footprint: Polygon,
    pub buffer: Polygon,
    footprint_box: PlanarBox,
    buffer_box: PlanarBox,
}

impl BufferedObstacle {
    pub fn footprint_box(&self) -> &PlanarBox {
        &self.footprint_box
    }

    pub fn buffer_box(&self) -> &PlanarBox {
        &self.buffer_box
    }
}

/// Buffered obstacles of one request plus the footprints that could not be
/// buffered.
///
/// Unbuffered footprints get no clearance margin, but every segment and
/// route check still treats them as solid.
#[derive(Debug, Clone, Default)]
pub struct ObstacleField {
    obstacles: Vec<BufferedObstacle>,
    unbuffered: Vec<(Polygon, PlanarBox)>,
    safety_buffer_km: f64,
    warnings: Vec<String>,
}

impl ObstacleField {
    pub fn prepare<K: GeometryKernel>(
        kernel: &K,
        obstacles: &[Obstacle],
        safety_buffer_km: f64,
    ) -> Self {
        let mut field = Self {
            obstacles: Vec::with_capacity(obstacles.len()),
            unbuffered: Vec::new(),
            safety_buffer_km,
            warnings: Vec::new(),
        };

        for (idx, obstacle) in obstacles.iter().enumerate() {
            let footprint_xy: Vec<Xy> = obstacle
                .footprint
                .ring()
                .iter()
                .map(|p| kernel.project(*p))
                .collect();
            let footprint_box = PlanarBox::from_points(&footprint_xy);

            let buffered = kernel
                .buffer_polygon(&obstacle.footprint, safety_buffer_km)
                .and_then(|buffer| {
                    let buffer_xy: Vec<Xy> =
                        buffer.ring().iter().map(|p| kernel.project(*p)).collect();
                    Some((buffer, PlanarBox::from_points(&buffer_xy)?))
                });

            match (buffered, footprint_box) {
                (Some((buffer, buffer_box)), Some(footprint_box)) => {
                    field.obstacles.push(BufferedObstacle {
                        name: obstacle.name.clone(),
                        footprint: obstacle.footprint.clone(),
                        buffer,
                        footprint_box,
                        buffer_box,
                    });
                }
                (_, footprint_box) => {
                    let message = format!(
                        "{} has degenerate geometry and was excluded from planning",
                        obstacle.label(idx)
                    );
                    tracing::warn!("{message}");
                    field.warnings.push(message);
                    if let Some(bbox) = footprint_box.filter(|_| obstacle.footprint.len() >= 3) {
                        field.unbuffered.push((obstacle.footprint.clone(), bbox));
                    }
                }
            }
        }

        field
    }

    pub fn obstacles(&self) -> &[BufferedObstacle] {
        &self.obstacles
    }

    pub fn buffers(&self) -> impl Iterator<Item = &Polygon> + '_ {
        self.obstacles.iter().map(|o| &o.buffer)
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn safety_buffer_km(&self) -> f64 {
        self.safety_buffer_km
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Footprints that could not be buffered, with their planar boxes.
    pub fn unbuffered(&self) -> &[(Polygon, PlanarBox)] {
        &self.unbuffered
    }

    /// True when the segment touches no footprint and no buffer, including
    /// footprints that could not be buffered.
    pub fn segment_is_clear<K: GeometryKernel>(&self, kernel: &K, a: Point, b: Point) -> bool {
        let seg_box = PlanarBox::segment(kernel.project(a), kernel.project(b));
        let clear_of_buffers = self.obstacles.iter().all(|o| {
            if !o.buffer_box.overlaps(&seg_box) {
                return true;
            }
            !kernel.segment_intersects_polygon(a, b, &o.buffer)
                && !(o.footprint_box.overlaps(&seg_box)
                    && kernel.segment_intersects_polygon(a, b, &o.footprint))
        });
        clear_of_buffers
            && self.unbuffered.iter().all(|(footprint, bbox)| {
                !bbox.overlaps(&seg_box) || !kernel.segment_intersects_polygon(a, b, footprint)
            })
    }

    /// Final safety check for a complete route.
    pub fn route_is_safe<K: GeometryKernel>(&self, kernel: &K, route: &[Point]) -> bool {
        if let [only] = route {
            return self.point_is_clear(kernel, *only);
        }
        route
            .windows(2)
            .all(|segment| self.segment_is_clear(kernel, segment[0], segment[1]))
    }

    /// True when the point lies outside every buffer.
    pub fn point_is_clear<K: GeometryKernel>(&self, kernel: &K, p: Point) -> bool {
        let xy = kernel.project(p);
        self.obstacles
            .iter()
            .all(|o| !o.buffer_box.contains(xy) || !kernel.point_in_polygon(p, &o.buffer))
            && self
                .unbuffered
                .iter()
                .all(|(footprint, bbox)| {
                    !bbox.contains(xy) || !kernel.point_in_polygon(p, footprint)
                })
    }

    /// True when the point lies outside every buffer by at least `margin_km`.
    pub fn point_has_clearance<K: GeometryKernel>(
        &self,
        kernel: &K,
        p: Point,
        margin_km: f64,
    ) -> bool {
        let xy = kernel.project(p);
        let margin_m = margin_km * 1000.0;
        let clear_of = |polygon: &Polygon, bbox: &PlanarBox| {
            !bbox.expanded(margin_m).contains(xy)
                || kernel.distance_segment_to_polygon(p, p, polygon) >= margin_km
        };
        self.obstacles.iter().all(|o| clear_of(&o.buffer, &o.buffer_box))
            && self
                .unbuffered
                .iter()
                .all(|(footprint, bbox)| clear_of(footprint, bbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PlanarKernel;

    fn rect(kernel: &PlanarKernel, x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
        Polygon::new(vec![
            kernel.unproject((x0, y0)),
            kernel.unproject((x1, y0)),
            kernel.unproject((x1, y1)),
            kernel.unproject((x0, y1)),
        ])
    }

    #[test]
    fn degenerate_obstacle_is_reported_but_still_blocks_validation() {
        let kernel = PlanarKernel::new(Point::new(40.0, -74.0));
        let good = Obstacle::named("depot", rect(&kernel, -20.0, -20.0, 20.0, 20.0));
        let bow_tie = Obstacle::named(
            "broken",
            Polygon::new(vec![
                kernel.unproject((400.0, -50.0)),
                kernel.unproject((500.0, 50.0)),
                kernel.unproject((500.0, -50.0)),
                kernel.unproject((400.0, 50.0)),
            ]),
        );

        let field = ObstacleField::prepare(&kernel, &[good, bow_tie], 0.1);
        assert_eq!(field.len(), 1);
        assert_eq!(field.warnings().len(), 1);
        assert!(field.warnings()[0].contains("broken"));

        // Passes the buffered obstacle well to the south, then crosses the broken one.
        let route = [
            kernel.unproject((-300.0, -200.0)),
            kernel.unproject((300.0, -200.0)),
            kernel.unproject((700.0, 0.0)),
            kernel.unproject((300.0, 0.0)),
        ];
        assert!(field.segment_is_clear(&kernel, route[0], route[1]));
        assert!(!field.segment_is_clear(&kernel, route[2], route[3]));
        assert!(!field.route_is_safe(&kernel, &route));
        assert_eq!(field.unbuffered().len(), 1);
    }

    #[test]
    fn buffer_blocks_segments_that_miss_the_footprint() {
        let kernel = PlanarKernel::new(Point::new(40.0, -74.0));
        let field = ObstacleField::prepare(
            &kernel,
            &[Obstacle::new(rect(&kernel, -20.0, -20.0, 20.0, 20.0))],
            0.1,
        );
        let grazing = (kernel.unproject((-300.0, 60.0)), kernel.unproject((300.0, 60.0)));
        let wide = (kernel.unproject((-300.0, 150.0)), kernel.unproject((300.0, 150.0)));
        assert!(!field.segment_is_clear(&kernel, grazing.0, grazing.1));
        assert!(field.segment_is_clear(&kernel, wide.0, wide.1));
        assert!(!field.point_is_clear(&kernel, kernel.unproject((0.0, 90.0))));
    }
}
