//! Request and result models exchanged with callers.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::grid::GridConfig;
use crate::heuristic::HeuristicConfig;
use crate::obstacles::Obstacle;
use crate::pso::{PsoConfig, StopReason};
use crate::rules::SafetyRules;

/// An endpoint of a delivery, optionally carrying the address it was
/// geocoded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: Option<String>,
}

impl RoutePoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lng)
    }
}

impl From<Point> for RoutePoint {
    fn from(p: Point) -> Self {
        Self::new(p.lat, p.lng)
    }
}

/// Which planner handles a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanningMode {
    /// Geometric heuristic router
    #[default]
    Fast,
    /// Particle swarm optimizer with the grid pathfinder as safety net
    Optimized,
    /// Straight line, validated but never rerouted
    Direct,
    /// Grid A* pathfinder
    Grid,
}

impl PlanningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanningMode::Fast => "fast",
            PlanningMode::Optimized => "optimized",
            PlanningMode::Direct => "direct",
            PlanningMode::Grid => "grid",
        }
    }
}

impl std::str::FromStr for PlanningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "heuristic" => Ok(PlanningMode::Fast),
            "optimized" | "pso" => Ok(PlanningMode::Optimized),
            "direct" => Ok(PlanningMode::Direct),
            "grid" | "astar" => Ok(PlanningMode::Grid),
            other => Err(format!("unknown planning mode '{other}'")),
        }
    }
}

/// Everything a planning call needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub start: RoutePoint,
    pub end: RoutePoint,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
    #[serde(default)]
    pub mode: PlanningMode,
    /// Swarm override; missing fields fall back to defaults.
    #[serde(default)]
    pub pso: Option<PsoConfig>,
    #[serde(default)]
    pub rules: SafetyRules,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub heuristic: HeuristicConfig,
}

impl PlanRequest {
    pub fn new(start: RoutePoint, end: RoutePoint, obstacles: Vec<Obstacle>) -> Self {
        Self {
            start,
            end,
            obstacles,
            mode: PlanningMode::default(),
            pso: None,
            rules: SafetyRules::default(),
            grid: GridConfig::default(),
            heuristic: HeuristicConfig::default(),
        }
    }

    pub fn with_mode(mut self, mode: PlanningMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_pso(mut self, pso: PsoConfig) -> Self {
        self.pso = Some(pso);
        self
    }
}

/// An ordered polyline pinned to its start and end.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    points: Vec<Point>,
}

impl Route {
    /// Pin `start`/`end` around `interior` and drop consecutive duplicates.
    pub fn normalize(start: Point, end: Point, interior: &[Point]) -> Self {
        let mut points = Vec::with_capacity(interior.len() + 2);
        points.push(start);
        for p in interior.iter().chain(std::iter::once(&end)) {
            if points.last().is_some_and(|last| last.same_position(p)) {
                continue;
            }
            points.push(*p);
        }
        // A route always has both endpoints, even when they coincide.
        if points.len() == 1 {
            points.push(end);
        } else if let Some(last) = points.last_mut() {
            *last = end;
        }
        Self { points }
    }

    /// Build from a full polyline whose first and last points are the
    /// endpoints.
    pub fn from_polyline(start: Point, end: Point, polyline: &[Point]) -> Self {
        let interior = match polyline {
            [_, inner @ .., _] => inner,
            _ => &[],
        };
        Self::normalize(start, end, interior)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    /// Sum of great-circle segment lengths.
    pub fn distance_km(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| pair[0].distance_km(&pair[1]))
            .sum()
    }
}

/// Swarm diagnostics attached to optimized results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmSummary {
    pub iterations_run: usize,
    pub final_fitness: f64,
    pub fitness_history: Vec<f64>,
    pub stop_reason: StopReason,
    pub population: usize,
}

/// The route object handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    pub start: RoutePoint,
    pub end: RoutePoint,
    /// Full polyline, start and end included.
    pub waypoints: Vec<Point>,
    pub distance_km: f64,
    pub estimated_duration_min: f64,
    pub is_safe: bool,
    /// Planner that produced the waypoints.
    pub planner: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swarm: Option<SwarmSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_pins_endpoints_and_drops_duplicates() {
        let start = Point::new(33.0, -117.0);
        let end = Point::new(33.01, -117.0);
        let mid = Point::new(33.005, -116.999);
        let route = Route::normalize(start, end, &[start, mid, mid, end]);
        assert_eq!(route.points(), &[start, mid, end]);
    }

    #[test]
    fn coincident_endpoints_still_give_two_points() {
        let p = Point::new(10.0, 10.0);
        let route = Route::normalize(p, p, &[]);
        assert_eq!(route.points().len(), 2);
        assert_eq!(route.distance_km(), 0.0);
    }

    #[test]
    fn mode_parses_aliases_and_serializes_lowercase() {
        assert_eq!("PSO".parse::<PlanningMode>(), Ok(PlanningMode::Optimized));
        assert_eq!("grid".parse::<PlanningMode>(), Ok(PlanningMode::Grid));
        assert!("teleport".parse::<PlanningMode>().is_err());
        assert_eq!(
            serde_json::to_string(&PlanningMode::Direct).unwrap(),
            "\"direct\""
        );
    }

    #[test]
    fn request_accepts_partial_json() {
        let json = r#"{
            "start": {"lat": 33.0, "lng": -117.0, "address": "Depot"},
            "end": {"lat": 33.01, "lng": -117.0},
            "mode": "optimized",
            "pso": {"population_size": 20}
        }"#;
        let request: PlanRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.mode, PlanningMode::Optimized);
        assert_eq!(request.start.address.as_deref(), Some("Depot"));
        let pso = request.pso.unwrap();
        assert_eq!(pso.population_size, 20);
        assert_eq!(pso.max_iterations, PsoConfig::default().max_iterations);
        assert!(request.obstacles.is_empty());
    }

    #[test]
    fn result_serializes_camel_case() {
        let result = RouteResult {
            start: RoutePoint::new(1.0, 2.0),
            end: RoutePoint::new(1.0, 2.1),
            waypoints: vec![Point::new(1.0, 2.0), Point::new(1.0, 2.1)],
            distance_km: 11.1,
            estimated_duration_min: 22.2,
            is_safe: true,
            planner: "direct".into(),
            warnings: Vec::new(),
            swarm: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["isSafe"], true);
        assert_eq!(value["estimatedDurationMin"], 22.2);
        assert!(value.get("swarm").is_none());
    }
}
