pub mod cancel;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod heuristic;
pub mod models;
pub mod obstacles;
pub mod planner;
pub mod pso;
pub mod rules;
pub mod spatial;

pub use cancel::{CancelToken, RequestGate, RequestTicket};
pub use error::{PlanError, Result};
pub use geometry::{GeometryKernel, PlanarKernel, Point, Polygon, Region};
pub use grid::{find_path, GridConfig, GridOutcome, WalkabilityGrid};
pub use heuristic::{HeuristicConfig, HeuristicOutcome, HeuristicRouter, RouteStrategy};
pub use models::{PlanRequest, PlanningMode, Route, RoutePoint, RouteResult, SwarmSummary};
pub use obstacles::{BufferedObstacle, Obstacle, ObstacleField};
pub use planner::{plan_route, plan_route_blocking};
pub use pso::{PsoConfig, StopReason, SwarmOptimizer, SwarmOutcome};
pub use rules::SafetyRules;
pub use spatial::haversine_distance;
