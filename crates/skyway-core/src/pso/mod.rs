//! Particle swarm optimization of intermediate waypoints.

pub mod config;
pub mod fitness;
pub mod refine;
pub mod swarm;

pub use config::PsoConfig;
pub use fitness::{FitnessBreakdown, FitnessEvaluator};
pub use refine::refine_route;
pub use swarm::{StopReason, SwarmOptimizer, SwarmOutcome};
