//! Skyway CLI - command line tools for the skyway route planner.
//!
//! Binaries:
//! - plan_route: plan one route over a GeoJSON building layer
//! - route_planner_stress: seeded synthetic scenarios with hazard checks

pub mod config;
pub mod loader;

pub use config::Settings;
pub use loader::{load_obstacles, parse_obstacles};
