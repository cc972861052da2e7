use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};

/// Inertia ceiling when exploration is widened.
const MAX_WIDENED_INERTIA: f64 = 0.9;
/// Velocity ceiling when exploration is widened, in meters per iteration.
const MAX_WIDENED_VELOCITY_M: f64 = 600.0;

/// Tuning for the swarm optimizer.
///
/// Positions and velocities live in the local frame, so velocity and jitter
/// are expressed in meters. Missing fields deserialize to the defaults, which
/// makes partial overrides possible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsoConfig {
    pub population_size: usize,
    /// Ceiling for adaptive growth; never below `population_size`
    pub max_population: usize,
    pub max_iterations: usize,
    /// Inertia weight
    pub w: f64,
    /// Cognitive coefficient (pull toward the personal best)
    pub c1: f64,
    /// Social coefficient (pull toward the global best)
    pub c2: f64,
    pub max_velocity_m: f64,
    pub waypoint_count: usize,
    pub collision_weight: f64,
    pub distance_weight: f64,
    pub smoothness_weight: f64,
    /// Scale of the uniform jitter applied to the initial straight-line waypoints
    pub init_jitter_m: f64,
    /// Iterations between cooperative yields in `run_async`
    pub yield_every: usize,
    pub seed: Option<u64>,
}

impl Default for PsoConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            max_population: 100,
            max_iterations: 150,
            w: 0.5,
            c1: 2.0,
            c2: 1.0,
            max_velocity_m: 150.0,
            waypoint_count: 8,
            collision_weight: 10_000.0,
            distance_weight: 5.0,
            smoothness_weight: 2.0,
            init_jitter_m: 500.0,
            yield_every: 5,
            seed: None,
        }
    }
}

impl PsoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(PlanError::invalid_config("population_size must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(PlanError::invalid_config("max_iterations must be at least 1"));
        }
        if self.waypoint_count == 0 {
            return Err(PlanError::invalid_config("waypoint_count must be at least 1"));
        }
        let non_negative = [
            ("w", self.w),
            ("c1", self.c1),
            ("c2", self.c2),
            ("collision_weight", self.collision_weight),
            ("distance_weight", self.distance_weight),
            ("smoothness_weight", self.smoothness_weight),
            ("init_jitter_m", self.init_jitter_m),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(PlanError::invalid_config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if !self.max_velocity_m.is_finite() || self.max_velocity_m <= 0.0 {
            return Err(PlanError::invalid_config(format!(
                "max_velocity_m must be positive, got {}",
                self.max_velocity_m
            )));
        }
        Ok(())
    }

    pub fn effective_max_population(&self) -> usize {
        self.max_population.max(self.population_size)
    }

    /// Copy with more inertia and a larger velocity cap, both bounded.
    pub fn widened(&self) -> Self {
        Self {
            w: (self.w * 1.2).min(MAX_WIDENED_INERTIA).max(self.w),
            max_velocity_m: (self.max_velocity_m * 1.5)
                .min(MAX_WIDENED_VELOCITY_M)
                .max(self.max_velocity_m),
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_is_bounded_and_never_shrinks() {
        let mut config = PsoConfig::default();
        for _ in 0..20 {
            let next = config.widened();
            assert!(next.w >= config.w);
            assert!(next.max_velocity_m >= config.max_velocity_m);
            config = next;
        }
        assert!(config.w <= MAX_WIDENED_INERTIA);
        assert!(config.max_velocity_m <= MAX_WIDENED_VELOCITY_M);
        assert_eq!(config.population_size, PsoConfig::default().population_size);
    }

    #[test]
    fn validation_rejects_nonsense() {
        assert!(PsoConfig::default().validate().is_ok());
        let bad = PsoConfig {
            c1: f64::NAN,
            ..PsoConfig::default()
        };
        assert!(bad.validate().is_err());
        let empty = PsoConfig {
            population_size: 0,
            ..PsoConfig::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn max_population_tracks_population_size() {
        let config = PsoConfig {
            population_size: 200,
            ..PsoConfig::default()
        };
        assert_eq!(config.effective_max_population(), 200);
    }
}
