//! CLI settings from environment.

use std::env;

use skyway_core::{GridConfig, SafetyRules};

#[derive(Debug, Clone)]
pub struct Settings {
    pub rules: SafetyRules,
    pub grid: GridConfig,
    pub pso_seed: Option<u64>,
}

impl Settings {
    pub fn from_env() -> Self {
        let rules = SafetyRules::default();
        let grid = GridConfig::default();
        Self {
            rules: SafetyRules {
                safety_buffer_m: parse_var("SKYWAY_SAFETY_BUFFER_M")
                    .unwrap_or(rules.safety_buffer_m),
                minutes_per_km: parse_var("SKYWAY_MINUTES_PER_KM")
                    .unwrap_or(rules.minutes_per_km),
            },
            grid: GridConfig {
                cell_size_m: parse_var("SKYWAY_GRID_CELL_M").unwrap_or(grid.cell_size_m),
                ..grid
            },
            pso_seed: parse_var("SKYWAY_PSO_SEED"),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_malformed_variables_are_ignored() {
        assert_eq!(parse_var::<f64>("SKYWAY_TEST_UNSET_VARIABLE"), None);
        env::set_var("SKYWAY_TEST_MALFORMED", "fast");
        assert_eq!(parse_var::<u64>("SKYWAY_TEST_MALFORMED"), None);
    }

    #[test]
    fn values_are_trimmed_before_parsing() {
        env::set_var("SKYWAY_TEST_PADDED", " 42 ");
        assert_eq!(parse_var::<u64>("SKYWAY_TEST_PADDED"), Some(42));
    }
}
