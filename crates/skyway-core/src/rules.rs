//! Safety rules and thresholds for route planning.

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};

/// Configuration for safety rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyRules {
    /// Mandatory clearance around every building footprint in meters
    pub safety_buffer_m: f64,
    /// Flight time estimate used for `estimatedDurationMin`
    pub minutes_per_km: f64,
}

impl Default for SafetyRules {
    fn default() -> Self {
        Self {
            safety_buffer_m: 100.0,
            minutes_per_km: 2.0,
        }
    }
}

impl SafetyRules {
    pub fn safety_buffer_km(&self) -> f64 {
        self.safety_buffer_m / 1000.0
    }

    pub fn validate(&self) -> Result<()> {
        if !self.safety_buffer_m.is_finite() || self.safety_buffer_m < 0.0 {
            return Err(PlanError::invalid_config(format!(
                "safety_buffer_m must be a non-negative number, got {}",
                self.safety_buffer_m
            )));
        }
        if !self.minutes_per_km.is_finite() || self.minutes_per_km < 0.0 {
            return Err(PlanError::invalid_config(format!(
                "minutes_per_km must be a non-negative number, got {}",
                self.minutes_per_km
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_override_keeps_defaults() {
        let rules: SafetyRules = serde_json::from_str(r#"{"safety_buffer_m": 50.0}"#).unwrap();
        assert_eq!(rules.safety_buffer_m, 50.0);
        assert_eq!(rules.minutes_per_km, 2.0);
        assert!((rules.safety_buffer_km() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn negative_buffer_is_rejected() {
        let rules = SafetyRules {
            safety_buffer_m: -1.0,
            ..SafetyRules::default()
        };
        assert!(rules.validate().is_err());
        assert!(SafetyRules::default().validate().is_ok());
    }
}
