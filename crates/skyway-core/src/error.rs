//! Error types for route planning.
//!
//! "No safe route exists" is not an error: planners always return a route and
//! report safety through `RouteResult::is_safe`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    /// A start or end coordinate was NaN or infinite.
    #[error("non-finite {which} point: ({lat}, {lng})")]
    NonFinitePoint {
        which: &'static str,
        lat: f64,
        lng: f64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The request was cancelled or superseded before it finished.
    #[error("planning cancelled")]
    Cancelled,
}

impl PlanError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let err = PlanError::NonFinitePoint {
            which: "start",
            lat: f64::NAN,
            lng: 1.0,
        };
        assert!(err.to_string().contains("start"));
        assert!(PlanError::invalid_config("w must be finite")
            .to_string()
            .contains("w must be finite"));
        assert_eq!(PlanError::Cancelled.to_string(), "planning cancelled");
    }
}
