use serde::Serialize;
use thiserror::Error;

use crate::domain::Schedule;

pub type Result<T, E = SchedulingError> = std::result::Result<T, E>;

/// How far an appliance fell short of its required duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortfall {
    pub appliance: String,
    pub scheduled: usize,
    pub required: usize,
}

/// Errors surfaced by the scheduling engine.
///
/// Every variant is a distinct condition the caller can match on; none of
/// them is ever converted into a default schedule or score inside the engine.
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("Infeasible: {required} appliance-hours required but only {available} hours available{}", .appliance.as_deref().map(|a| format!(" (appliance '{a}')")).unwrap_or_default())]
    Infeasible {
        required: usize,
        available: usize,
        appliance: Option<String>,
    },

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Degenerate schedule: {} appliance(s) below required duration", .shortfalls.len())]
    DegenerateSchedule {
        shortfalls: Vec<Shortfall>,
        /// The incomplete schedule the runner produced, for the caller to inspect.
        partial: Schedule,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Training already in progress")]
    TrainingInProgress,

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A blocking solve or training task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl SchedulingError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        SchedulingError::MalformedInput(msg.into())
    }

    /// Stable tag for logs and status reporting
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulingError::Infeasible { .. } => "Infeasible",
            SchedulingError::Solver(_) => "SolverError",
            SchedulingError::DegenerateSchedule { .. } => "DegenerateSchedule",
            SchedulingError::MalformedInput(_) => "MalformedInput",
            SchedulingError::TrainingInProgress => "TrainingInProgress",
            SchedulingError::Persistence(_) => "PersistenceError",
            SchedulingError::TaskFailed(_) => "TaskFailed",
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, SchedulingError::DegenerateSchedule { .. })
    }
}

impl From<validator::ValidationErrors> for SchedulingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        SchedulingError::MalformedInput(errors.to_string())
    }
}

impl From<serde_json::Error> for SchedulingError {
    fn from(error: serde_json::Error) -> Self {
        SchedulingError::Persistence(error.to_string())
    }
}

impl From<std::io::Error> for SchedulingError {
    fn from(error: std::io::Error) -> Self {
        SchedulingError::Persistence(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(SchedulingError::Solver("x".into()).kind(), "SolverError");
        assert_eq!(SchedulingError::malformed("x").kind(), "MalformedInput");
        assert_eq!(SchedulingError::TrainingInProgress.kind(), "TrainingInProgress");
        assert_eq!(SchedulingError::TaskFailed("x".into()).kind(), "TaskFailed");
    }

    #[test]
    fn test_error_display() {
        let error = SchedulingError::Infeasible {
            required: 5,
            available: 3,
            appliance: Some("Dryer".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "Infeasible: 5 appliance-hours required but only 3 hours available (appliance 'Dryer')"
        );

        let error = SchedulingError::Infeasible {
            required: 5,
            available: 3,
            appliance: None,
        };
        assert_eq!(
            error.to_string(),
            "Infeasible: 5 appliance-hours required but only 3 hours available"
        );
    }

    #[test]
    fn test_degenerate_flag() {
        let error = SchedulingError::DegenerateSchedule {
            shortfalls: vec![Shortfall {
                appliance: "Washer".into(),
                scheduled: 0,
                required: 2,
            }],
            partial: Schedule::default(),
        };
        assert!(error.is_degenerate());
        assert!(!SchedulingError::TrainingInProgress.is_degenerate());
    }
}
