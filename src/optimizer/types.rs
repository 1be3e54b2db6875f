use serde::{Deserialize, Serialize};
use strum::Display;

use crate::domain::{Schedule, SchedulingContext};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Warn when the program grows past this many decision variables
    pub max_variables_warning: usize,
    /// Distance from 0/1 accepted when reading back a decision value
    pub integrality_tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_variables_warning: 2_000,
            integrality_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    Exact,
    Learned,
}

/// A schedule together with its price-weighted cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleOutcome {
    pub strategy: StrategyKind,
    pub schedule: Schedule,
    pub total_cost: f64,
}

/// Anything that can turn a validated request into a schedule.
pub trait SchedulingStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn schedule(&self, ctx: &SchedulingContext) -> Result<ScheduleOutcome>;
}
