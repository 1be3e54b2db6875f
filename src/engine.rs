//! Flat entry points over the scheduling core.
//!
//! Each function uses default configuration. Callers that need tuned
//! optimizer, comfort or training parameters use the underlying types
//! directly, or go through [`crate::controller::SchedulingService`].

use std::collections::BTreeMap;

use crate::comfort::ComfortModel;
use crate::domain::{Appliance, Preferences, PriceSeries, RestrictedHours, Schedule, SchedulingContext};
use crate::error::Result;
use crate::ml::{self, PolicyHandle, PolicyTrainer, TrainingConfig};
use crate::optimizer::{self, MilpOptimizer};
use crate::simulation::EnvironmentConfig;
use crate::utils;

/// Cost-optimal schedule and its total cost.
pub fn solve_exact(
    prices: &PriceSeries,
    appliances: &[Appliance],
    restricted_hours: &RestrictedHours,
) -> Result<(Schedule, f64)> {
    MilpOptimizer::default().solve(prices, appliances, restricted_hours)
}

/// Comfort score on the 0-10 scale. Without `prices` the cost tier sits at
/// its baseline.
pub fn score_comfort(
    schedule: &Schedule,
    preferences: &Preferences,
    prices: Option<&PriceSeries>,
    appliances: Option<&[Appliance]>,
) -> Result<f64> {
    ComfortModel::default().score(schedule, preferences, prices, appliances)
}

/// Train a policy for this request.
pub fn train_scheduler(
    prices: &PriceSeries,
    appliances: &[Appliance],
    restricted_hours: &RestrictedHours,
    preferences: &Preferences,
) -> Result<PolicyHandle> {
    let ctx = SchedulingContext::new(
        prices.clone(),
        appliances.to_vec(),
        restricted_hours.clone(),
        preferences.clone(),
    )?;
    PolicyTrainer::new(TrainingConfig::default(), EnvironmentConfig::default()).train(&ctx)
}

/// Greedy rollout of a trained policy. Fails with `DegenerateSchedule` when
/// the rollout leaves any appliance short.
pub fn run_scheduler(
    policy: &PolicyHandle,
    prices: &PriceSeries,
    appliances: &[Appliance],
    restricted_hours: &RestrictedHours,
    preferences: &Preferences,
) -> Result<Schedule> {
    let ctx = SchedulingContext::new(
        prices.clone(),
        appliances.to_vec(),
        restricted_hours.clone(),
        preferences.clone(),
    )?;
    ml::run_policy(policy, &ctx, &EnvironmentConfig::default())
}

pub fn format_schedule(schedule: &Schedule, appliances: &[Appliance]) -> BTreeMap<String, String> {
    utils::format_schedule(schedule, appliances)
}

pub fn feasibility_check(
    prices: &PriceSeries,
    appliances: &[Appliance],
    restricted_hours: &RestrictedHours,
) -> bool {
    optimizer::feasibility_check(prices, appliances, restricted_hours)
}

/// Price-weighted cost of any schedule, computed the same way as the exact
/// optimizer's objective.
pub fn schedule_cost(schedule: &Schedule, prices: &PriceSeries, appliances: &[Appliance]) -> Result<f64> {
    schedule.total_cost(prices, appliances)
}
