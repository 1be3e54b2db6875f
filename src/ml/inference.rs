//! Policy rollout
//!
//! Runs a trained policy greedily through a fresh environment and rebuilds
//! the schedule from what the environment actually credited.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{LinearPolicy, PolicyHandle};
use crate::domain::{Schedule, SchedulingContext};
use crate::error::{Result, SchedulingError};
use crate::optimizer::{ScheduleOutcome, SchedulingStrategy, StrategyKind};
use crate::simulation::{EnvironmentConfig, SchedulingEnv};

/// Result of one greedy rollout
#[derive(Debug, Clone)]
pub struct Rollout {
    pub schedule: Schedule,
    pub total_return: f64,
    pub complete: bool,
}

/// Deterministic rollout of `policy` through `env`, which is reset first.
///
/// An hour is recorded for an appliance only if the policy chose to run it,
/// the appliance still had duration left when the step started, and the
/// step consumed that duration. Run decisions the environment discarded
/// (exhausted appliance, restricted hour) never show up in the schedule.
pub fn greedy_rollout(policy: &LinearPolicy, env: &mut SchedulingEnv) -> Result<Rollout> {
    let mut obs = env.reset();
    let mut schedule = Schedule::for_appliances(env.appliances());
    let mut total_return = 0.0;

    while !env.is_done() {
        let hour = env.current_hour();
        let remaining_before = env.remaining().to_vec();
        let action = policy.greedy_action(&obs)?;

        let step = env.step(&action)?;
        total_return += step.reward;

        for (i, run) in action.iter().enumerate() {
            if *run && remaining_before[i] > 0 && env.remaining()[i] < remaining_before[i] {
                schedule.insert_hour(&env.appliances()[i].name, hour);
            }
        }
        obs = step.observation;
    }

    let complete = env.remaining().iter().all(|r| *r == 0);
    Ok(Rollout {
        schedule,
        total_return,
        complete,
    })
}

/// Roll a trained policy forward into a concrete schedule.
///
/// Fails with `DegenerateSchedule` when any appliance ends up short of its
/// duration; the partial schedule travels with the error.
#[instrument(skip_all, fields(policy_id = %handle.metadata.policy_id))]
pub fn run_policy(
    handle: &PolicyHandle,
    ctx: &SchedulingContext,
    env_config: &EnvironmentConfig,
) -> Result<Schedule> {
    handle.check_compatible(ctx)?;
    let mut env = SchedulingEnv::new(ctx, env_config.clone())?;
    let rollout = greedy_rollout(&handle.policy, &mut env)?;

    let shortfalls = rollout.schedule.shortfalls(&ctx.appliances);
    if !shortfalls.is_empty() {
        warn!(?shortfalls, "learned schedule is incomplete");
        return Err(SchedulingError::DegenerateSchedule {
            shortfalls,
            partial: rollout.schedule,
        });
    }

    info!(total_return = rollout.total_return, "learned schedule produced");
    Ok(rollout.schedule)
}

/// Learned scheduling strategy backed by a trained policy
#[derive(Debug, Clone)]
pub struct LearnedScheduler {
    handle: Arc<PolicyHandle>,
    env_config: EnvironmentConfig,
}

impl LearnedScheduler {
    pub fn new(handle: Arc<PolicyHandle>, env_config: EnvironmentConfig) -> Self {
        Self { handle, env_config }
    }

    pub fn handle(&self) -> &PolicyHandle {
        &self.handle
    }
}

impl SchedulingStrategy for LearnedScheduler {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Learned
    }

    fn schedule(&self, ctx: &SchedulingContext) -> Result<ScheduleOutcome> {
        let schedule = run_policy(&self.handle, ctx, &self.env_config)?;
        let total_cost = schedule.total_cost(&ctx.prices, &ctx.appliances)?;
        Ok(ScheduleOutcome {
            strategy: StrategyKind::Learned,
            schedule,
            total_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Appliance, Preferences, PriceSeries, RestrictedHours};

    fn ctx(restricted: &[usize]) -> SchedulingContext {
        SchedulingContext::new(
            PriceSeries::new(vec![0.3, 0.1, 0.2, 0.1, 0.4, 0.2]).unwrap(),
            vec![Appliance::new("Washer", 1.0, 2), Appliance::new("Dryer", 2.0, 1)],
            restricted.iter().copied().collect::<RestrictedHours>(),
            Preferences::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_untrained_policy_runs_earliest_hours() {
        let ctx = ctx(&[]);
        let schedule = run_policy(&PolicyHandle::untrained(&ctx), &ctx, &EnvironmentConfig::default()).unwrap();
        assert_eq!(schedule.hours_vec("Washer"), vec![0, 1]);
        assert_eq!(schedule.hours_vec("Dryer"), vec![0]);
    }

    #[test]
    fn test_restricted_hours_are_not_recorded() {
        let ctx = ctx(&[0, 1]);
        let schedule = run_policy(&PolicyHandle::untrained(&ctx), &ctx, &EnvironmentConfig::default()).unwrap();
        assert_eq!(schedule.hours_vec("Washer"), vec![2, 3]);
        assert_eq!(schedule.hours_vec("Dryer"), vec![2]);
        assert!(schedule.is_feasible(&ctx.appliances, &ctx.restricted_hours));
    }

    #[test]
    fn test_exhausted_appliance_not_recorded() {
        let ctx = ctx(&[]);
        let mut env = SchedulingEnv::new(&ctx, EnvironmentConfig::default()).unwrap();
        // Dryer keeps choosing "run" after its single hour is used up
        let mut policy = LinearPolicy::new(2, 6);
        policy.set_bias(0, -1.0);
        let rollout = greedy_rollout(&policy, &mut env).unwrap();
        assert_eq!(rollout.schedule.hours_vec("Dryer"), vec![0]);
        assert!(rollout.schedule.hours_vec("Washer").is_empty());
        assert!(!rollout.complete);
    }

    #[test]
    fn test_degenerate_schedule_is_reported() {
        let ctx = ctx(&[]);
        let mut handle = PolicyHandle::untrained(&ctx);
        handle.policy.set_bias(1, -5.0);

        let err = run_policy(&handle, &ctx, &EnvironmentConfig::default()).unwrap_err();
        match err {
            SchedulingError::DegenerateSchedule { shortfalls, partial } => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].appliance, "Dryer");
                assert_eq!(shortfalls[0].scheduled, 0);
                assert_eq!(partial.hours_vec("Washer"), vec![0, 1]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_learned_strategy_costs_schedule() {
        let ctx = ctx(&[]);
        let scheduler = LearnedScheduler::new(
            Arc::new(PolicyHandle::untrained(&ctx)),
            EnvironmentConfig::default(),
        );
        let outcome = scheduler.schedule(&ctx).unwrap();
        assert_eq!(outcome.strategy, StrategyKind::Learned);
        // Washer 0.3 + 0.1, Dryer 2.0 * 0.3
        assert!((outcome.total_cost - 1.0).abs() < 1e-9);
    }
}
