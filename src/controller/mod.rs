pub mod scheduler;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{info, instrument, warn};

use crate::comfort::ComfortModel;
use crate::config::Config;
use crate::domain::{Schedule, SchedulingContext, SchedulingRequest};
use crate::error::{Result, SchedulingError};
use crate::ml::{LearnedScheduler, PolicyHandle};
use crate::optimizer::{MilpOptimizer, ScheduleOutcome, SchedulingStrategy, StrategyKind};
use crate::utils::format_schedule;

pub use scheduler::{TrainingCoordinator, TrainingStatus};

pub(crate) fn join_error(e: JoinError) -> SchedulingError {
    SchedulingError::TaskFailed(e.to_string())
}

/// What a caller gets back for one scheduling request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
    /// Strategy that produced `schedule`; `Exact` when a learned request
    /// fell back
    pub strategy: StrategyKind,
    pub schedule: Schedule,
    pub readable: BTreeMap<String, String>,
    pub total_cost: f64,
    pub comfort_score: f64,
    /// Hours priced more than one standard deviation above the mean
    pub peak_hours: Vec<usize>,
    /// Appliance-hours the schedule places in `peak_hours`
    pub peak_usage: usize,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub exact: OptimizationReport,
    pub learned: OptimizationReport,
    /// Learned cost minus exact cost; never negative
    pub cost_gap: f64,
}

/// Orchestrates both strategies for a request: solving runs on the blocking
/// pool, training goes through the [`TrainingCoordinator`].
#[derive(Clone)]
pub struct SchedulingService {
    cfg: Config,
    optimizer: Arc<MilpOptimizer>,
    comfort: ComfortModel,
    coordinator: Arc<TrainingCoordinator>,
}

impl SchedulingService {
    pub fn new(cfg: Config) -> Self {
        let coordinator = Arc::new(TrainingCoordinator::new(
            cfg.trainer.clone(),
            cfg.environment.clone(),
            Some(cfg.service.policy_path.clone()),
        ));
        Self {
            optimizer: Arc::new(MilpOptimizer::new(cfg.optimizer.clone())),
            comfort: ComfortModel::new(cfg.comfort.clone()),
            coordinator,
            cfg,
        }
    }

    pub fn coordinator(&self) -> &Arc<TrainingCoordinator> {
        &self.coordinator
    }

    pub fn training_status(&self) -> TrainingStatus {
        self.coordinator.status()
    }

    /// Fit a caller's price feed to the configured horizon and validate the
    /// request.
    pub fn context_from_request(&self, request: SchedulingRequest) -> Result<SchedulingContext> {
        request.into_context(self.cfg.prices.horizon_hours, self.cfg.prices.short_series)
    }

    #[instrument(skip_all, fields(appliances = ctx.appliances.len(), horizon = ctx.horizon()))]
    pub async fn optimize_exact(&self, ctx: &SchedulingContext) -> Result<OptimizationReport> {
        let outcome = self.solve_exact(ctx).await?;
        self.report(outcome, ctx, false)
    }

    /// Learned schedule for the request, training first when no compatible
    /// policy is installed.
    ///
    /// A degenerate rollout falls back to the exact schedule when
    /// `service.fallback_to_exact` is set; otherwise the error is returned.
    #[instrument(skip_all, fields(appliances = ctx.appliances.len(), horizon = ctx.horizon()))]
    pub async fn optimize_learned(&self, ctx: &SchedulingContext) -> Result<OptimizationReport> {
        let handle = self.policy_for(ctx).await?;
        let scheduler = LearnedScheduler::new(handle, self.coordinator.env_config().clone());
        let request = ctx.clone();

        let learned = tokio::task::spawn_blocking(move || scheduler.schedule(&request))
            .await
            .map_err(join_error)?;

        match learned {
            Ok(outcome) => self.report(outcome, ctx, false),
            Err(e) if e.is_degenerate() && self.cfg.service.fallback_to_exact => {
                warn!(error = %e, "learned schedule degenerate, falling back to exact");
                let outcome = self.solve_exact(ctx).await?;
                self.report(outcome, ctx, true)
            }
            Err(e) => Err(e),
        }
    }

    /// Run both strategies on the same request.
    pub async fn compare(&self, ctx: &SchedulingContext) -> Result<ComparisonReport> {
        let exact = self.optimize_exact(ctx).await?;
        let learned = self.optimize_learned(ctx).await?;
        let cost_gap = learned.total_cost - exact.total_cost;
        info!(
            exact_cost = exact.total_cost,
            learned_cost = learned.total_cost,
            exact_comfort = exact.comfort_score,
            learned_comfort = learned.comfort_score,
            "strategy comparison"
        );
        Ok(ComparisonReport {
            exact,
            learned,
            cost_gap,
        })
    }

    async fn policy_for(&self, ctx: &SchedulingContext) -> Result<Arc<PolicyHandle>> {
        let mut current = self.coordinator.current_policy().await;
        if current.is_none() {
            current = self.coordinator.load_saved_policy().await?;
        }
        if let Some(handle) = current {
            match handle.check_compatible(ctx) {
                Ok(()) => return Ok(handle),
                Err(e) => info!(reason = %e, "installed policy does not fit request, retraining"),
            }
        }
        self.coordinator.train(ctx.clone()).await
    }

    async fn solve_exact(&self, ctx: &SchedulingContext) -> Result<ScheduleOutcome> {
        let optimizer = Arc::clone(&self.optimizer);
        let request = ctx.clone();
        tokio::task::spawn_blocking(move || optimizer.schedule(&request))
            .await
            .map_err(join_error)?
    }

    fn report(
        &self,
        outcome: ScheduleOutcome,
        ctx: &SchedulingContext,
        fallback_used: bool,
    ) -> Result<OptimizationReport> {
        let comfort_score = self.comfort.score(
            &outcome.schedule,
            &ctx.preferences,
            Some(&ctx.prices),
            Some(&ctx.appliances),
        )?;
        let peak_hours = ctx.prices.peak_hours();
        let peak_usage: usize = outcome
            .schedule
            .iter()
            .map(|(_, hours)| hours.iter().filter(|h| peak_hours.contains(*h)).count())
            .sum();
        Ok(OptimizationReport {
            strategy: outcome.strategy,
            readable: format_schedule(&outcome.schedule, &ctx.appliances),
            peak_hours,
            peak_usage,
            schedule: outcome.schedule,
            total_cost: outcome.total_cost,
            comfort_score,
            fallback_used,
        })
    }
}
