//! MILP (Mixed-Integer Linear Programming) Optimizer
//!
//! Exact cost-minimizing appliance scheduler. One decision variable per
//! (appliance, hour) pair:
//!
//! - objective: minimize `sum(x[a,h] * power[a] * price[h])`
//! - each appliance runs exactly `duration` hours: `sum_h x[a,h] == duration[a]`
//! - nothing runs in a restricted hour: `x[a,h] == 0`
//!
//! There is no capacity constraint across appliances, so appliances may run
//! concurrently.
//!
//! Every variable appears in exactly one equality row, which makes the
//! constraint matrix totally unimodular: the LP relaxation over `[0, 1]` has
//! integral vertices and the simplex solution is already binary. This lets
//! the pure-Rust backend solve it without integer support. The solution is
//! still checked for integrality and a fractional value is a solver error.

use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError,
    Solution, SolverModel, Variable,
};
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    validate_appliances, validate_restricted, Appliance, PriceSeries, RestrictedHours, Schedule,
    SchedulingContext,
};
use crate::error::{Result, SchedulingError};
use crate::optimizer::{
    ensure_feasible, OptimizerConfig, ScheduleOutcome, SchedulingStrategy, StrategyKind,
};

/// MILP optimizer using linear programming for exact solutions
#[derive(Debug, Clone, Default)]
pub struct MilpOptimizer {
    config: OptimizerConfig,
}

impl MilpOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Cost-optimal schedule and its total cost.
    ///
    /// Inputs are validated and feasibility is checked before the solver
    /// runs; an infeasible request fails with `Infeasible` rather than
    /// producing a short schedule.
    #[instrument(skip_all, fields(horizon = prices.horizon(), appliances = appliances.len()))]
    pub fn solve(
        &self,
        prices: &PriceSeries,
        appliances: &[Appliance],
        restricted: &RestrictedHours,
    ) -> Result<(Schedule, f64)> {
        validate_appliances(prices, appliances)?;
        validate_restricted(prices, restricted)?;
        ensure_feasible(prices, appliances, restricted)?;

        let horizon = prices.horizon();
        let n_variables = horizon * appliances.len();
        if n_variables > self.config.max_variables_warning {
            warn!(
                n_variables,
                limit = self.config.max_variables_warning,
                "large scheduling program, solve may be slow"
            );
        }

        let mut vars = ProblemVariables::new();
        let decision: Vec<Vec<Variable>> = appliances
            .iter()
            .map(|_| {
                (0..horizon)
                    .map(|_| vars.add(variable().min(0.0).max(1.0)))
                    .collect()
            })
            .collect();

        let price = prices.as_slice();
        let objective = appliances
            .iter()
            .zip(&decision)
            .flat_map(|(appliance, row)| {
                row.iter()
                    .enumerate()
                    .map(move |(h, x)| (*x, appliance.power * price[h]))
            })
            .fold(Expression::from(0.0), |acc, (x, weight)| acc + x * weight);

        let mut problem = vars.minimise(objective).using(default_solver);

        for (appliance, row) in appliances.iter().zip(&decision) {
            let hours_on = row
                .iter()
                .fold(Expression::from(0.0), |acc, x| acc + *x);
            problem = problem.with(constraint!(hours_on == appliance.duration as f64));

            for &h in restricted {
                problem = problem.with(constraint!(row[h] == 0.0));
            }
        }

        let solution = problem.solve().map_err(|e| match e {
            ResolutionError::Infeasible => SchedulingError::Infeasible {
                required: appliances.iter().map(|a| a.duration).sum(),
                available: horizon - restricted.len(),
                appliance: None,
            },
            other => SchedulingError::Solver(other.to_string()),
        })?;

        let mut schedule = Schedule::for_appliances(appliances);
        for (appliance, row) in appliances.iter().zip(&decision) {
            let mut hours = Vec::with_capacity(appliance.duration);
            for (h, x) in row.iter().enumerate() {
                let value = solution.value(*x);
                if (value - value.round()).abs() > self.config.integrality_tolerance {
                    return Err(SchedulingError::Solver(format!(
                        "non-integral decision {value:.6} for '{}' at hour {h}",
                        appliance.name
                    )));
                }
                if value.round() >= 1.0 {
                    hours.push(h);
                }
            }
            if hours.len() != appliance.duration {
                return Err(SchedulingError::Solver(format!(
                    "solver assigned {} hours to '{}', expected {}",
                    hours.len(),
                    appliance.name,
                    appliance.duration
                )));
            }
            debug!(appliance = %appliance.name, ?hours, "exact assignment");
            schedule.set_hours(appliance.name.clone(), hours);
        }

        let total_cost = schedule.total_cost(prices, appliances)?;
        info!(total_cost, "exact schedule solved");
        Ok((schedule, total_cost))
    }
}

impl SchedulingStrategy for MilpOptimizer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Exact
    }

    fn schedule(&self, ctx: &SchedulingContext) -> Result<ScheduleOutcome> {
        let (schedule, total_cost) =
            self.solve(&ctx.prices, &ctx.appliances, &ctx.restricted_hours)?;
        Ok(ScheduleOutcome {
            strategy: StrategyKind::Exact,
            schedule,
            total_cost,
        })
    }
}
