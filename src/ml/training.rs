//! Policy-gradient training
//!
//! REINFORCE over the scheduling environment. Each appliance is credited
//! only with its own share of the reward, so its returns-to-go are computed
//! separately. A running baseline keyed by appliance and hour is
//! subtracted and the result is scaled by a running RMS, clipped, and used
//! to weight that appliance's log-probability gradient. A small entropy
//! bonus and a probability floor keep sampling from collapsing early.
//!
//! Sampling starts from [`LinearPolicy::exploratory`], which spreads runs
//! over the horizon. Every `eval_interval` episodes the greedy rollout is
//! scored and the best snapshot so far is kept. Complete schedules always
//! beat incomplete ones; among equals the higher return wins. The untrained
//! policy is the first snapshot, and for a feasible request it already
//! completes every appliance, so the returned policy never regresses below
//! that.

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::inference::{greedy_rollout, Rollout};
use super::{LinearPolicy, PolicyHandle, PolicyMetadata};
use crate::domain::SchedulingContext;
use crate::error::Result;
use crate::optimizer::ensure_feasible;
use crate::simulation::{EnvironmentConfig, SchedulingEnv};

/// Training Configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TrainingConfig {
    #[validate(range(min = 1))]
    pub episodes: usize,
    #[validate(range(exclusive_min = 0.0))]
    pub learning_rate: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub discount: f64,
    /// Weight of the newest return in the per-timestep baseline
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub baseline_smoothing: f64,
    /// Episodes between greedy evaluations
    #[validate(range(min = 1))]
    pub eval_interval: usize,
    /// Fixed seed for reproducible runs; entropy-seeded when unset
    pub seed: Option<u64>,
    #[validate(range(exclusive_min = 0.0))]
    pub max_grad_norm: f64,
    /// Weight of the entropy term in each update
    #[validate(range(min = 0.0))]
    pub entropy_bonus: f64,
    /// Sampled run probabilities are kept inside `[floor, 1 - floor]`
    #[validate(range(min = 0.0, exclusive_max = 0.5))]
    pub exploration_floor: f64,
    /// Bound on the normalized advantage
    #[validate(range(exclusive_min = 0.0))]
    pub advantage_clip: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 2_000,
            learning_rate: 0.1,
            discount: 0.99,
            baseline_smoothing: 0.1,
            eval_interval: 25,
            seed: None,
            max_grad_norm: 10.0,
            entropy_bonus: 0.01,
            exploration_floor: 0.02,
            advantage_clip: 5.0,
        }
    }
}

impl TrainingConfig {
    pub fn with_episodes(mut self, episodes: usize) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Reported after every greedy evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingProgress {
    pub episode: usize,
    pub episodes: usize,
    /// Undiscounted return of the last sampled episode
    pub episode_return: f64,
    pub best_return: f64,
    pub best_complete: bool,
}

impl TrainingProgress {
    pub fn fraction(&self) -> f64 {
        self.episode as f64 / self.episodes.max(1) as f64
    }
}

struct Snapshot {
    policy: LinearPolicy,
    total_return: f64,
    complete: bool,
}

impl Snapshot {
    fn beaten_by(&self, rollout: &Rollout) -> bool {
        match (rollout.complete, self.complete) {
            (true, false) => true,
            (false, true) => false,
            _ => rollout.total_return > self.total_return,
        }
    }
}

/// One sampled step, kept for the gradient pass
struct Transition {
    phi: Vec<f64>,
    actions: Vec<bool>,
    probs: Vec<f64>,
    pending: Vec<bool>,
    appliance_rewards: Vec<f64>,
}

/// Running per-appliance statistics used to turn returns into advantages
struct AdvantageEstimator {
    horizon: usize,
    smoothing: f64,
    clip: f64,
    baseline: Vec<Option<f64>>,
    mean_square: Vec<Option<f64>>,
}

impl AdvantageEstimator {
    fn new(n_appliances: usize, horizon: usize, config: &TrainingConfig) -> Self {
        Self {
            horizon,
            smoothing: config.baseline_smoothing,
            clip: config.advantage_clip,
            baseline: vec![None; n_appliances * horizon],
            mean_square: vec![None; n_appliances],
        }
    }

    /// Normalized advantage of `ret` for `appliance` at `hour`, updating the
    /// running baseline and scale.
    fn advantage(&mut self, appliance: usize, hour: usize, ret: f64) -> f64 {
        let baseline = self.baseline[appliance * self.horizon + hour].get_or_insert(ret);
        let delta = ret - *baseline;
        *baseline += self.smoothing * delta;

        let mean_square = self.mean_square[appliance].get_or_insert(delta * delta);
        *mean_square += self.smoothing * (delta * delta - *mean_square);

        (delta / (mean_square.sqrt() + 1e-8)).clamp(-self.clip, self.clip)
    }
}

/// Policy Trainer
pub struct PolicyTrainer {
    config: TrainingConfig,
    env_config: EnvironmentConfig,
}

impl PolicyTrainer {
    pub fn new(config: TrainingConfig, env_config: EnvironmentConfig) -> Self {
        Self { config, env_config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn train(&self, ctx: &SchedulingContext) -> Result<PolicyHandle> {
        self.train_with_progress(ctx, |_| {})
    }

    /// Train a policy for `ctx`, calling `on_progress` after every greedy
    /// evaluation.
    ///
    /// Infeasible requests are rejected before any episode runs.
    #[instrument(skip_all, fields(episodes = self.config.episodes, horizon = ctx.horizon()))]
    pub fn train_with_progress<F>(&self, ctx: &SchedulingContext, mut on_progress: F) -> Result<PolicyHandle>
    where
        F: FnMut(TrainingProgress),
    {
        self.config.validate()?;
        ctx.validate()?;
        ensure_feasible(&ctx.prices, &ctx.appliances, &ctx.restricted_hours)?;

        let mut env = SchedulingEnv::new(ctx, self.env_config.clone())?;
        let n_appliances = env.n_appliances();
        let horizon = env.horizon();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let untrained = LinearPolicy::new(n_appliances, horizon);
        let initial = greedy_rollout(&untrained, &mut env)?;
        let mut best = Snapshot {
            policy: untrained,
            total_return: initial.total_return,
            complete: initial.complete,
        };
        debug!(
            total_return = best.total_return,
            complete = best.complete,
            "initial greedy rollout"
        );

        let floor = self.config.exploration_floor;
        let durations: Vec<usize> = ctx.appliances.iter().map(|a| a.duration).collect();
        let mut policy = LinearPolicy::exploratory(horizon, &durations, floor);
        let mut estimator = AdvantageEstimator::new(n_appliances, horizon, &self.config);
        let mut grad = vec![0.0; policy.parameter_count()];
        let mut advantages = vec![0.0; n_appliances];
        let mut returns = vec![0.0; n_appliances];
        let mut trajectory: Vec<Transition> = Vec::with_capacity(horizon);

        for episode in 1..=self.config.episodes {
            trajectory.clear();
            let mut obs = env.reset();
            while !env.is_done() {
                let phi = policy.features(&obs)?;
                let (actions, probs) = policy.sample_action(&phi, floor, &mut rng);
                let step = env.step(&actions)?;
                trajectory.push(Transition {
                    phi,
                    actions,
                    probs,
                    pending: obs.pending,
                    appliance_rewards: step.appliance_rewards,
                });
                obs = step.observation;
            }

            let episode_return: f64 = trajectory
                .iter()
                .flat_map(|t| t.appliance_rewards.iter())
                .sum();

            grad.iter_mut().for_each(|g| *g = 0.0);
            returns.iter_mut().for_each(|r| *r = 0.0);
            for (t, transition) in trajectory.iter().enumerate().rev() {
                for i in 0..n_appliances {
                    returns[i] = transition.appliance_rewards[i] + self.config.discount * returns[i];
                    // a finished appliance's action has no effect
                    advantages[i] = if transition.pending[i] {
                        estimator.advantage(i, t, returns[i])
                    } else {
                        0.0
                    };
                }
                policy.accumulate_log_prob_grad(
                    &transition.phi,
                    &transition.actions,
                    &transition.probs,
                    &advantages,
                    &mut grad,
                );
                policy.accumulate_entropy_grad(&transition.phi, self.config.entropy_bonus, &mut grad);
            }
            policy.apply_gradient(&grad, self.config.learning_rate, self.config.max_grad_norm);

            if episode % self.config.eval_interval == 0 || episode == self.config.episodes {
                let rollout = greedy_rollout(&policy, &mut env)?;
                if best.beaten_by(&rollout) {
                    debug!(
                        episode,
                        total_return = rollout.total_return,
                        complete = rollout.complete,
                        "new best greedy policy"
                    );
                    best = Snapshot {
                        policy: policy.clone(),
                        total_return: rollout.total_return,
                        complete: rollout.complete,
                    };
                }
                on_progress(TrainingProgress {
                    episode,
                    episodes: self.config.episodes,
                    episode_return,
                    best_return: best.total_return,
                    best_complete: best.complete,
                });
            }
        }

        info!(
            best_return = best.total_return,
            complete = best.complete,
            "training finished"
        );

        let metadata = PolicyMetadata {
            policy_id: Uuid::new_v4(),
            trained_at: chrono::Utc::now(),
            episodes: self.config.episodes,
            best_return: Some(best.total_return),
            appliance_names: ctx.appliances.iter().map(|a| a.name.clone()).collect(),
            horizon: ctx.horizon(),
        };
        Ok(PolicyHandle::new(best.policy, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Appliance, Preferences, PriceSeries, RestrictedHours};
    use crate::ml::run_policy;
    use crate::optimizer::MilpOptimizer;

    fn ctx() -> SchedulingContext {
        SchedulingContext::new(
            PriceSeries::new(vec![0.40, 0.35, 0.30, 0.10, 0.05, 0.08]).unwrap(),
            vec![Appliance::new("Washer", 1.0, 2), Appliance::new("Dryer", 2.0, 1)],
            RestrictedHours::new(),
            Preferences::new(),
        )
        .unwrap()
    }

    fn trainer(episodes: usize) -> PolicyTrainer {
        PolicyTrainer::new(
            TrainingConfig::default().with_episodes(episodes).with_seed(42),
            EnvironmentConfig::default(),
        )
    }

    /// Washer and dryer over a day whose cheap hours are `cheap`
    fn band_ctx(cheap: std::ops::Range<usize>) -> SchedulingContext {
        let prices = (0..24).map(|h| if cheap.contains(&h) { 0.05 } else { 0.40 }).collect();
        SchedulingContext::new(
            PriceSeries::new(prices).unwrap(),
            vec![Appliance::new("Washer", 1.0, 2), Appliance::new("Dryer", 2.5, 1)],
            RestrictedHours::new(),
            Preferences::new(),
        )
        .unwrap()
    }

    /// (learned, untrained, exact) costs after training on `ctx`
    fn costs_after_training(ctx: &SchedulingContext, episodes: usize, seed: u64) -> (f64, f64, f64) {
        let env = EnvironmentConfig::default();
        let handle = PolicyTrainer::new(
            TrainingConfig::default().with_episodes(episodes).with_seed(seed),
            env.clone(),
        )
        .train(ctx)
        .unwrap();
        let learned = run_policy(&handle, ctx, &env).unwrap();
        let untrained = run_policy(&PolicyHandle::untrained(ctx), ctx, &env).unwrap();
        assert!(learned.is_feasible(&ctx.appliances, &ctx.restricted_hours));

        let (_, exact) = MilpOptimizer::default()
            .solve(&ctx.prices, &ctx.appliances, &ctx.restricted_hours)
            .unwrap();
        (
            learned.total_cost(&ctx.prices, &ctx.appliances).unwrap(),
            untrained.total_cost(&ctx.prices, &ctx.appliances).unwrap(),
            exact,
        )
    }

    #[test]
    fn test_learns_to_wait_for_late_cheap_hours() {
        let (learned, untrained, exact) = costs_after_training(&band_ctx(12..24), 500, 42);
        assert!((untrained - 1.8).abs() < 1e-9);
        assert!(learned < untrained);
        assert!(learned >= exact - 1e-9);
    }

    #[test]
    fn test_learns_cheap_band_in_middle_of_day() {
        let (learned, untrained, exact) = costs_after_training(&band_ctx(8..16), 1_500, 7);
        assert!(learned < untrained / 2.0);
        assert!(learned >= exact - 1e-9);
    }

    #[test]
    fn test_trained_policy_metadata() {
        let ctx = ctx();
        let handle = trainer(100).train(&ctx).unwrap();
        assert!(run_policy(&handle, &ctx, &EnvironmentConfig::default()).is_ok());
        assert_eq!(handle.metadata.episodes, 100);
        assert_eq!(handle.metadata.appliance_names, vec!["Washer", "Dryer"]);
        assert!(handle.metadata.best_return.is_some());
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let ctx = ctx();
        let a = trainer(50).train(&ctx).unwrap();
        let b = trainer(50).train(&ctx).unwrap();
        assert_eq!(a.policy, b.policy);
    }

    #[test]
    fn test_infeasible_request_rejected() {
        let ctx = SchedulingContext::new(
            PriceSeries::new(vec![0.1; 3]).unwrap(),
            vec![Appliance::new("Washer", 1.0, 2), Appliance::new("Dryer", 2.0, 2)],
            [0].into_iter().collect(),
            Preferences::new(),
        )
        .unwrap();
        let err = trainer(10).train(&ctx).unwrap_err();
        assert_eq!(err.kind(), "Infeasible");
    }

    #[test]
    fn test_progress_reported_per_evaluation() {
        let mut reports = Vec::new();
        trainer(60)
            .train_with_progress(&ctx(), |p| reports.push(p))
            .unwrap();
        let episodes: Vec<usize> = reports.iter().map(|p| p.episode).collect();
        assert_eq!(episodes, vec![25, 50, 60]);
        assert!(reports.iter().all(|p| p.best_complete));
        assert_eq!(reports.last().map(|p| p.fraction()), Some(1.0));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let trainer = PolicyTrainer::new(
            TrainingConfig {
                exploration_floor: 0.5,
                ..TrainingConfig::default()
            },
            EnvironmentConfig::default(),
        );
        assert_eq!(trainer.train(&ctx()).unwrap_err().kind(), "MalformedInput");
    }
}
