//! # Scheduling Environment
//!
//! Discrete-time simulation used to train and roll out the learned
//! scheduler. One step per hour of the horizon; at each step the agent
//! decides, for every appliance, whether it runs during that hour.
//!
//! Transition and reward are deterministic given state, action and
//! configuration. Only the trainer's action sampling is random.

use serde::{Deserialize, Serialize};

use crate::domain::{Appliance, Preference, SchedulingContext};
use crate::error::{Result, SchedulingError};

/// Reward shaping parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Penalty per run decision taken during a restricted hour
    pub restricted_penalty: f64,
    /// Appliances allowed to run together before the concurrency penalty applies
    pub concurrency_limit: usize,
    /// Penalty per appliance above `concurrency_limit`
    pub concurrency_penalty: f64,
    /// Minimum terminal penalty per unmet appliance-hour
    pub unmet_duration_penalty: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            restricted_penalty: 10.0,
            concurrency_limit: 2,
            concurrency_penalty: 0.5,
            unmet_duration_penalty: 50.0,
        }
    }
}

impl EnvironmentConfig {
    pub fn with_restricted_penalty(mut self, penalty: f64) -> Self {
        self.restricted_penalty = penalty;
        self
    }

    pub fn with_concurrency(mut self, limit: usize, penalty: f64) -> Self {
        self.concurrency_limit = limit;
        self.concurrency_penalty = penalty;
        self
    }

    pub fn with_unmet_duration_penalty(mut self, penalty: f64) -> Self {
        self.unmet_duration_penalty = penalty;
        self
    }
}

/// What the agent sees at the start of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub hour: usize,
    pub horizon: usize,
    /// One flag per appliance: still has duration left
    pub pending: Vec<bool>,
}

impl Observation {
    /// `[hour / horizon, pending_0, pending_1, ...]`
    pub fn to_vector(&self) -> Vec<f64> {
        std::iter::once(self.hour as f64 / self.horizon as f64)
            .chain(self.pending.iter().map(|p| if *p { 1.0 } else { 0.0 }))
            .collect()
    }
}

/// Reward components of a single step. All terms are stored as magnitudes;
/// `reward()` applies the signs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RewardBreakdown {
    pub energy_cost: f64,
    /// Net comfort term: avoid penalties minus preferred bonuses
    pub comfort_penalty: f64,
    pub concurrency_penalty: f64,
    pub restricted_penalty: f64,
    pub terminal_penalty: f64,
}

impl RewardBreakdown {
    pub fn reward(&self) -> f64 {
        -(self.energy_cost
            + self.comfort_penalty
            + self.concurrency_penalty
            + self.restricted_penalty
            + self.terminal_penalty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    /// `reward` split by appliance; the entries sum to `reward`
    pub appliance_rewards: Vec<f64>,
    pub done: bool,
    pub breakdown: RewardBreakdown,
}

/// Appliance scheduling environment
pub struct SchedulingEnv {
    prices: Vec<f64>,
    appliances: Vec<Appliance>,
    restricted: Vec<bool>,
    preferences: Vec<Preference>,
    config: EnvironmentConfig,
    unmet_penalty: f64,
    current_hour: usize,
    remaining: Vec<usize>,
}

impl SchedulingEnv {
    /// Build an environment for a validated request.
    pub fn new(ctx: &SchedulingContext, config: EnvironmentConfig) -> Result<Self> {
        ctx.validate()?;
        if !config.restricted_penalty.is_finite()
            || !config.concurrency_penalty.is_finite()
            || !config.unmet_duration_penalty.is_finite()
        {
            return Err(SchedulingError::malformed("environment penalties must be finite"));
        }

        let horizon = ctx.horizon();
        let mut restricted = vec![false; horizon];
        for &h in &ctx.restricted_hours {
            restricted[h] = true;
        }
        let preferences: Vec<Preference> = ctx
            .appliances
            .iter()
            .map(|a| {
                ctx.preferences.get(&a.name).cloned().unwrap_or(Preference {
                    avoid_penalty: 0.0,
                    preferred_bonus: 0.0,
                    ..Preference::default()
                })
            })
            .collect();

        let mut env = Self {
            prices: ctx.prices.as_slice().to_vec(),
            appliances: ctx.appliances.clone(),
            restricted,
            preferences,
            config,
            unmet_penalty: 0.0,
            current_hour: 0,
            remaining: ctx.appliances.iter().map(|a| a.duration).collect(),
        };
        env.unmet_penalty = env
            .config
            .unmet_duration_penalty
            .max(env.worst_case_episode_swing() + 1.0);
        Ok(env)
    }

    /// Upper bound on how far every non-terminal reward term can move one
    /// episode's return, in either direction.
    ///
    /// The terminal penalty per unmet hour is kept above this bound so that
    /// any complete episode out-scores any incomplete one.
    fn worst_case_episode_swing(&self) -> f64 {
        let n = self.appliances.len();
        let excess = n.saturating_sub(self.config.concurrency_limit) as f64;
        let mut swing = 0.0;
        for (h, price) in self.prices.iter().enumerate() {
            if self.restricted[h] {
                swing += self.config.restricted_penalty.abs() * n as f64;
                continue;
            }
            for (appliance, preference) in self.appliances.iter().zip(&self.preferences) {
                swing += appliance.power * price
                    + preference.avoid_penalty.abs()
                    + preference.preferred_bonus.abs();
            }
            swing += self.config.concurrency_penalty.abs() * excess;
        }
        swing
    }

    pub fn reset(&mut self) -> Observation {
        self.current_hour = 0;
        for (remaining, appliance) in self.remaining.iter_mut().zip(&self.appliances) {
            *remaining = appliance.duration;
        }
        self.observation()
    }

    pub fn observation(&self) -> Observation {
        Observation {
            hour: self.current_hour,
            horizon: self.prices.len(),
            pending: self.remaining.iter().map(|r| *r > 0).collect(),
        }
    }

    pub fn horizon(&self) -> usize {
        self.prices.len()
    }

    pub fn n_appliances(&self) -> usize {
        self.appliances.len()
    }

    pub fn appliances(&self) -> &[Appliance] {
        &self.appliances
    }

    pub fn current_hour(&self) -> usize {
        self.current_hour
    }

    pub fn remaining(&self) -> &[usize] {
        &self.remaining
    }

    /// Terminal penalty charged per unmet appliance-hour
    pub fn unmet_penalty(&self) -> f64 {
        self.unmet_penalty
    }

    pub fn is_done(&self) -> bool {
        self.current_hour >= self.prices.len() || self.remaining.iter().all(|r| *r == 0)
    }

    /// Apply one run/no-run decision per appliance for the current hour.
    pub fn step(&mut self, action: &[bool]) -> Result<StepResult> {
        if action.len() != self.appliances.len() {
            return Err(SchedulingError::malformed(format!(
                "action has {} entries, environment has {} appliances",
                action.len(),
                self.appliances.len()
            )));
        }
        if self.is_done() {
            return Err(SchedulingError::malformed("step called on a finished episode"));
        }

        let hour = self.current_hour;
        let mut breakdown = RewardBreakdown::default();
        let mut appliance_rewards = vec![0.0; self.appliances.len()];

        if self.restricted[hour] {
            for (i, run) in action.iter().enumerate() {
                if *run {
                    breakdown.restricted_penalty += self.config.restricted_penalty;
                    appliance_rewards[i] -= self.config.restricted_penalty;
                }
            }
        } else {
            let price = self.prices[hour];
            let mut active = Vec::with_capacity(action.len());
            for (i, run) in action.iter().enumerate() {
                if !*run || self.remaining[i] == 0 {
                    continue;
                }
                let energy = self.appliances[i].power * price;
                let comfort = self.preferences[i].hourly_penalty(hour);
                breakdown.energy_cost += energy;
                breakdown.comfort_penalty += comfort;
                appliance_rewards[i] -= energy + comfort;
                self.remaining[i] -= 1;
                active.push(i);
            }
            if active.len() > self.config.concurrency_limit {
                breakdown.concurrency_penalty = self.config.concurrency_penalty
                    * (active.len() - self.config.concurrency_limit) as f64;
                let share = breakdown.concurrency_penalty / active.len() as f64;
                for &i in &active {
                    appliance_rewards[i] -= share;
                }
            }
        }

        self.current_hour += 1;
        let done = self.is_done();
        if done {
            for (i, remaining) in self.remaining.iter().enumerate() {
                let penalty = self.unmet_penalty * *remaining as f64;
                breakdown.terminal_penalty += penalty;
                appliance_rewards[i] -= penalty;
            }
        }

        Ok(StepResult {
            observation: self.observation(),
            reward: breakdown.reward(),
            appliance_rewards,
            done,
            breakdown,
        })
    }
}
