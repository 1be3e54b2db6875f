//! Parametric run/no-run policy
//!
//! One logistic unit per appliance over a feature vector of
//! `[one-hot(hour) ; pending flags ; 1]`. Input and output sizes follow the
//! horizon and appliance count the policy was built for.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulingError};
use crate::simulation::Observation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPolicy {
    n_appliances: usize,
    horizon: usize,
    /// Row-major, one row of `feature_dim()` weights per appliance
    weights: Vec<f64>,
}

impl LinearPolicy {
    /// All-zero weights: every appliance runs with probability 0.5 and the
    /// greedy rollout runs everything as early as possible.
    pub fn new(n_appliances: usize, horizon: usize) -> Self {
        let feature_dim = horizon + n_appliances + 1;
        Self {
            n_appliances,
            horizon,
            weights: vec![0.0; n_appliances * feature_dim],
        }
    }

    /// Starting point for training. Each appliance's hour weights encode a
    /// run probability of `duration / hours_left`, so sampled episodes spread
    /// their runs over the whole horizon instead of bunching at hour 0.
    /// Probabilities are kept inside `[floor, 1 - floor]`.
    pub fn exploratory(horizon: usize, durations: &[usize], floor: f64) -> Self {
        let mut policy = Self::new(durations.len(), horizon);
        let dim = policy.feature_dim();
        for (a, duration) in durations.iter().enumerate() {
            for h in 0..horizon {
                let p = (*duration as f64 / (horizon - h) as f64).clamp(floor, 1.0 - floor);
                policy.weights[a * dim + h] = (p / (1.0 - p)).ln();
            }
        }
        policy
    }

    pub fn n_appliances(&self) -> usize {
        self.n_appliances
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn feature_dim(&self) -> usize {
        self.horizon + self.n_appliances + 1
    }

    pub fn set_bias(&mut self, appliance: usize, value: f64) {
        let dim = self.feature_dim();
        self.weights[appliance * dim + dim - 1] = value;
    }

    pub fn features(&self, obs: &Observation) -> Result<Vec<f64>> {
        if obs.horizon != self.horizon || obs.pending.len() != self.n_appliances {
            return Err(SchedulingError::malformed(format!(
                "policy built for {} appliances over {} hours, observation has {} over {}",
                self.n_appliances,
                self.horizon,
                obs.pending.len(),
                obs.horizon
            )));
        }
        let mut phi = vec![0.0; self.feature_dim()];
        if obs.hour < self.horizon {
            phi[obs.hour] = 1.0;
        }
        for (i, pending) in obs.pending.iter().enumerate() {
            if *pending {
                phi[self.horizon + i] = 1.0;
            }
        }
        phi[self.feature_dim() - 1] = 1.0;
        Ok(phi)
    }

    fn logits(&self, phi: &[f64]) -> Vec<f64> {
        self.weights
            .chunks_exact(phi.len())
            .map(|row| row.iter().zip(phi).map(|(w, x)| w * x).sum())
            .collect()
    }

    /// Run probability per appliance
    pub fn probabilities(&self, phi: &[f64]) -> Vec<f64> {
        self.logits(phi).into_iter().map(sigmoid).collect()
    }

    /// Deterministic action: run when the run probability is at least 0.5.
    pub fn greedy_action(&self, obs: &Observation) -> Result<Vec<bool>> {
        let phi = self.features(obs)?;
        Ok(self.logits(&phi).into_iter().map(|z| z >= 0.0).collect())
    }

    /// Draw one action per appliance with run probabilities clamped to
    /// `[floor, 1 - floor]`; returns the actions and the clamped
    /// probabilities they were drawn with.
    pub fn sample_action<R: Rng + ?Sized>(
        &self,
        phi: &[f64],
        floor: f64,
        rng: &mut R,
    ) -> (Vec<bool>, Vec<f64>) {
        let probs: Vec<f64> = self
            .probabilities(phi)
            .into_iter()
            .map(|p| p.clamp(floor, 1.0 - floor))
            .collect();
        let actions = probs.iter().map(|p| rng.gen_bool(*p)).collect();
        (actions, probs)
    }

    /// Gradient of `log pi(actions | phi)`, each appliance's row weighted by
    /// its own advantage, accumulated into `grad`.
    pub fn accumulate_log_prob_grad(
        &self,
        phi: &[f64],
        actions: &[bool],
        probs: &[f64],
        advantages: &[f64],
        grad: &mut [f64],
    ) {
        let dim = phi.len();
        let rows = actions.iter().zip(probs).zip(advantages).enumerate();
        for (a, ((action, p), advantage)) in rows {
            let coeff = advantage * (if *action { 1.0 } else { 0.0 } - p);
            if coeff == 0.0 {
                continue;
            }
            for (g, x) in grad[a * dim..(a + 1) * dim].iter_mut().zip(phi) {
                *g += coeff * x;
            }
        }
    }

    /// Gradient of the summed Bernoulli entropy, scaled by `weight`.
    /// For logit `z` and probability `p` it is `-z * p * (1 - p)`.
    pub fn accumulate_entropy_grad(&self, phi: &[f64], weight: f64, grad: &mut [f64]) {
        if weight == 0.0 {
            return;
        }
        let dim = phi.len();
        for (a, z) in self.logits(phi).into_iter().enumerate() {
            let p = sigmoid(z);
            let coeff = -weight * z * p * (1.0 - p);
            for (g, x) in grad[a * dim..(a + 1) * dim].iter_mut().zip(phi) {
                *g += coeff * x;
            }
        }
    }

    /// Gradient ascent step, with the update clipped to `max_norm`.
    pub fn apply_gradient(&mut self, grad: &[f64], learning_rate: f64, max_norm: f64) {
        let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
        if !norm.is_finite() || norm == 0.0 {
            return;
        }
        let scale = if norm > max_norm { max_norm / norm } else { 1.0 };
        for (w, g) in self.weights.iter_mut().zip(grad) {
            *w += learning_rate * scale * g;
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len()
    }

    /// Weight count matches the declared dimensions and every weight is finite.
    pub(crate) fn is_consistent(&self) -> bool {
        self.weights.len() == self.n_appliances * self.feature_dim()
            && self.weights.iter().all(|w| w.is_finite())
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
