//! Learned Scheduler
//!
//! - [`training`]: policy-gradient trainer against the scheduling environment
//! - [`inference`]: deterministic rollout of a trained policy into a schedule
//! - [`policy`]: the parametric run/no-run policy itself
//!
//! A trained policy travels as a [`PolicyHandle`], which carries metadata
//! and can be saved to and loaded from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use uuid::Uuid;

use crate::domain::SchedulingContext;
use crate::error::{Result, SchedulingError};

pub mod inference;
pub mod policy;
pub mod training;

pub use inference::*;
pub use policy::LinearPolicy;
pub use training::*;

/// Policy Metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub policy_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub episodes: usize,
    /// Return of the greedy rollout that was kept; `None` until trained
    pub best_return: Option<f64>,
    pub appliance_names: Vec<String>,
    pub horizon: usize,
}

/// A trained policy plus what it was trained for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyHandle {
    pub metadata: PolicyMetadata,
    pub policy: LinearPolicy,
}

impl PolicyHandle {
    pub fn new(policy: LinearPolicy, metadata: PolicyMetadata) -> Self {
        Self { metadata, policy }
    }

    /// Untrained handle for a request, mostly for tests and warm starts.
    pub fn untrained(ctx: &SchedulingContext) -> Self {
        Self {
            metadata: PolicyMetadata {
                policy_id: Uuid::new_v4(),
                trained_at: Utc::now(),
                episodes: 0,
                best_return: None,
                appliance_names: ctx.appliances.iter().map(|a| a.name.clone()).collect(),
                horizon: ctx.horizon(),
            },
            policy: LinearPolicy::new(ctx.appliances.len(), ctx.horizon()),
        }
    }

    /// The policy's dimensions must match the request; differing appliance
    /// names are allowed but logged, since the policy is positional.
    pub fn check_compatible(&self, ctx: &SchedulingContext) -> Result<()> {
        if self.policy.n_appliances() != ctx.appliances.len() || self.policy.horizon() != ctx.horizon() {
            return Err(SchedulingError::malformed(format!(
                "policy {} was trained for {} appliances over {} hours, request has {} over {}",
                self.metadata.policy_id,
                self.policy.n_appliances(),
                self.policy.horizon(),
                ctx.appliances.len(),
                ctx.horizon()
            )));
        }
        let names_match = self
            .metadata
            .appliance_names
            .iter()
            .zip(&ctx.appliances)
            .all(|(trained, a)| *trained == a.name);
        if !names_match {
            tracing::warn!(
                policy_id = %self.metadata.policy_id,
                trained = ?self.metadata.appliance_names,
                "policy was trained for differently named appliances"
            );
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        tracing::info!(policy_id = %self.metadata.policy_id, path = %path.display(), "policy saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(fs::File::open(path)?);
        let handle: Self = serde_json::from_reader(reader)?;
        if !handle.policy.is_consistent()
            || handle.policy.n_appliances() != handle.metadata.appliance_names.len()
            || handle.policy.horizon() != handle.metadata.horizon
        {
            return Err(SchedulingError::Persistence(format!(
                "policy file {} has inconsistent dimensions",
                path.display()
            )));
        }
        tracing::info!(policy_id = %handle.metadata.policy_id, path = %path.display(), "policy loaded");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Appliance, Preferences, PriceSeries, RestrictedHours};
    use crate::simulation::EnvironmentConfig;

    fn ctx(n: usize, horizon: usize) -> SchedulingContext {
        SchedulingContext::new(
            PriceSeries::new(vec![0.1; horizon]).unwrap(),
            (0..n).map(|i| Appliance::new(format!("a{i}"), 1.0, 1)).collect(),
            RestrictedHours::new(),
            Preferences::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let handle = PolicyHandle::untrained(&ctx(2, 6));
        let path = std::env::temp_dir()
            .join(format!("ses-policy-{}", Uuid::new_v4()))
            .join("policy.json");
        handle.save(&path).unwrap();
        let loaded = PolicyHandle::load(&path).unwrap();
        assert_eq!(loaded.metadata.policy_id, handle.metadata.policy_id);
        assert_eq!(loaded.policy, handle.policy);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_trained_weights_survive_save_load_bit_for_bit() {
        let ctx = SchedulingContext::new(
            PriceSeries::new(vec![0.31, 0.27, 0.12, 0.093, 0.05, 0.17, 0.22, 0.4]).unwrap(),
            vec![Appliance::new("Washer", 1.3, 2), Appliance::new("Dryer", 2.7, 1)],
            RestrictedHours::new(),
            Preferences::new(),
        )
        .unwrap();
        let handle = PolicyTrainer::new(
            TrainingConfig::default().with_episodes(300).with_seed(5),
            EnvironmentConfig::default(),
        )
        .train(&ctx)
        .unwrap();

        let path = std::env::temp_dir().join(format!("ses-trained-{}.json", Uuid::new_v4()));
        handle.save(&path).unwrap();
        let loaded = PolicyHandle::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.policy, handle.policy);
        assert_eq!(loaded.metadata.best_return, handle.metadata.best_return);
    }

    #[test]
    fn test_load_missing_file() {
        let err = PolicyHandle::load("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.kind(), "PersistenceError");
    }

    #[test]
    fn test_load_rejects_truncated_weights() {
        let handle = PolicyHandle::untrained(&ctx(2, 6));
        let mut value = serde_json::to_value(&handle).unwrap();
        value["policy"]["weights"] = serde_json::json!([0.0, 0.0]);
        let path = std::env::temp_dir().join(format!("ses-truncated-{}.json", Uuid::new_v4()));
        fs::write(&path, value.to_string()).unwrap();
        let err = PolicyHandle::load(&path).unwrap_err();
        let _ = fs::remove_file(&path);
        assert_eq!(err.kind(), "PersistenceError");
    }

    #[test]
    fn test_compatibility() {
        let handle = PolicyHandle::untrained(&ctx(2, 6));
        assert!(handle.check_compatible(&ctx(2, 6)).is_ok());
        assert!(handle.check_compatible(&ctx(3, 6)).is_err());
        assert!(handle.check_compatible(&ctx(2, 8)).is_err());
    }
}
