//! Background training coordination
//!
//! Only one training run may be active at a time. The run executes on the
//! blocking pool and reports progress into a shared status that callers
//! poll; the trained policy is saved and then installed for the learned
//! strategy to pick up.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::join_error;
use crate::domain::SchedulingContext;
use crate::error::{Result, SchedulingError};
use crate::ml::{PolicyHandle, PolicyTrainer, TrainingConfig};
use crate::simulation::EnvironmentConfig;

/// Training status, as seen by pollers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingStatus {
    pub is_training: bool,
    /// Fraction of the episode budget completed, 0.0-1.0
    pub progress: f64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub policy_id: Option<Uuid>,
}

/// Clears `is_training` however the run ends, including cancellation.
struct TrainingGuard {
    status: Arc<Mutex<TrainingStatus>>,
}

impl Drop for TrainingGuard {
    fn drop(&mut self) {
        let mut status = self.status.lock();
        status.is_training = false;
        status.last_run = Some(Utc::now());
    }
}

pub struct TrainingCoordinator {
    trainer_config: TrainingConfig,
    env_config: EnvironmentConfig,
    policy_path: Option<PathBuf>,
    status: Arc<Mutex<TrainingStatus>>,
    policy: RwLock<Option<Arc<PolicyHandle>>>,
}

impl TrainingCoordinator {
    pub fn new(
        trainer_config: TrainingConfig,
        env_config: EnvironmentConfig,
        policy_path: Option<PathBuf>,
    ) -> Self {
        Self {
            trainer_config,
            env_config,
            policy_path,
            status: Arc::new(Mutex::new(TrainingStatus::default())),
            policy: RwLock::new(None),
        }
    }

    pub fn status(&self) -> TrainingStatus {
        self.status.lock().clone()
    }

    pub fn env_config(&self) -> &EnvironmentConfig {
        &self.env_config
    }

    pub async fn current_policy(&self) -> Option<Arc<PolicyHandle>> {
        self.policy.read().await.clone()
    }

    pub async fn install_policy(&self, handle: PolicyHandle) -> Arc<PolicyHandle> {
        let handle = Arc::new(handle);
        self.status.lock().policy_id = Some(handle.metadata.policy_id);
        *self.policy.write().await = Some(handle.clone());
        handle
    }

    /// Install the policy saved at the configured path, if there is one.
    pub async fn load_saved_policy(&self) -> Result<Option<Arc<PolicyHandle>>> {
        let Some(path) = self.policy_path.clone() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let handle = tokio::task::spawn_blocking(move || PolicyHandle::load(path))
            .await
            .map_err(join_error)??;
        Ok(Some(self.install_policy(handle).await))
    }

    /// Train and wait for the result.
    pub async fn train(&self, ctx: SchedulingContext) -> Result<Arc<PolicyHandle>> {
        let guard = self.begin()?;
        self.run(guard, ctx).await
    }

    /// Start training in the background and return immediately. Overlapping
    /// requests are rejected before anything is spawned.
    pub fn spawn_training(
        self: &Arc<Self>,
        ctx: SchedulingContext,
    ) -> Result<JoinHandle<Result<Arc<PolicyHandle>>>> {
        let guard = self.begin()?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.run(guard, ctx).await }))
    }

    fn begin(&self) -> Result<TrainingGuard> {
        let mut status = self.status.lock();
        if status.is_training {
            warn!("training request rejected, a run is already in progress");
            return Err(SchedulingError::TrainingInProgress);
        }
        status.is_training = true;
        status.progress = 0.0;
        status.last_error = None;
        Ok(TrainingGuard {
            status: Arc::clone(&self.status),
        })
    }

    async fn run(&self, _guard: TrainingGuard, ctx: SchedulingContext) -> Result<Arc<PolicyHandle>> {
        let trainer = PolicyTrainer::new(self.trainer_config.clone(), self.env_config.clone());
        let status = Arc::clone(&self.status);
        let policy_path = self.policy_path.clone();

        info!(episodes = self.trainer_config.episodes, "training started");
        let outcome = tokio::task::spawn_blocking(move || {
            let handle = trainer.train_with_progress(&ctx, |p| {
                status.lock().progress = p.fraction();
            })?;
            if let Some(path) = policy_path {
                handle.save(path)?;
            }
            Ok::<_, SchedulingError>(handle)
        })
        .await
        .map_err(join_error)
        .and_then(|r| r);

        match outcome {
            Ok(handle) => {
                self.status.lock().progress = 1.0;
                let handle = self.install_policy(handle).await;
                info!(policy_id = %handle.metadata.policy_id, "training finished");
                Ok(handle)
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "training failed");
                self.status.lock().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}
