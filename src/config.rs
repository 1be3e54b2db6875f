use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::comfort::ComfortConfig;
use crate::domain::ShortSeriesPolicy;
use crate::ml::TrainingConfig;
use crate::optimizer::OptimizerConfig;
use crate::simulation::EnvironmentConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub optimizer: OptimizerConfig,
    pub comfort: ComfortConfig,
    pub environment: EnvironmentConfig,
    pub trainer: TrainingConfig,
    pub prices: PricesConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricesConfig {
    pub horizon_hours: usize,
    pub short_series: ShortSeriesPolicy,
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            horizon_hours: 24,
            short_series: ShortSeriesPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Where the trained policy is saved after a training run
    pub policy_path: PathBuf,
    /// Substitute the exact schedule when the learned one is degenerate
    pub fallback_to_exact: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            policy_path: PathBuf::from("models/energy_agent_preferences.json"),
            fallback_to_exact: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SES__").split("__"));
        figment
            .extract()
            .with_context(|| format!("invalid configuration (file: {})", path.display()))
    }
}
