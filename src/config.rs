use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{PricingError, Result};

fn default_alpha() -> f64 {
    0.1
}

fn default_gamma() -> f64 {
    0.9
}

fn default_epsilon() -> f64 {
    0.1
}

fn default_discount_levels() -> Vec<f64> {
    vec![0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0]
}

const fn default_episodes() -> usize {
    1000
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("data/dynamic_pricing_dataset.csv")
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/q_table.safetensors")
}

fn default_addr() -> String {
    "127.0.0.1:5000".to_string()
}

/// Hyper-parameters of the Q-learning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Learning rate, 0 < alpha <= 1.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Discount factor, 0 <= gamma <= 1.
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Exploration rate, 0 <= epsilon <= 1.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Discount percentages; the position of a level is its action index.
    #[serde(default = "default_discount_levels")]
    pub discount_levels: Vec<f64>,
    #[serde(default = "default_episodes")]
    pub episodes: usize,
    /// Fixed RNG seed. `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            gamma: default_gamma(),
            epsilon: default_epsilon(),
            discount_levels: default_discount_levels(),
            episodes: default_episodes(),
            seed: None,
        }
    }
}

impl AgentConfig {
    pub fn actions(&self) -> usize {
        self.discount_levels.len()
    }

    pub fn validate(&self) -> Result<()> {
        // Written as negated ranges so NaN is rejected too.
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(PricingError::Config(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if !(self.gamma >= 0.0 && self.gamma <= 1.0) {
            return Err(PricingError::Config(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if !(self.epsilon >= 0.0 && self.epsilon <= 1.0) {
            return Err(PricingError::Config(format!(
                "epsilon must be in [0, 1], got {}",
                self.epsilon
            )));
        }
        if self.discount_levels.is_empty() {
            return Err(PricingError::Config(
                "at least one discount level is required".into(),
            ));
        }
        if let Some(level) = self
            .discount_levels
            .iter()
            .find(|level| !(level.is_finite() && **level >= 0.0))
        {
            return Err(PricingError::Config(format!(
                "discount levels must be finite and non-negative, got {level}"
            )));
        }
        if self.episodes == 0 {
            return Err(PricingError::Config("episodes must be at least 1".into()));
        }
        Ok(())
    }
}

/// What to do with catalog rows whose `daily_sales` cannot be divided by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroSalesPolicy {
    #[default]
    Abort,
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    #[serde(default)]
    pub zero_sales: ZeroSalesPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog: PathBuf,
    #[serde(default = "default_model_path")]
    pub model: PathBuf,
    /// Per-episode training metrics CSV; skipped when unset.
    #[serde(default)]
    pub metrics: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog_path(),
            model: default_model_path(),
            metrics: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Reads and validates a YAML config file. A missing or malformed file is fatal.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| {
            PricingError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let config = Self::from_yaml(&content).map_err(|err| match err {
            PricingError::Config(msg) => {
                PricingError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(content)
            .map_err(|err| PricingError::Config(format!("invalid YAML: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.agent.validate()?;
        if self.server.addr.trim().is_empty() {
            return Err(PricingError::Config("server.addr must not be empty".into()));
        }
        Ok(())
    }
}
