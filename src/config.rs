//! Engine configuration.
//!
//! Resolution priority: CLI `--config` → `SPRITECOOK_CONFIG` env var → defaults.
//! Files are JSON; missing keys fall back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Result cache entries kept per node
pub const DEFAULT_CACHE_CAPACITY: usize = 16;
/// Simulation step in milliseconds (one 60 Hz frame)
pub const DEFAULT_SIM_STEP: f64 = 1000.0 / 60.0;
/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "SPRITECOOK_CONFIG";

/// How a cook job hands control back to the host between node cooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YieldMode {
    /// `std::thread::yield_now` between nodes
    #[default]
    Thread,
    /// Never yield (tests, batch cooking)
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_capacity: usize,
    /// Default `step` for new simulation nodes, ms
    pub sim_step: f64,
    pub yield_mode: YieldMode,
    /// Cancel the running job when a new cook is requested
    pub supersede_running: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            sim_step: DEFAULT_SIM_STEP,
            yield_mode: YieldMode::default(),
            supersede_running: true,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config.sanitized())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Load from the CLI path, else from `SPRITECOOK_CONFIG`, else defaults.
    pub fn from_env_and_cli(cli_path: Option<PathBuf>) -> Result<Self> {
        let path = cli_path.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));
        match path {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    fn sanitized(mut self) -> Self {
        self.cache_capacity = self.cache_capacity.max(1);
        if !(self.sim_step.is_finite() && self.sim_step > 0.0) {
            log::warn!("Invalid sim_step {}, using default", self.sim_step);
            self.sim_step = DEFAULT_SIM_STEP;
        }
        self
    }
}
