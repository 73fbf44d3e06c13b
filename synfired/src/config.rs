//! Daemon configuration
//!
//! Loaded from `config.json` in the platform data directory when present;
//! every field falls back to a default, so a partial file is fine.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("could not determine a platform data directory")]
    NoDataDir,
    #[error("config i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

fn default_addr() -> String {
    "127.0.0.1:9877".to_string()
}

fn default_target_fps() -> u32 {
    20
}

fn default_seed() -> u64 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address the TCP listener binds to.
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Tick rate of the free-running loop while started.
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// Seed for the auto-pilot wander policy.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub world: WorldConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            target_fps: default_target_fps(),
            seed: default_seed(),
            world: WorldConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Reads the config file if it exists, otherwise returns defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, DaemonError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.target_fps == 0 || self.target_fps > 1000 {
            return Err(DaemonError::Invalid("target_fps must be in 1..=1000"));
        }
        self.world.validate()
    }
}

fn default_extent() -> f64 {
    300.0
}

fn default_dispersion() -> f64 {
    70.0
}

fn default_increment() -> f64 {
    2.0
}

/// World geometry and agent kinematics. Defaults mirror the classic
/// three-object smell world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_extent")]
    pub width: f64,
    #[serde(default = "default_extent")]
    pub height: f64,
    /// Radius at which an entity's smell decays to zero.
    #[serde(default = "default_dispersion")]
    pub dispersion: f64,
    /// Distance covered per tick at full straight drive.
    #[serde(default = "default_increment")]
    pub straight_increment: f64,
    /// Degrees turned per tick at full left or right drive.
    #[serde(default = "default_increment")]
    pub turn_increment: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_extent(),
            height: default_extent(),
            dispersion: default_dispersion(),
            straight_increment: default_increment(),
            turn_increment: default_increment(),
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), DaemonError> {
        if !(self.width.is_finite() && self.width > 0.0)
            || !(self.height.is_finite() && self.height > 0.0)
        {
            return Err(DaemonError::Invalid("world extents must be finite and > 0"));
        }
        if !(self.dispersion.is_finite() && self.dispersion > 0.0) {
            return Err(DaemonError::Invalid("dispersion must be finite and > 0"));
        }
        if !self.straight_increment.is_finite() || !self.turn_increment.is_finite() {
            return Err(DaemonError::Invalid("movement increments must be finite"));
        }
        Ok(())
    }
}
