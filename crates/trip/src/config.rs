use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for one tracked vehicle. Every field has a default, so a
/// config file only needs to name what it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub vehicle_id: String,
    pub user_id: String,
    /// Peak linear acceleration (m/s²) above which a tick counts as moving.
    pub motion_threshold: f64,
    pub sampling_interval_ms: u64,
    pub min_stationary_time_ms: u64,
    pub min_moving_time_ms: u64,
    /// Samples per classification window.
    pub window_size: usize,
    /// Classifications kept by the stabilizer.
    pub history_length: usize,
    pub sync_interval_ms: u64,
    pub sync_timeout_ms: u64,
    /// Older location fixes are not attached to trip points.
    pub location_max_age_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vehicle_id: "unassigned".into(),
            user_id: "unassigned".into(),
            motion_threshold: 1.2,
            sampling_interval_ms: 1_000,
            min_stationary_time_ms: 120_000,
            min_moving_time_ms: 30_000,
            window_size: 100,
            history_length: analysis::DEFAULT_HISTORY_LENGTH,
            sync_interval_ms: 60_000,
            sync_timeout_ms: 10_000,
            location_max_age_ms: 30_000,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(contents).context("parse engine config")?;
        Ok(config)
    }
}
