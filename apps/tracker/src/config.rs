use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use trip_engine::EngineConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// UDP address the sensor bridge sends datagrams to.
    pub bind_addr: String,
    /// Defaults to `<data dir>/trip-tracker/trips.ndjson`.
    pub store_path: Option<PathBuf>,
    /// Sync is disabled when unset.
    pub sync_endpoint: Option<String>,
    pub connectivity_probe_ms: u64,
    pub engine: EngineConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:47800".into(),
            store_path: None,
            sync_endpoint: None,
            connectivity_probe_ms: 15_000,
            engine: EngineConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let config: TrackerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parse {}", path.display()))?;
        Ok(config)
    }

    pub fn store_path(&self) -> PathBuf {
        match &self.store_path {
            Some(p) => p.clone(),
            None => dirs_next::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("trip-tracker")
                .join("trips.ndjson"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!("{}.yaml", uuid::Uuid::new_v4()));
        let c = TrackerConfig::load(&path).unwrap();
        assert_eq!(c.bind_addr, "0.0.0.0:47800");
        assert!(c.sync_endpoint.is_none());
        assert!(c.store_path().ends_with("trip-tracker/trips.ndjson"));
    }

    #[test]
    fn test_nested_engine_section() {
        let path = std::env::temp_dir().join(format!("{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "sync_endpoint: https://fleet.example/api/trips\nengine:\n  vehicle_id: truck-9\n  motion_threshold: 1.5\n",
        )
        .unwrap();
        let c = TrackerConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(c.engine.vehicle_id, "truck-9");
        assert_eq!(c.engine.motion_threshold, 1.5);
        assert_eq!(c.engine.min_moving_time_ms, 30_000);
        assert_eq!(c.sync_endpoint.as_deref(), Some("https://fleet.example/api/trips"));
    }
}
