//! Sync engine configuration.
//!
//! Layered the usual way: defaults, then an optional TOML file, then
//! environment overrides (`STRATA_SYNC_*`), then validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// How the store syncs with the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Background loop drains the outbox on an interval.
    Auto,
    /// Queue only; an operator triggers `run_once` explicitly.
    Manual,
    /// Queue only; never deliver. For stores with no upstream at all.
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub mode: SyncMode,
    /// Seconds between outbox polls in auto mode.
    pub interval_secs: u64,
    /// Maximum entries per delivery batch.
    pub batch_size: i64,
    /// Entries with this many failed attempts are parked until an
    /// operator intervenes.
    pub max_attempts: i64,
    /// Synced entries older than this are deleted by the cleanup pass.
    pub cleanup_after_days: i64,
    /// Upstream endpoint, unused in manual/offline mode.
    pub endpoint: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            mode: SyncMode::Auto,
            interval_secs: 30,
            batch_size: 100,
            max_attempts: 10,
            cleanup_after_days: 30,
            endpoint: None,
        }
    }
}

impl SyncConfig {
    /// Loads from a TOML file, applies env overrides, validates.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SyncError::Config(format!("cannot read config file: {e}")))?;
        let mut config = Self::from_toml(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> SyncResult<Self> {
        toml::from_str(raw).map_err(|e| SyncError::Config(format!("invalid config: {e}")))
    }

    /// `STRATA_SYNC_MODE`, `STRATA_SYNC_INTERVAL_SECS`,
    /// `STRATA_SYNC_ENDPOINT` override the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("STRATA_SYNC_MODE") {
            match mode.as_str() {
                "auto" => self.mode = SyncMode::Auto,
                "manual" => self.mode = SyncMode::Manual,
                "offline" => self.mode = SyncMode::Offline,
                _ => {}
            }
        }
        if let Ok(secs) = std::env::var("STRATA_SYNC_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                self.interval_secs = secs;
            }
        }
        if let Ok(endpoint) = std::env::var("STRATA_SYNC_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.interval_secs == 0 {
            return Err(SyncError::Config("interval_secs must be > 0".into()));
        }
        if self.batch_size <= 0 {
            return Err(SyncError::Config("batch_size must be > 0".into()));
        }
        if self.max_attempts <= 0 {
            return Err(SyncError::Config("max_attempts must be > 0".into()));
        }
        if self.mode == SyncMode::Auto && self.endpoint.is_none() {
            return Err(SyncError::Config(
                "auto mode requires an endpoint".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = SyncConfig::default();
        assert_eq!(config.mode, SyncMode::Auto);
        assert_eq!(config.interval_secs, 30);
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn partial_toml_fills_from_defaults() {
        let config = SyncConfig::from_toml(
            r#"
            mode = "manual"
            batch_size = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, SyncMode::Manual);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.interval_secs, 30);
    }

    #[test]
    fn auto_mode_requires_endpoint() {
        let config = SyncConfig::default();
        assert!(config.validate().is_err());

        let mut with_endpoint = SyncConfig::default();
        with_endpoint.endpoint = Some("https://hub.example.com/sync".into());
        assert!(with_endpoint.validate().is_ok());

        let mut offline = SyncConfig::default();
        offline.mode = SyncMode::Offline;
        assert!(offline.validate().is_ok());
    }

    #[test]
    fn zero_interval_rejected() {
        let mut config = SyncConfig::default();
        config.endpoint = Some("https://hub.example.com/sync".into());
        config.interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
