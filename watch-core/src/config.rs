use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub scheduler: SchedulerSettings,
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub default_interval_seconds: u64,
    /// Shortest sleep the scheduler will honour between cycles.
    pub min_interval_seconds: u64,
    pub error_backoff_seconds: u64,
    pub no_change_notify_floor_seconds: u64,
    pub display_utc_offset_hours: i32,
    pub event_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub request_timeout_seconds: u64,
    pub retry_attempts: u8,
    pub retry_backoff_ms: u64,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            default_interval_seconds: 3600,
            min_interval_seconds: 60,
            error_backoff_seconds: 60,
            no_change_notify_floor_seconds: 3600,
            display_utc_offset_hours: 3,
            event_buffer: 64,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            retry_attempts: 3,
            retry_backoff_ms: 500,
            user_agent: format!("pagewatch/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 5,
        }
    }
}

impl SchedulerSettings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_seconds)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_seconds)
    }

    /// Fixed display offset; out-of-range hours fall back to UTC.
    pub fn display_offset(&self) -> FixedOffset {
        self.display_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

impl WatchConfig {
    /// `<config_dir>/pagewatch/config.json`
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("pagewatch").join("config.json"))
    }

    /// Loads the user's configuration, or writes and returns the defaults.
    pub fn load() -> Self {
        match Self::config_file_path() {
            Ok(path) => Self::load_or_init(&path),
            Err(e) => {
                warn!(error = %e, "no config location, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_or_init(path: &Path) -> Self {
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "could not load config, using defaults");
                let default_config = Self::default();
                if let Err(save_err) = default_config.save_to(path) {
                    warn!(error = %save_err, path = %path.display(), "could not save default config");
                }
                default_config
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Atomic write: temp file then rename.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "pagewatch_{tag}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        dir
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: WatchConfig =
            serde_json::from_str(r#"{ "scheduler": { "min_interval_seconds": 5 } }"#).unwrap();
        assert_eq!(config.scheduler.min_interval_seconds, 5);
        assert_eq!(config.scheduler.no_change_notify_floor_seconds, 3600);
        assert_eq!(config.retrieval, RetrievalSettings::default());
    }

    #[test]
    fn display_offset_defaults_to_utc_plus_three() {
        let offset = SchedulerSettings::default().display_offset();
        assert_eq!(offset.local_minus_utc(), 3 * 3600);

        let bogus = SchedulerSettings {
            display_utc_offset_hours: 99,
            ..SchedulerSettings::default()
        };
        assert_eq!(bogus.display_offset().local_minus_utc(), 0);
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = temp_dir("cfg");
        let path = dir.join("config.json");

        let loaded = WatchConfig::load_or_init(&path);
        assert_eq!(loaded, WatchConfig::default());
        assert!(path.exists());
        assert_eq!(WatchConfig::load_from_file(&path).unwrap(), loaded);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupted_file_falls_back_to_defaults() {
        let dir = temp_dir("cfg_corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert_eq!(WatchConfig::load_or_init(&path), WatchConfig::default());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
