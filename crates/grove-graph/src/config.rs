//! Run configuration.
//!
//! Stored as `.grove/config.json` next to the code being indexed. A couple
//! of environment variables override the file so the CLI can be pointed at
//! another store without editing it.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = ".grove";
pub const CONFIG_FILE: &str = "config.json";
pub const ENV_STORE_PATH: &str = "GROVE_STORE_PATH";
pub const ENV_BATCH_SIZE: &str = "GROVE_BATCH_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory of the sled database.
    pub store_path: Option<PathBuf>,
    /// Facts per node/edge batch.
    pub batch_size: usize,
    /// Nodes or mappings handled per clone page.
    pub clone_page_size: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Branch used for fallback when a request does not name one.
    pub main_branch: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            batch_size: 500,
            clone_page_size: 500,
            max_attempts: 3,
            retry_delay_ms: 200,
            main_branch: None,
        }
    }
}

impl SyncConfig {
    /// Default configuration with the store under `root/.grove/db`.
    pub fn for_root(root: &Path) -> Self {
        Self {
            store_path: Some(root.join(CONFIG_DIR).join("db")),
            ..Self::default()
        }
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Reads a config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(io_err)
    }

    /// Applies `GROVE_STORE_PATH` and `GROVE_BATCH_SIZE`.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_STORE_PATH).filter(|p| !p.is_empty()) {
            self.store_path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_BATCH_SIZE,
                value,
            })?;
        }
        Ok(self)
    }

    /// Checks that a store can be opened with this configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_path.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
            return Err(ConfigError::MissingStorePath);
        }
        self.validate_sizes()
    }

    pub(crate) fn validate_sizes(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("batch_size", self.batch_size),
            ("clone_page_size", self.clone_page_size),
            ("max_attempts", self.max_attempts as usize),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidBatchSize { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay(), Duration::from_millis(200));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingStorePath)
        ));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = SyncConfig::default()
            .with_store_path("/tmp/grove")
            .with_batch_size(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBatchSize { name: "batch_size", .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_DIR).join(CONFIG_FILE);
        let mut config = SyncConfig::for_root(dir.path());
        config.main_branch = Some("main".into());
        config.save(&path).unwrap();

        let loaded = SyncConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"batch_size": 50}"#).unwrap();

        let loaded = SyncConfig::load(&path).unwrap();
        assert_eq!(loaded.batch_size, 50);
        assert_eq!(loaded.clone_page_size, 500);
    }

    #[test]
    fn test_env_overrides() {
        let config = SyncConfig::default()
            .apply_overrides(|var| match var {
                ENV_STORE_PATH => Some("/data/grove".into()),
                ENV_BATCH_SIZE => Some("25".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.store_path, Some(PathBuf::from("/data/grove")));
        assert_eq!(config.batch_size, 25);

        let err = SyncConfig::default()
            .apply_overrides(|var| (var == ENV_BATCH_SIZE).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}
