//! Configuration loading for the datasync engine.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `DATASYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration derived from `DATASYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub sync: SyncRunConfig,
}

/// Per-run bounds applied by the execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncRunConfig {
    /// Upper bound in seconds for one source fetch (default: 60).
    ///
    /// A timed-out fetch finalizes the run as `error` with a `system` entry.
    ///
    /// Environment variable: `DATASYNC_SYNC_FETCH_TIMEOUT_SECONDS`
    #[serde(default = "default_sync_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,

    /// Upper bound in seconds for each target-store call (default: 10).
    ///
    /// A timed-out store call fails that record with a `system` entry and
    /// processing continues.
    ///
    /// Environment variable: `DATASYNC_SYNC_STORE_TIMEOUT_SECONDS`
    #[serde(default = "default_sync_store_timeout_seconds")]
    pub store_timeout_seconds: u64,

    /// Maximum sample identifiers kept per error class (default: 5).
    ///
    /// Environment variable: `DATASYNC_SYNC_ERROR_EXAMPLE_LIMIT`
    #[serde(default = "default_sync_error_example_limit")]
    pub error_example_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            sync: SyncRunConfig::default(),
        }
    }
}

impl Default for SyncRunConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_seconds: default_sync_fetch_timeout_seconds(),
            store_timeout_seconds: default_sync_store_timeout_seconds(),
            error_example_limit: default_sync_error_example_limit(),
        }
    }
}

impl AppConfig {
    /// Validate configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync.validate()
    }
}

impl SyncRunConfig {
    /// Validate sync run bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_seconds == 0 || self.fetch_timeout_seconds > 3600 {
            return Err(ConfigError::InvalidFetchTimeout {
                value: self.fetch_timeout_seconds,
            });
        }
        if self.store_timeout_seconds == 0 || self.store_timeout_seconds > 600 {
            return Err(ConfigError::InvalidStoreTimeout {
                value: self.store_timeout_seconds,
            });
        }
        if self.error_example_limit == 0 || self.error_example_limit > 50 {
            return Err(ConfigError::InvalidErrorExampleLimit {
                value: self.error_example_limit,
            });
        }
        Ok(())
    }
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file {path}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("invalid fetch timeout {value}; expected 1..=3600 seconds")]
    InvalidFetchTimeout { value: u64 },
    #[error("invalid store timeout {value}; expected 1..=600 seconds")]
    InvalidStoreTimeout { value: u64 },
    #[error("invalid error example limit {value}; expected 1..=50")]
    InvalidErrorExampleLimit { value: usize },
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_sync_fetch_timeout_seconds() -> u64 {
    60
}

fn default_sync_store_timeout_seconds() -> u64 {
    10
}

fn default_sync_error_example_limit() -> usize {
    5
}

/// Loads configuration using layered `.env` files and `DATASYNC_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration: `.env`, `.env.local`, profile-specific files,
    /// then the process environment, which wins.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("DATASYNC_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);

        let fetch_timeout_seconds = layered
            .remove("SYNC_FETCH_TIMEOUT_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_sync_fetch_timeout_seconds);
        let store_timeout_seconds = layered
            .remove("SYNC_STORE_TIMEOUT_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_sync_store_timeout_seconds);
        let error_example_limit = layered
            .remove("SYNC_ERROR_EXAMPLE_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_sync_error_example_limit);

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            sync: SyncRunConfig {
                fetch_timeout_seconds,
                store_timeout_seconds,
                error_example_limit,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("DATASYNC_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("DATASYNC_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.fetch_timeout_seconds, 60);
        assert_eq!(config.sync.store_timeout_seconds, 10);
        assert_eq!(config.sync.error_example_limit, 5);
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let config = SyncRunConfig {
            fetch_timeout_seconds: 0,
            ..SyncRunConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFetchTimeout { value: 0 })
        ));

        let config = SyncRunConfig {
            store_timeout_seconds: 0,
            ..SyncRunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn example_limit_bounds_are_enforced() {
        let config = SyncRunConfig {
            error_example_limit: 51,
            ..SyncRunConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidErrorExampleLimit { value: 51 })
        ));
    }
}
