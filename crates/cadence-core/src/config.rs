//! Engine configuration.
//!
//! Loaded from JSON. Every field has a default, so a partial file such as
//! `{"max_concurrency": 8}` is valid.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, Result},
    retry::RetryConfig,
};

/// Tunables of the scheduler and retry handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Steps of one group that may run at the same time
    pub max_concurrency: usize,
    /// How often a running plan checks for cancellation and pause
    pub poll_interval_ms: u64,
    /// How long a run may go without a heartbeat before another process may
    /// take the plan over. Must be longer than `poll_interval_ms`, which is
    /// also the heartbeat period.
    pub lease_ttl_ms: u64,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            poll_interval_ms: 250,
            lease_ttl_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads and validates a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::FileSystem {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| EngineError::Configuration {
            message: format!("Invalid configuration in {}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` if given, otherwise the XDG config file if one
    /// exists, otherwise the defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) => {
                    log::debug!("Loading configuration from {}", path.display());
                    Self::load(path)
                }
                None => Ok(Self::default()),
            },
        }
    }

    /// `$XDG_CONFIG_HOME/cadence/config.json`, if it exists.
    pub fn default_path() -> Option<PathBuf> {
        xdg::BaseDirectories::with_prefix("cadence").find_config_file("config.json")
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(EngineError::invalid_input(
                "max_concurrency",
                "must be at least 1",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(EngineError::invalid_input(
                "poll_interval_ms",
                "must be positive",
            ));
        }
        if self.lease_ttl_ms <= self.poll_interval_ms {
            return Err(EngineError::invalid_input(
                "lease_ttl_ms",
                "must be longer than poll_interval_ms",
            ));
        }
        self.retry.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::retry::BackoffKind;

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_concurrency": 8, "retry": {{"backoff": "fixed", "base_delay_ms": 10}}}}"#
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.lease_ttl(), Duration::from_secs(30));
        assert_eq!(config.retry.backoff, BackoffKind::Fixed);
        assert_eq!(config.retry.base_delay_ms, 10);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_concurrency": 0}}"#).unwrap();
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(EngineError::InvalidInput { .. })
        ));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"poll_interval_ms": 500, "lease_ttl_ms": 500}}"#).unwrap();
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(EngineError::InvalidInput { ref field, .. }) if field == "lease_ttl_ms"
        ));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(EngineError::Configuration { .. })
        ));

        assert!(matches!(
            EngineConfig::load("/nonexistent/cadence/config.json"),
            Err(EngineError::FileSystem { .. })
        ));
    }
}
