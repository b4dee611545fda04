//! Builder for creating and configuring Engine instances.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::task;

use super::Engine;
use crate::{
    config::EngineConfig,
    db::Database,
    dispatcher::{AgentRegistry, Dispatcher},
    error::{EngineError, Result},
    retry::RetryPolicy,
    scheduler::Scheduler,
    store::Store,
    validator::Validator,
};

/// Builder for creating and configuring Engine instances.
#[derive(Clone, Default)]
pub struct EngineBuilder {
    database_path: Option<PathBuf>,
    registry: Option<Arc<AgentRegistry>>,
    config: EngineConfig,
    retry: Option<RetryPolicy>,
    validator: Option<Validator>,
}

impl EngineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom database file path.
    ///
    /// If not specified, uses XDG Base Directory specification:
    /// `$XDG_DATA_HOME/cadence/cadence.db` or
    /// `~/.local/share/cadence/cadence.db`
    pub fn with_database_path<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        if let Some(path) = path {
            self.database_path = Some(path.as_ref().to_path_buf());
        }
        self
    }

    /// Handlers available to the dispatcher. Defaults to an empty registry.
    pub fn with_registry(mut self, registry: impl Into<Arc<AgentRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Replaces the whole configuration. Later `with_*` calls override it.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Heartbeat age after which another runner may take a plan over.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.config.lease_ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Uses an explicit retry policy instead of the one built from
    /// `config.retry`. This is the only way to install a custom classifier.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Builds the configured engine.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` if the configuration is invalid
    /// Returns `EngineError::FileSystem` if the database directory cannot be
    /// created
    /// Returns `EngineError::Database` if database initialization fails
    pub async fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let db_path = match self.database_path {
            Some(path) => path,
            None => Self::default_database_path()?,
        };

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::FileSystem {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let db_path_clone = db_path.clone();
        task::spawn_blocking(move || Database::new(&db_path_clone).map(drop))
            .await
            .map_err(EngineError::join)??;

        let store = Store::new(db_path);
        let dispatcher = Dispatcher::new(self.registry.unwrap_or_default());
        let policy = self.retry.unwrap_or_else(|| self.config.retry.policy());
        let scheduler = Scheduler::new(store.clone(), dispatcher.clone(), policy, &self.config);

        Ok(Engine {
            store,
            dispatcher,
            validator: Arc::new(self.validator.unwrap_or_default()),
            scheduler,
            config: self.config,
        })
    }

    /// Returns the default database path following XDG Base Directory
    /// specification.
    fn default_database_path() -> Result<PathBuf> {
        xdg::BaseDirectories::with_prefix("cadence")
            .place_data_file("cadence.db")
            .map_err(|e| EngineError::XdgDirectory(e.to_string()))
    }
}
