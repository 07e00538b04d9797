//! Engine Configuration
//!
//! Settings for where durable state lives and how steps are scheduled
//! and retried. Loaded from an optional YAML file; any field left out
//! takes its default, and command-line flags override the file.
//!
//! # Example
//!
//! ```yaml
//! backend: redb
//! db_path: state/engine.redb
//! workflow_id_path: state/workflow.id
//! max_parallel: 2
//! retry:
//!   max_attempts: 5
//!   initial_backoff_ms: 100
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::RetryPolicy;
use crate::store::{DurableStore, JsonFileStore, MemoryStore, RedbStore, StoreError};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown storage backend '{0}' (expected redb, json or memory)")]
    UnknownBackend(String),

    #[error("max_parallel must be at least 1")]
    InvalidParallelism,
}

/// Storage engine behind the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Embedded ReDB database
    #[default]
    Redb,
    /// Single JSON document
    Json,
    /// Process memory only; nothing survives a restart
    Memory,
}

impl Backend {
    /// Default file name for the backend's data.
    pub fn default_path(&self) -> &'static str {
        match self {
            Self::Redb => "engine.redb",
            Self::Json | Self::Memory => "engine.json",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Redb => "redb",
            Self::Json => "json",
            Self::Memory => "memory",
        };
        f.write_str(name)
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redb" => Ok(Self::Redb),
            "json" => Ok(Self::Json),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Storage engine
    pub backend: Backend,

    /// Store location; defaults per backend when unset
    pub db_path: Option<PathBuf>,

    /// Side file holding the workflow id across restarts
    pub workflow_id_path: PathBuf,

    /// Maximum steps running side by side
    pub max_parallel: usize,

    /// Bounds on stale attempts per step call
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            db_path: None,
            workflow_id_path: PathBuf::from("workflow.id"),
            max_parallel: num_cpus::get(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Loads settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading config from: {}", path.display());

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Config content loaded ({} bytes)", content.len());

        let config: EngineConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel == 0 {
            return Err(ConfigError::InvalidParallelism);
        }
        Ok(())
    }

    /// Effective store location.
    pub fn store_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.backend.default_path()))
    }

    /// Opens the configured store.
    pub fn open_store(&self) -> Result<Arc<dyn DurableStore>, StoreError> {
        let store: Arc<dyn DurableStore> = match self.backend {
            Backend::Redb => Arc::new(RedbStore::open(self.store_path())?),
            Backend::Json => Arc::new(JsonFileStore::open(self.store_path())?),
            Backend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}
