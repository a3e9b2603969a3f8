//! Configuration for cchelper-storage

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StorageError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cchelper-storage")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Database file name inside `storage_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Reject a category whose name already exists among its siblings
    /// (same kind, same parent, case-insensitive)
    #[serde(default = "default_true")]
    pub reject_duplicate_category_names: bool,

    /// Slug regenerations allowed after a `(kind, slug)` conflict on write
    #[serde(default = "default_slug_conflict_retries")]
    pub slug_conflict_retries: u32,
}

fn default_database_file() -> String {
    "catalog.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_slug_conflict_retries() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database_file: default_database_file(),
            reject_duplicate_category_names: true,
            slug_conflict_retries: 1,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Config for one run: the explicit file when given, otherwise the
    /// `config.toml` that `init` leaves in the storage directory, otherwise
    /// defaults. A `storage_dir` override always wins over the file.
    pub fn resolve(
        explicit: Option<&Path>,
        storage_dir: Option<PathBuf>,
    ) -> Result<Self, StorageError> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let mut defaults = Self::default();
                if let Some(dir) = &storage_dir {
                    defaults.storage_dir = dir.clone();
                }
                let path = defaults.config_path();
                if path.exists() {
                    debug!(path = %path.display(), "Using config from storage dir");
                    Self::load(&path)?
                } else {
                    defaults
                }
            }
        };
        if let Some(dir) = storage_dir {
            config.storage_dir = dir;
        }
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StorageError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join(&self.database_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
