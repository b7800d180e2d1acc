//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Error;

/// Default database file name inside the data directory.
pub const DEFAULT_DB_FILE: &str = "tipitaka.db";

/// Paths to the corpus data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite database file (`data/tipitaka.db`).
    pub db_file: PathBuf,
    /// JSON Lines exports (`data/exports/`).
    pub exports: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>, db_file_name: &str) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db_file: root.join(db_file_name),
            exports: root.join("exports"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.exports)?;
        Ok(())
    }
}

/// How writes treat a sibling that already holds the same `order_idx`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderPolicy {
    /// Accept duplicates; the audit reports them as warnings.
    #[default]
    Tolerate,
    /// Fail the write with `Error::DuplicateOrder`.
    Reject,
}

impl FromStr for OrderPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tolerate" => Ok(OrderPolicy::Tolerate),
            "reject" => Ok(OrderPolicy::Reject),
            other => Err(Error::Config(format!(
                "unknown order policy '{}' (expected 'tolerate' or 'reject')",
                other
            ))),
        }
    }
}

/// Top-level corpus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Sibling `order_idx` handling on write.
    pub order_policy: OrderPolicy,
}

impl CorpusConfig {
    /// Configuration with default file name and policy.
    pub fn new(data_dir: impl AsRef<Path>) -> crate::Result<Self> {
        Ok(Self {
            data_paths: DataPaths::new(data_dir, DEFAULT_DB_FILE)?,
            order_policy: OrderPolicy::default(),
        })
    }

    /// Create configuration from environment and defaults.
    ///
    /// Reads `TIPITAKA_DB_FILE` and `TIPITAKA_ORDER_POLICY`.
    pub fn from_env(data_dir: impl AsRef<Path>) -> crate::Result<Self> {
        let db_file = std::env::var("TIPITAKA_DB_FILE")
            .ok()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_FILE.to_string());

        let order_policy = match std::env::var("TIPITAKA_ORDER_POLICY") {
            Ok(raw) => raw.parse()?,
            Err(_) => OrderPolicy::default(),
        };

        let data_paths = DataPaths::new(data_dir, &db_file)?;
        tracing::debug!(
            "Corpus config: db={}, order_policy={:?}",
            data_paths.db_file.display(),
            order_policy
        );

        Ok(Self {
            data_paths,
            order_policy,
        })
    }
}
