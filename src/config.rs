//! Runtime configuration.
//!
//! Values come from `TRADELEDGER_*` environment variables, optionally loaded
//! from a `.env` file, and can be overridden by command-line flags.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::ValueEnum;
use serde::Deserialize;

use crate::application::DEFAULT_LARGE_TRANSACTION_THRESHOLD;
use crate::domain::Cents;
use crate::storage::{JournalStorage, MemoryStorage, SqliteStorage, Storage};

pub const ENV_PREFIX: &str = "TRADELEDGER_";

/// Which persistence adapter backs the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database file
    #[default]
    Sqlite,
    /// Append-only JSON Lines journal
    Journal,
    /// Nothing persisted; state is lost on exit
    Memory,
}

/// Configuration loaded from the environment.
///
/// # Environment Variables
///
/// - `TRADELEDGER_BACKEND`: `sqlite` (default), `journal` or `memory`
/// - `TRADELEDGER_DATA_PATH`: data file, defaults to `tradeledger.db`
/// - `TRADELEDGER_LARGE_TRANSACTION_THRESHOLD`: cents, defaults to 100000
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    #[serde(default = "default_threshold")]
    pub large_transaction_threshold: Cents,
}

fn default_data_path() -> PathBuf {
    PathBuf::from("tradeledger.db")
}

fn default_threshold() -> Cents {
    DEFAULT_LARGE_TRANSACTION_THRESHOLD
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_path: default_data_path(),
            large_transaction_threshold: default_threshold(),
        }
    }
}

impl Config {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed(ENV_PREFIX).from_env::<Config>()
    }

    /// Load from explicit `(NAME, value)` pairs, using the same prefix.
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX).from_iter(vars)
    }

    /// Build the storage adapter this configuration selects.
    pub async fn open_storage(&self) -> Result<Arc<dyn Storage>> {
        let storage: Arc<dyn Storage> = match self.backend {
            StorageBackend::Sqlite => Arc::new(SqliteStorage::open(&self.data_path).await?),
            StorageBackend::Journal => Arc::new(JournalStorage::open(&self.data_path).await?),
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        };
        tracing::debug!(backend = ?self.backend, path = %self.data_path.display(), "storage opened");
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_vars(vars(&[("UNRELATED", "1")])).unwrap();
        assert_eq!(config.backend, StorageBackend::Sqlite);
        assert_eq!(config.data_path, PathBuf::from("tradeledger.db"));
        assert_eq!(config.large_transaction_threshold, 100_000);
    }

    #[test]
    fn test_reads_prefixed_variables() {
        let config = Config::from_vars(vars(&[
            ("TRADELEDGER_BACKEND", "journal"),
            ("TRADELEDGER_DATA_PATH", "/tmp/ledger.jsonl"),
            ("TRADELEDGER_LARGE_TRANSACTION_THRESHOLD", "2500"),
        ]))
        .unwrap();
        assert_eq!(config.backend, StorageBackend::Journal);
        assert_eq!(config.data_path, PathBuf::from("/tmp/ledger.jsonl"));
        assert_eq!(config.large_transaction_threshold, 2500);
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(Config::from_vars(vars(&[("TRADELEDGER_BACKEND", "postgres")])).is_err());
    }
}
