//! Construction-time configuration for the transaction coordinator.
//!
//! The original source hard-coded the auxiliary table names as module
//! globals (`TX_TABLE_NAME`, `TX_DATA_TABLE_NAME`). Per the design notes,
//! those are exposed here as configuration with defaults instead, loadable
//! from a TOML file the same way the rest of this crate's ancestry loads
//! its settings.

use crate::core::common::error::TxManagerError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Settings that shape how a [`crate::core::transaction::tx::Tx`] bootstraps
/// and behaves, independent of any one transaction's identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TxManagerConfig {
    /// Name of the `tx-info` table. Default: `"tx-info"`.
    #[serde(default = "default_tx_table_name")]
    pub tx_table_name: String,

    /// Name of the `tx-data` (WAL) table. Default: `"tx-data"`.
    #[serde(default = "default_tx_data_table_name")]
    pub tx_data_table_name: String,

    /// Read capacity units used when creating the auxiliary tables.
    #[serde(default = "default_capacity")]
    pub tx_table_read_capacity: u64,

    /// Write capacity units used when creating the auxiliary tables.
    #[serde(default = "default_capacity")]
    pub tx_table_write_capacity: u64,

    /// Interval between `create_table` status polls while waiting for
    /// `ACTIVE`, in milliseconds.
    #[serde(default = "default_table_poll_interval_ms")]
    pub table_poll_interval_ms: u64,

    /// Default interval between `wait_lock` retries, in milliseconds.
    #[serde(default = "default_lock_wait_interval_ms")]
    pub lock_wait_interval_ms: u64,

    /// Default maximum time `wait_lock` will retry before giving up, in
    /// milliseconds.
    #[serde(default = "default_lock_wait_max_ms")]
    pub lock_wait_max_ms: u64,
}

fn default_tx_table_name() -> String {
    "tx-info".to_string()
}

fn default_tx_data_table_name() -> String {
    "tx-data".to_string()
}

fn default_capacity() -> u64 {
    5
}

fn default_table_poll_interval_ms() -> u64 {
    10_000
}

fn default_lock_wait_interval_ms() -> u64 {
    100
}

fn default_lock_wait_max_ms() -> u64 {
    1_000
}

impl Default for TxManagerConfig {
    fn default() -> Self {
        Self {
            tx_table_name: default_tx_table_name(),
            tx_data_table_name: default_tx_data_table_name(),
            tx_table_read_capacity: default_capacity(),
            tx_table_write_capacity: default_capacity(),
            table_poll_interval_ms: default_table_poll_interval_ms(),
            lock_wait_interval_ms: default_lock_wait_interval_ms(),
            lock_wait_max_ms: default_lock_wait_max_ms(),
        }
    }
}

impl TxManagerConfig {
    /// Loads configuration from a TOML file. A missing file yields the
    /// defaults; a malformed one is an error.
    pub fn load_from_file(path: &Path) -> Result<Self, TxManagerError> {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .map_err(|e| TxManagerError::Internal(format!("failed to parse config file '{}': {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(TxManagerError::Internal(format!("failed to read config file '{}': {e}", path.display()))),
        }
    }
}
