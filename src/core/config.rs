//! Store configuration
//!
//! Settings that shape how a store file is created and how the connection
//! behaves once opened. All fields have defaults, so a TOML file only needs
//! to name what it changes:
//!
//! ```toml
//! kind = "settings"
//! sync_mode = "full"
//! journal_mode = "wal"
//! scan_page_size = 1024
//! ```

use crate::error::{KvError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `PRAGMA synchronous` setting applied to every connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Off,
    /// Sync at critical moments only (SQLite `NORMAL`)
    #[default]
    Normal,
    Full,
}

impl SyncMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            SyncMode::Off => "OFF",
            SyncMode::Normal => "NORMAL",
            SyncMode::Full => "FULL",
        }
    }
}

/// `PRAGMA journal_mode` setting applied to read-write connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    #[default]
    Delete,
    Truncate,
    Wal,
    Memory,
}

impl JournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Wal => "WAL",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// Locking behavior of the transaction opened by `begin_batch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchBehavior {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl BatchBehavior {
    pub fn begin_sql(self) -> &'static str {
        match self {
            BatchBehavior::Deferred => "BEGIN DEFERRED",
            BatchBehavior::Immediate => "BEGIN IMMEDIATE",
            BatchBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// Configuration for a [`Store`](crate::Store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store-kind tag written by `create`
    pub kind: String,

    /// Name of the table created (and made default) by `create`
    pub default_table: String,

    pub sync_mode: SyncMode,

    pub journal_mode: JournalMode,

    pub batch_behavior: BatchBehavior,

    /// Rows fetched per page by entry and table iterators
    pub scan_page_size: usize,

    /// Capacity of the connection's prepared-statement cache
    pub statement_cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            kind: "tablekv".to_string(),
            default_table: "main".to_string(),
            sync_mode: SyncMode::Normal,
            journal_mode: JournalMode::Delete,
            batch_behavior: BatchBehavior::Deferred,
            scan_page_size: 256,
            statement_cache_capacity: 32,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: StoreConfig =
            toml::from_str(text).map_err(|e| KvError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check the invariants the store relies on
    pub fn validate(&self) -> Result<()> {
        if self.default_table.is_empty() {
            return Err(KvError::Config(
                "default_table cannot be empty".to_string(),
            ));
        }
        if self.scan_page_size == 0 {
            return Err(KvError::Config(
                "scan_page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.kind, "tablekv");
        assert_eq!(config.default_table, "main");
        assert_eq!(config.sync_mode, SyncMode::Normal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
            kind = "settings"
            journal_mode = "wal"
            batch_behavior = "immediate"
            "#,
        )
        .unwrap();

        assert_eq!(config.kind, "settings");
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert_eq!(config.batch_behavior, BatchBehavior::Immediate);
        assert_eq!(config.default_table, "main");
        assert_eq!(config.scan_page_size, 256);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            StoreConfig::from_toml_str("sync_mode = \"sometimes\""),
            Err(KvError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_toml_str("scan_page_size = 0"),
            Err(KvError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_toml_str("default_table = \"\""),
            Err(KvError::Config(_))
        ));
    }

    #[test]
    fn test_pragma_values() {
        assert_eq!(SyncMode::Full.pragma_value(), "FULL");
        assert_eq!(JournalMode::Wal.pragma_value(), "WAL");
        assert_eq!(BatchBehavior::Exclusive.begin_sql(), "BEGIN EXCLUSIVE");
    }
}
