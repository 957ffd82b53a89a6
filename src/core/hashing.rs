//! Key and table-name hashing
//!
//! Every entry is stored under the 64-bit xxHash of its raw key, and every
//! table is stored in a SQLite table whose name is derived from the hash of
//! the user-facing table name. Deriving the identifier keeps arbitrary user
//! text out of SQL identifiers entirely.

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Prefix of every namespace table in the store file
pub const TABLE_ID_PREFIX: &str = "kv_";

/// Hash raw bytes into the signed form stored in SQLite INTEGER columns
///
/// The value is xxHash64 with seed 0, reinterpreted as `i64`.
#[inline]
pub fn key_hash(data: &[u8]) -> i64 {
    xxh64(data, 0) as i64
}

/// Internal identifier of a namespace table
///
/// Formatted as `kv_` followed by the upper-case hexadecimal hash of the
/// table name. The identifier only ever contains `[A-Za-z0-9_]`, so it can
/// be embedded in SQL text verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId(String);

impl TableId {
    /// Derive the identifier for a table name
    pub fn for_name(name: &str) -> Self {
        Self::from_hash(key_hash(name.as_bytes()))
    }

    /// Build the identifier from an already computed name hash
    pub fn from_hash(hash: i64) -> Self {
        TableId(format!("{}{:X}", TABLE_ID_PREFIX, hash as u64))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TableId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
