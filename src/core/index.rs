//! Hashed key index
//!
//! Entries are stored under `key_hash(key)` as the primary key of the current
//! table, next to the raw key and value bytes. Every lookup goes through the
//! primary-key index and then compares the stored key with the requested one,
//! so two keys that happen to share a hash can never read or delete each
//! other's entry. A write whose hash slot already belongs to a different key is
//! refused rather than silently overwriting it.
//!
//! Engine errors on this path are logged and reported as the operation's
//! failure value; nothing here returns an error.

use crate::hashing::key_hash;
use crate::iter::Entry;
use crate::statements::Statements;
use crate::store::Store;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Log an engine failure and turn it into `None`
fn logged<T>(op: &str, result: rusqlite::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} failed: {}", op, e);
            None
        }
    }
}

impl Store {
    /// Connection plus the statement bundle of the current table
    pub(crate) fn bundle(&self) -> Option<(&Connection, Rc<Statements>)> {
        let (conn, current) = self.active()?;
        Some((conn, self.statements.bundle(&current.id)))
    }

    pub fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        let Some((conn, stmts)) = self.bundle() else {
            return false;
        };
        let key = key.as_ref();

        let found = conn.prepare_cached(&stmts.contains).and_then(|mut stmt| {
            stmt.query_row(params![key_hash(key), key], |row| row.get::<_, bool>(0))
        });
        logged("contains", found).unwrap_or(false)
    }

    /// Value stored under `key` in the current table
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<Vec<u8>> {
        let (conn, stmts) = self.bundle()?;
        let key = key.as_ref();

        let value = conn.prepare_cached(&stmts.get).and_then(|mut stmt| {
            stmt.query_row(params![key_hash(key), key], |row| row.get::<_, Vec<u8>>(0))
                .optional()
        });
        logged("get", value).flatten()
    }

    /// Insert or overwrite the value for `key`
    ///
    /// Returns false when the store is closed or read-only, or when another
    /// key already occupies the same hash slot.
    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> bool {
        let Some((conn, stmts)) = self.bundle() else {
            return false;
        };
        let (key, value) = (key.as_ref(), value.as_ref());
        let hash = key_hash(key);

        let changed = conn
            .prepare_cached(&stmts.set)
            .and_then(|mut stmt| stmt.execute(params![hash, key, value]));

        match logged("set", changed) {
            Some(1) => {
                debug!("Set {} bytes under hash {:#018X}", value.len(), hash as u64);
                true
            }
            Some(_) => {
                warn!(
                    "Refusing to overwrite entry at hash {:#018X}: stored key differs",
                    hash as u64
                );
                false
            }
            None => false,
        }
    }

    /// Remove `key`; returns whether an entry was removed
    pub fn erase(&mut self, key: impl AsRef<[u8]>) -> bool {
        let Some((conn, stmts)) = self.bundle() else {
            return false;
        };
        let key = key.as_ref();

        let changed = conn
            .prepare_cached(&stmts.erase)
            .and_then(|mut stmt| stmt.execute(params![key_hash(key), key]));
        logged("erase", changed) == Some(1)
    }

    /// Move the entry stored under `old` to `name`
    ///
    /// Fails when `name` (or anything sharing its hash) is already present,
    /// or when `old` is absent.
    pub fn rename(&mut self, old: impl AsRef<[u8]>, name: impl AsRef<[u8]>) -> bool {
        let Some((conn, stmts)) = self.bundle() else {
            return false;
        };
        let (old, name) = (old.as_ref(), name.as_ref());
        let new_hash = key_hash(name);

        let occupied = conn.prepare_cached(&stmts.occupied).and_then(|mut stmt| {
            stmt.query_row(params![new_hash], |row| row.get::<_, bool>(0))
        });
        if logged("rename", occupied) != Some(false) {
            return false;
        }

        let changed = conn.prepare_cached(&stmts.rename).and_then(|mut stmt| {
            stmt.execute(params![new_hash, name, key_hash(old), old])
        });
        logged("rename", changed) == Some(1)
    }

    /// Remove every entry of the current table
    pub fn clear(&mut self) -> bool {
        let Some((conn, stmts)) = self.bundle() else {
            return false;
        };

        let removed = conn
            .prepare_cached(&stmts.clear)
            .and_then(|mut stmt| stmt.execute([]));
        match logged("clear", removed) {
            Some(count) => {
                debug!("Cleared {} entries", count);
                true
            }
            None => false,
        }
    }

    /// Number of entries in the current table
    pub fn num_values(&self) -> usize {
        let Some((conn, stmts)) = self.bundle() else {
            return 0;
        };

        let count = conn
            .prepare_cached(&stmts.count)
            .and_then(|mut stmt| stmt.query_row([], |row| row.get::<_, i64>(0)));
        logged("count", count).map_or(0, |n| n.max(0) as usize)
    }

    pub fn len(&self) -> usize {
        self.num_values()
    }

    pub fn is_empty(&self) -> bool {
        self.num_values() == 0
    }

    /// Copy every entry of the current table into a vector
    pub fn entries_vec(&self) -> Vec<Entry> {
        let mut result = Vec::with_capacity(self.num_values());
        if let Some(entries) = self.entries() {
            result.extend(entries);
        }
        result
    }

    /// Copy every entry of the current table into a map
    pub fn to_map(&self) -> HashMap<Vec<u8>, Vec<u8>> {
        let mut result = HashMap::with_capacity(self.num_values());
        if let Some(entries) = self.entries() {
            result.extend(entries.map(|entry| (entry.key, entry.value)));
        }
        result
    }
}
