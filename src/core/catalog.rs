//! Table catalog operations
//!
//! Tables are tracked in `kv_tables` by the hash of their name. Each one is
//! backed by its own SQLite table named after that hash (see
//! [`TableId`]). Creating, dropping and renaming a table touches both the
//! backing table and the catalog row, so each runs inside a savepoint; that
//! also makes them safe to call while a batch is open.

use crate::hashing::TableId;
use crate::schema::{self, DEFAULT_TABLE_KEY};
use crate::store::{Namespace, Store};
use rusqlite::Connection;
use tracing::{debug, info, warn};

/// Catalog membership; `None` when the lookup itself failed
fn lookup(conn: &Connection, name: &str) -> Option<bool> {
    match schema::catalog_contains(conn, name) {
        Ok(found) => Some(found),
        Err(e) => {
            warn!("Catalog lookup for '{}' failed: {}", name, e);
            None
        }
    }
}

impl Store {
    /// Number of tables in the store
    pub fn num_tables(&self) -> usize {
        let Some(conn) = self.conn.as_ref() else {
            return 0;
        };
        schema::catalog_count(conn).unwrap_or_else(|e| {
            warn!("Failed to count tables: {}", e);
            0
        })
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.conn
            .as_ref()
            .and_then(|conn| lookup(conn, name))
            .unwrap_or(false)
    }

    /// Name of the current table
    pub fn table(&self) -> Option<String> {
        self.active().map(|(_, current)| current.name.clone())
    }

    /// Internal identifier of the current table
    pub fn table_id(&self) -> Option<TableId> {
        self.active().map(|(_, current)| current.id.clone())
    }

    /// Create a table and make it current
    ///
    /// Returns false when the store is closed or the name is taken.
    pub fn create_table(&mut self, name: &str) -> bool {
        let Some(conn) = self.conn.as_mut() else {
            return false;
        };
        if lookup(conn, name) != Some(false) {
            return false;
        }

        let created = conn.savepoint().and_then(|sp| {
            let id = schema::create_namespace(&sp, name)?;
            sp.commit()?;
            Ok(id)
        });

        match created {
            Ok(id) => {
                info!("Created table '{}' as {}", name, id);
                // A dropped table of the same name may have left text behind
                self.statements.discard(&id);
                conn.flush_prepared_statement_cache();
                self.current = Some(Namespace { name: name.to_string(), id });
                true
            }
            Err(e) => {
                warn!("Failed to create table '{}': {}", name, e);
                false
            }
        }
    }

    /// Make an existing table current
    pub fn set_table(&mut self, name: &str) -> bool {
        let Some(conn) = self.conn.as_ref() else {
            return false;
        };
        if lookup(conn, name) != Some(true) {
            return false;
        }

        debug!("Switching to table '{}'", name);
        self.current = Some(Namespace::new(name));
        true
    }

    /// Record the table that `open` activates
    pub fn set_default_table(&mut self, name: &str) -> bool {
        let Some(conn) = self.conn.as_ref() else {
            return false;
        };
        if lookup(conn, name) != Some(true) {
            return false;
        }

        match schema::write_meta(conn, DEFAULT_TABLE_KEY, name) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to record default table '{}': {}", name, e);
                false
            }
        }
    }

    pub fn default_table(&self) -> Option<String> {
        let conn = self.conn.as_ref()?;
        match schema::read_meta(conn, DEFAULT_TABLE_KEY) {
            Ok(name) => name,
            Err(e) => {
                warn!("Failed to read default table: {}", e);
                None
            }
        }
    }

    /// Drop a table and all of its entries
    ///
    /// The current table and the default table cannot be dropped.
    pub fn erase_table(&mut self, name: &str) -> bool {
        if !self.is_open() || self.table().as_deref() == Some(name) {
            return false;
        }
        if self.default_table().as_deref() == Some(name) {
            debug!("Refusing to drop default table '{}'", name);
            return false;
        }

        let Some(conn) = self.conn.as_mut() else {
            return false;
        };
        if lookup(conn, name) != Some(true) {
            return false;
        }

        let dropped = conn.savepoint().and_then(|sp| {
            schema::drop_namespace(&sp, name)?;
            sp.commit()
        });

        match dropped {
            Ok(()) => {
                info!("Dropped table '{}'", name);
                self.statements.discard(&TableId::for_name(name));
                conn.flush_prepared_statement_cache();
                true
            }
            Err(e) => {
                warn!("Failed to drop table '{}': {}", name, e);
                false
            }
        }
    }

    /// Rename a table
    ///
    /// The default-table record and the current table follow the rename.
    pub fn rename_table(&mut self, old: &str, name: &str) -> bool {
        let was_default = self.default_table().as_deref() == Some(old);
        let was_current = self.table().as_deref() == Some(old);

        let Some(conn) = self.conn.as_mut() else {
            return false;
        };
        if lookup(conn, old) != Some(true) || lookup(conn, name) != Some(false) {
            return false;
        }

        let renamed = conn.savepoint().and_then(|sp| {
            schema::rename_namespace(&sp, old, name)?;
            if was_default {
                schema::write_meta(&sp, DEFAULT_TABLE_KEY, name)?;
            }
            sp.commit()
        });

        if let Err(e) = renamed {
            warn!("Failed to rename table '{}' to '{}': {}", old, name, e);
            return false;
        }

        info!("Renamed table '{}' to '{}'", old, name);
        self.statements.discard(&TableId::for_name(old));
        self.statements.discard(&TableId::for_name(name));
        conn.flush_prepared_statement_cache();

        if was_current {
            self.current = Some(Namespace::new(name));
        }
        true
    }

    /// Names of all tables, in catalog order
    pub fn table_names(&self) -> Vec<String> {
        self.tables().map(|tables| tables.collect()).unwrap_or_default()
    }
}
