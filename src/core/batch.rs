//! Batches: explicit transactions spanning several writes
//!
//! A store holds at most one batch. The batch is a plain `BEGIN` on the
//! store's own connection, so every write issued through the store while the
//! batch is open becomes part of it. Nesting is not supported.
//!
//! The table that was current when the batch began is remembered. Whenever
//! the transaction is rolled back (cancel, close, failed commit) that table
//! becomes current again, since tables created or renamed inside the batch no
//! longer exist.

use crate::error::{KvError, Result};
use crate::store::{Namespace, Store};
use rusqlite::Connection;
use tracing::{debug, warn};

/// Transaction state of one connection
#[derive(Debug, Default)]
pub(crate) struct Batch {
    active: bool,
    saved: Option<Namespace>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn begin(
        &mut self,
        conn: &Connection,
        begin_sql: &str,
        current: Option<Namespace>,
    ) -> rusqlite::Result<()> {
        conn.execute_batch(begin_sql)?;
        self.active = true;
        self.saved = current;
        Ok(())
    }

    /// Commit the open transaction
    ///
    /// A failed commit is rolled back, so the batch is over either way. On
    /// failure the table current at `begin` is handed back with the error.
    pub fn commit(
        &mut self,
        conn: &Connection,
    ) -> std::result::Result<(), (Option<Namespace>, KvError)> {
        if !self.active {
            return Err((None, KvError::NotInBatch));
        }
        self.active = false;
        let saved = self.saved.take();

        if let Err(e) = conn.execute_batch("COMMIT") {
            if !conn.is_autocommit() {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    warn!("Rollback after failed commit also failed: {}", rollback);
                }
            }
            return Err((saved, e.into()));
        }
        Ok(())
    }

    /// Roll back the open transaction, if any
    ///
    /// Returns the table that was current at `begin` when a batch was open.
    pub fn release(&mut self, conn: &Connection) -> Option<Namespace> {
        if !self.active {
            return None;
        }
        self.active = false;
        let saved = self.saved.take();

        if let Err(e) = conn.execute_batch("ROLLBACK") {
            warn!("Failed to roll back batch: {}", e);
        }
        saved
    }
}

impl Store {
    /// Whether a batch is open
    pub fn in_batch(&self) -> bool {
        self.batch.is_active()
    }

    /// Open a batch
    ///
    /// Returns false when the store is closed or a batch is already open.
    pub fn begin_batch(&mut self) -> bool {
        let Some(conn) = self.conn.as_ref() else {
            return false;
        };
        if self.batch.is_active() {
            return false;
        }

        let current = self.current.clone();
        match self.batch.begin(conn, self.config.batch_behavior.begin_sql(), current) {
            Ok(()) => {
                debug!("Batch started");
                true
            }
            Err(e) => {
                warn!("Failed to begin batch: {}", e);
                false
            }
        }
    }

    /// Commit the open batch
    ///
    /// Committing without an open batch is a usage error and returns
    /// [`KvError::NotInBatch`].
    pub fn commit_batch(&mut self) -> Result<()> {
        let Some(conn) = self.conn.as_ref() else {
            return Err(KvError::NotInBatch);
        };
        match self.batch.commit(conn) {
            Ok(()) => {
                debug!("Batch committed");
                Ok(())
            }
            Err((_, KvError::NotInBatch)) => Err(KvError::NotInBatch),
            Err((saved, e)) => {
                warn!("Batch commit failed and was rolled back: {}", e);
                self.restore_after_rollback(saved);
                Err(e)
            }
        }
    }

    /// Discard every write made since [`Store::begin_batch`]
    ///
    /// Catalog changes are undone too, and the table that was current when
    /// the batch began becomes current again. Safe to call without an open
    /// batch.
    pub fn cancel_batch(&mut self) {
        let Some(conn) = self.conn.as_ref() else {
            return;
        };
        if !self.batch.is_active() {
            return;
        }

        let saved = self.batch.release(conn);
        debug!("Batch cancelled");
        self.restore_after_rollback(saved);
    }

    /// Reset in-memory state to match a rolled-back transaction
    fn restore_after_rollback(&mut self, saved: Option<Namespace>) {
        if let Some(saved) = saved {
            if self.current.as_ref() != Some(&saved) {
                debug!("Restoring table '{}' after rollback", saved.name);
            }
            self.current = Some(saved);
        }

        // Bundles and prepared statements may name tables the rollback removed
        self.statements.clear();
        if let Some(conn) = self.conn.as_ref() {
            conn.flush_prepared_statement_cache();
        }
    }

    /// Run `f` inside a batch
    ///
    /// The batch is committed when `f` returns `Ok` and cancelled when it
    /// returns `Err`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use tablekv::Store;
    /// # fn main() -> tablekv::Result<()> {
    /// let mut store = Store::create_at("data.kv", true)?;
    /// store.with_batch(|store| {
    ///     store.set(b"a", b"1");
    ///     store.set(b"b", b"2");
    ///     Ok(())
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_batch<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Store) -> Result<T>,
    {
        if !self.begin_batch() {
            return Err(KvError::BatchUnavailable);
        }

        match f(self) {
            Ok(value) => {
                self.commit_batch()?;
                Ok(value)
            }
            Err(e) => {
                self.cancel_batch();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
        conn
    }

    fn rows(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_commit_without_begin_is_an_error() {
        let conn = scratch();
        let mut batch = Batch::new();
        assert!(matches!(
            batch.commit(&conn),
            Err((None, KvError::NotInBatch))
        ));
    }

    #[test]
    fn test_release_hands_back_saved_table() {
        let conn = scratch();
        let mut batch = Batch::new();
        assert_eq!(batch.release(&conn), None);

        batch
            .begin(&conn, "BEGIN DEFERRED", Some(Namespace::new("main")))
            .unwrap();
        assert_eq!(batch.release(&conn), Some(Namespace::new("main")));
        assert_eq!(batch.release(&conn), None);
    }

    #[test]
    fn test_failed_commit_hands_back_saved_table() {
        let conn = scratch();
        let mut batch = Batch::new();

        batch
            .begin(&conn, "BEGIN DEFERRED", Some(Namespace::new("main")))
            .unwrap();
        // Ends the transaction behind the batch's back so COMMIT fails
        conn.execute_batch("ROLLBACK").unwrap();

        match batch.commit(&conn) {
            Err((saved, KvError::Sqlite(_))) => {
                assert_eq!(saved, Some(Namespace::new("main")));
            }
            other => panic!("expected engine error, got {:?}", other),
        }
        assert!(!batch.is_active());
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_release_rolls_back() {
        let conn = scratch();
        let mut batch = Batch::new();

        batch.begin(&conn, "BEGIN DEFERRED", None).unwrap();
        assert!(batch.is_active());
        conn.execute("INSERT INTO t VALUES (1)", []).unwrap();

        batch.release(&conn);
        assert!(!batch.is_active());
        assert!(conn.is_autocommit());
        assert_eq!(rows(&conn), 0);

        // Releasing twice is harmless
        batch.release(&conn);
    }

    #[test]
    fn test_commit_persists() {
        let conn = scratch();
        let mut batch = Batch::new();

        batch.begin(&conn, "BEGIN IMMEDIATE", None).unwrap();
        conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
        batch.commit(&conn).unwrap();

        assert!(!batch.is_active());
        assert_eq!(rows(&conn), 1);
    }
}
