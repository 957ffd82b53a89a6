//! Persisted layout of a store file
//!
//! A store is an ordinary SQLite database with:
//!
//! - `PRAGMA application_id` set to [`APPLICATION_ID`]
//! - `kv_meta(key TEXT PRIMARY KEY, value BLOB)` holding the `kind` and
//!   `default_table` settings
//! - `kv_tables(hash INTEGER PRIMARY KEY, name TEXT)` mapping the hash of
//!   every table name to the name itself
//! - one `kv_<HEX>(hash INTEGER PRIMARY KEY, key BLOB, value BLOB)` table per
//!   user-facing table
//!
//! The helpers here run single statements against a connection and return the
//! raw engine result; deciding what a failure means is up to the caller.

use crate::config::StoreConfig;
use crate::hashing::{key_hash, TableId};
use rusqlite::{params, Connection, OptionalExtension};

/// Format marker stored in the SQLite header (`PRAGMA application_id`)
pub const APPLICATION_ID: u32 = 0xCB4D_74FF;

pub const META_TABLE: &str = "kv_meta";
pub const CATALOG_TABLE: &str = "kv_tables";

/// Meta key holding the free-form store kind
pub const KIND_KEY: &str = "kind";

/// Meta key holding the table activated by `open`
pub const DEFAULT_TABLE_KEY: &str = "default_table";

const CREATE_RESERVED_TABLES: &str = r#"
CREATE TABLE "kv_meta" (
    "key" TEXT PRIMARY KEY NOT NULL,
    "value" BLOB NOT NULL
);
CREATE TABLE "kv_tables" (
    "hash" INTEGER PRIMARY KEY,
    "name" TEXT NOT NULL
);
"#;

pub(crate) const SCAN_TABLES_FIRST: &str =
    r#"SELECT "hash", "name" FROM "kv_tables" ORDER BY "hash" LIMIT ?1"#;

pub(crate) const SCAN_TABLES_AFTER: &str =
    r#"SELECT "hash", "name" FROM "kv_tables" WHERE "hash" > ?1 ORDER BY "hash" LIMIT ?2"#;

/// Apply per-connection pragmas
///
/// Journal mode is persistent and needs write access, so it is skipped for
/// read-only connections.
pub(crate) fn apply_pragmas(
    conn: &Connection,
    config: &StoreConfig,
    readonly: bool,
) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", config.sync_mode.pragma_value())?;
    conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);

    if !readonly {
        let _mode: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            config.journal_mode.pragma_value(),
            |row| row.get(0),
        )?;
    }
    Ok(())
}

pub(crate) fn write_format_marker(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "application_id", APPLICATION_ID as i32)
}

pub(crate) fn read_format_marker(conn: &Connection) -> rusqlite::Result<u32> {
    let id: i32 = conn.pragma_query_value(None, "application_id", |row| row.get(0))?;
    Ok(id as u32)
}

pub(crate) fn create_reserved_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_RESERVED_TABLES)
}

pub(crate) fn read_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    let mut stmt = conn.prepare_cached(r#"SELECT "value" FROM "kv_meta" WHERE "key" = ?1"#)?;
    let value: Option<Vec<u8>> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
    Ok(value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}

pub(crate) fn write_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        r#"INSERT INTO "kv_meta" ("key", "value") VALUES (?1, ?2)
           ON CONFLICT("key") DO UPDATE SET "value" = excluded."value""#,
    )?;
    stmt.execute(params![key, value.as_bytes()])?;
    Ok(())
}

/// Catalog membership, verifying the stored name on a hash hit
pub(crate) fn catalog_contains(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare_cached(
        r#"SELECT EXISTS(SELECT 1 FROM "kv_tables" WHERE "hash" = ?1 AND "name" = ?2)"#,
    )?;
    stmt.query_row(params![key_hash(name.as_bytes()), name], |row| row.get(0))
}

pub(crate) fn catalog_count(conn: &Connection) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(r#"SELECT COUNT(*) FROM "kv_tables""#)?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    Ok(count.max(0) as usize)
}

/// Create the backing table for `name` and record it in the catalog
pub(crate) fn create_namespace(conn: &Connection, name: &str) -> rusqlite::Result<TableId> {
    let hash = key_hash(name.as_bytes());
    let id = TableId::from_hash(hash);

    conn.execute_batch(&format!(
        r#"CREATE TABLE "{}" (
            "hash" INTEGER PRIMARY KEY,
            "key" BLOB NOT NULL,
            "value" BLOB NOT NULL
        );"#,
        id
    ))?;

    let mut stmt =
        conn.prepare_cached(r#"INSERT INTO "kv_tables" ("hash", "name") VALUES (?1, ?2)"#)?;
    stmt.execute(params![hash, name])?;

    Ok(id)
}

pub(crate) fn drop_namespace(conn: &Connection, name: &str) -> rusqlite::Result<()> {
    let hash = key_hash(name.as_bytes());
    conn.execute_batch(&format!(r#"DROP TABLE "{}";"#, TableId::from_hash(hash)))?;

    let mut stmt = conn.prepare_cached(r#"DELETE FROM "kv_tables" WHERE "hash" = ?1"#)?;
    stmt.execute(params![hash])?;
    Ok(())
}

pub(crate) fn rename_namespace(conn: &Connection, old: &str, name: &str) -> rusqlite::Result<()> {
    let old_hash = key_hash(old.as_bytes());
    let new_hash = key_hash(name.as_bytes());

    conn.execute_batch(&format!(
        r#"ALTER TABLE "{}" RENAME TO "{}";"#,
        TableId::from_hash(old_hash),
        TableId::from_hash(new_hash)
    ))?;

    let mut stmt = conn.prepare_cached(
        r#"UPDATE "kv_tables" SET "hash" = ?1, "name" = ?2 WHERE "hash" = ?3"#,
    )?;
    stmt.execute(params![new_hash, name, old_hash])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_reserved_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_format_marker_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_format_marker(&conn).unwrap(), 0);

        write_format_marker(&conn).unwrap();
        assert_eq!(read_format_marker(&conn).unwrap(), APPLICATION_ID);
    }

    #[test]
    fn test_meta_upsert() {
        let conn = memory_store();
        assert_eq!(read_meta(&conn, KIND_KEY).unwrap(), None);

        write_meta(&conn, KIND_KEY, "first").unwrap();
        write_meta(&conn, KIND_KEY, "second").unwrap();
        assert_eq!(read_meta(&conn, KIND_KEY).unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_namespace_lifecycle() {
        let conn = memory_store();

        let id = create_namespace(&conn, "alpha").unwrap();
        assert_eq!(id, TableId::for_name("alpha"));
        assert!(catalog_contains(&conn, "alpha").unwrap());
        assert_eq!(catalog_count(&conn).unwrap(), 1);

        // Same name twice violates the catalog primary key
        assert!(create_namespace(&conn, "alpha").is_err());

        rename_namespace(&conn, "alpha", "beta").unwrap();
        assert!(!catalog_contains(&conn, "alpha").unwrap());
        assert!(catalog_contains(&conn, "beta").unwrap());

        drop_namespace(&conn, "beta").unwrap();
        assert_eq!(catalog_count(&conn).unwrap(), 0);
    }
}
