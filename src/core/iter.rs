//! Entry and table iterators
//!
//! Both iterators walk the hash primary key in pages: each fetch asks for the
//! next `scan_page_size` rows after the last hash seen, so only one page is
//! ever held in memory and no engine cursor stays open between calls. An
//! iterator borrows the store, which keeps it from outliving the connection
//! and from overlapping with writes.
//!
//! Rows come back in ascending hash order. That order is a property of the
//! scan, not a guarantee callers should rely on.

use crate::schema::{SCAN_TABLES_AFTER, SCAN_TABLES_FIRST};
use crate::statements::Statements;
use crate::store::Store;
use rusqlite::{params, Connection, Row};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::iter::FusedIterator;
use tracing::warn;

/// A key/value pair read from a table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Entry {
    /// Key as UTF-8, if it is valid UTF-8
    pub fn key_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.key).ok()
    }

    /// Value as UTF-8, if it is valid UTF-8
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Decode a scanned row into its hash and payload
trait ScanRow: Sized {
    fn decode(row: &Row<'_>) -> rusqlite::Result<(i64, Self)>;
}

impl ScanRow for Entry {
    fn decode(row: &Row<'_>) -> rusqlite::Result<(i64, Self)> {
        Ok((
            row.get(0)?,
            Entry {
                key: row.get(1)?,
                value: row.get(2)?,
            },
        ))
    }
}

impl ScanRow for String {
    fn decode(row: &Row<'_>) -> rusqlite::Result<(i64, Self)> {
        Ok((row.get(0)?, row.get(1)?))
    }
}

/// Keyset pagination over a hash-keyed table
struct Pager<'a, R> {
    conn: &'a Connection,
    scan_first: Cow<'static, str>,
    scan_after: Cow<'static, str>,
    page_size: usize,
    page: VecDeque<R>,
    last_hash: Option<i64>,
    drained: bool,
}

impl<'a, R: ScanRow> Pager<'a, R> {
    fn new(
        conn: &'a Connection,
        scan_first: Cow<'static, str>,
        scan_after: Cow<'static, str>,
        page_size: usize,
    ) -> Self {
        Pager {
            conn,
            scan_first,
            scan_after,
            page_size: page_size.max(1),
            page: VecDeque::new(),
            last_hash: None,
            drained: false,
        }
    }

    fn fetch(&mut self) -> rusqlite::Result<()> {
        let conn = self.conn;
        let limit = self.page_size as i64;

        let mut stmt = match self.last_hash {
            None => conn.prepare_cached(&self.scan_first)?,
            Some(_) => conn.prepare_cached(&self.scan_after)?,
        };
        let mut rows = match self.last_hash {
            None => stmt.query(params![limit])?,
            Some(last) => stmt.query(params![last, limit])?,
        };

        let mut fetched = 0;
        while let Some(row) = rows.next()? {
            let (hash, item) = R::decode(row)?;
            self.last_hash = Some(hash);
            self.page.push_back(item);
            fetched += 1;
        }

        if fetched < self.page_size {
            self.drained = true;
        }
        Ok(())
    }

    fn next_row(&mut self) -> Option<R> {
        if self.page.is_empty() && !self.drained {
            if let Err(e) = self.fetch() {
                warn!("Scan stopped early: {}", e);
                self.drained = true;
            }
        }
        self.page.pop_front()
    }
}

/// Single-pass cursor over the entries of one table
///
/// The cursor starts positioned on the first row. [`Entries::advance`] steps
/// forward; once it reports the end, the cursor stays there. It also
/// implements [`Iterator`], yielding owned [`Entry`] values.
pub struct Entries<'a> {
    pager: Pager<'a, Entry>,
    current: Option<Entry>,
}

impl<'a> Entries<'a> {
    fn new(conn: &'a Connection, stmts: &Statements, page_size: usize) -> Self {
        let mut pager = Pager::new(
            conn,
            Cow::Owned(stmts.scan_first.clone()),
            Cow::Owned(stmts.scan_after.clone()),
            page_size,
        );
        let current = pager.next_row();
        Entries { pager, current }
    }

    /// Step to the next row; returns whether a row is available
    pub fn advance(&mut self) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.current = self.pager.next_row();
        self.current.is_some()
    }

    pub fn is_at_end(&self) -> bool {
        self.current.is_none()
    }

    pub fn current(&self) -> Option<&Entry> {
        self.current.as_ref()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|entry| entry.key.as_slice())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|entry| entry.value.as_slice())
    }
}

impl Iterator for Entries<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        let entry = self.current.take()?;
        self.current = self.pager.next_row();
        Some(entry)
    }
}

impl FusedIterator for Entries<'_> {}

/// Single-pass cursor over table names
///
/// Same shape as [`Entries`], reading the catalog instead of a table.
pub struct Tables<'a> {
    pager: Pager<'a, String>,
    current: Option<String>,
}

impl<'a> Tables<'a> {
    fn new(conn: &'a Connection, page_size: usize) -> Self {
        let mut pager = Pager::new(
            conn,
            Cow::Borrowed(SCAN_TABLES_FIRST),
            Cow::Borrowed(SCAN_TABLES_AFTER),
            page_size,
        );
        let current = pager.next_row();
        Tables { pager, current }
    }

    pub fn advance(&mut self) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.current = self.pager.next_row();
        self.current.is_some()
    }

    pub fn is_at_end(&self) -> bool {
        self.current.is_none()
    }

    pub fn name(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

impl Iterator for Tables<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let name = self.current.take()?;
        self.current = self.pager.next_row();
        Some(name)
    }
}

impl FusedIterator for Tables<'_> {}

impl Store {
    /// Iterate over the entries of the current table
    ///
    /// Returns `None` when the store is closed.
    pub fn entries(&self) -> Option<Entries<'_>> {
        let (conn, stmts) = self.bundle()?;
        Some(Entries::new(conn, &stmts, self.config.scan_page_size))
    }

    /// Iterate over the names of all tables
    ///
    /// Returns `None` when the store is closed.
    pub fn tables(&self) -> Option<Tables<'_>> {
        let conn = self.conn.as_ref()?;
        Some(Tables::new(conn, self.config.scan_page_size))
    }
}
