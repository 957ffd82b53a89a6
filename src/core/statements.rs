//! Per-table statement bundles
//!
//! The SQL for every key operation embeds the target table's identifier, so
//! each table gets its own bundle of query text. Bundles are built the first
//! time a table is touched and kept until the table is dropped or renamed, so
//! switching back and forth between tables never rebuilds anything.
//!
//! Prepared statements themselves live in the connection's statement cache
//! (`Connection::prepare_cached`), keyed by the text stored here. Repeated
//! calls therefore reset and rebind an existing statement instead of preparing
//! a new one.

use crate::hashing::TableId;
use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Query text for one namespace table
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statements {
    /// `?1` hash, `?2` key
    pub contains: String,
    /// `?1` hash
    pub occupied: String,
    /// `?1` hash, `?2` key; yields the value
    pub get: String,
    /// `?1` hash, `?2` key, `?3` value
    pub set: String,
    /// `?1` hash, `?2` key
    pub erase: String,
    /// `?1` new hash, `?2` new key, `?3` old hash, `?4` old key
    pub rename: String,
    pub clear: String,
    pub count: String,
    /// `?1` limit
    pub scan_first: String,
    /// `?1` last hash seen, `?2` limit
    pub scan_after: String,
}

impl Statements {
    pub fn for_table(id: &TableId) -> Self {
        Statements {
            contains: format!(
                r#"SELECT EXISTS(SELECT 1 FROM "{id}" WHERE "hash" = ?1 AND "key" = ?2)"#
            ),
            occupied: format!(r#"SELECT EXISTS(SELECT 1 FROM "{id}" WHERE "hash" = ?1)"#),
            get: format!(r#"SELECT "value" FROM "{id}" WHERE "hash" = ?1 AND "key" = ?2"#),
            set: format!(
                r#"INSERT INTO "{id}" ("hash", "key", "value") VALUES (?1, ?2, ?3)
                   ON CONFLICT("hash") DO UPDATE SET "value" = excluded."value"
                   WHERE "key" = excluded."key""#
            ),
            erase: format!(r#"DELETE FROM "{id}" WHERE "hash" = ?1 AND "key" = ?2"#),
            rename: format!(
                r#"UPDATE "{id}" SET "hash" = ?1, "key" = ?2 WHERE "hash" = ?3 AND "key" = ?4"#
            ),
            clear: format!(r#"DELETE FROM "{id}""#),
            count: format!(r#"SELECT COUNT(*) FROM "{id}""#),
            scan_first: format!(
                r#"SELECT "hash", "key", "value" FROM "{id}" ORDER BY "hash" LIMIT ?1"#
            ),
            scan_after: format!(
                r#"SELECT "hash", "key", "value" FROM "{id}" WHERE "hash" > ?1 ORDER BY "hash" LIMIT ?2"#
            ),
        }
    }
}

/// Lazily populated map from table identifier to its statement bundle
///
/// Interior mutability lets read-only operations (`get`, `contains`) populate
/// the cache through `&Store`. The store is single-threaded, so `RefCell` is
/// enough.
#[derive(Debug, Default)]
pub(crate) struct StatementCache {
    bundles: RefCell<AHashMap<TableId, Rc<Statements>>>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle for `id`, building it on first use
    pub fn bundle(&self, id: &TableId) -> Rc<Statements> {
        let mut bundles = self.bundles.borrow_mut();
        if let Some(bundle) = bundles.get(id) {
            return Rc::clone(bundle);
        }

        debug!("Preparing statement bundle for {}", id);
        let bundle = Rc::new(Statements::for_table(id));
        bundles.insert(id.clone(), Rc::clone(&bundle));
        bundle
    }

    /// Forget the bundle for `id`; returns whether one was cached
    pub fn discard(&self, id: &TableId) -> bool {
        self.bundles.borrow_mut().remove(id).is_some()
    }

    pub fn clear(&self) {
        self.bundles.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.bundles.borrow().len()
    }

    pub fn is_cached(&self, id: &TableId) -> bool {
        self.bundles.borrow().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_embeds_table_id() {
        let id = TableId::for_name("main");
        let bundle = Statements::for_table(&id);
        for sql in [
            &bundle.contains,
            &bundle.occupied,
            &bundle.get,
            &bundle.set,
            &bundle.erase,
            &bundle.rename,
            &bundle.clear,
            &bundle.count,
            &bundle.scan_first,
            &bundle.scan_after,
        ] {
            assert!(sql.contains(id.as_str()), "missing table id in {}", sql);
        }
    }

    #[test]
    fn test_bundle_is_built_once() {
        let cache = StatementCache::new();
        let id = TableId::for_name("main");

        let first = cache.bundle(&id);
        let second = cache.bundle(&id);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_bundles_are_per_table() {
        let cache = StatementCache::new();
        let a = TableId::for_name("a");
        let b = TableId::for_name("b");

        let bundle_a = cache.bundle(&a);
        let bundle_b = cache.bundle(&b);
        assert_ne!(bundle_a.get, bundle_b.get);

        // Switching between tables keeps both
        assert!(cache.is_cached(&a));
        assert!(cache.is_cached(&b));
    }

    #[test]
    fn test_discard_and_clear() {
        let cache = StatementCache::new();
        let a = TableId::for_name("a");
        let b = TableId::for_name("b");
        cache.bundle(&a);
        cache.bundle(&b);

        assert!(cache.discard(&a));
        assert!(!cache.discard(&a));
        assert!(!cache.is_cached(&a));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
