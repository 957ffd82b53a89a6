//! # tablekv - Embedded Key-Value Store with Named Tables
//!
//! `tablekv` stores opaque byte values under opaque byte keys in a single
//! SQLite file. Entries are partitioned into named tables, one of which is
//! current at any time:
//!
//! - **Hashed keys**: every entry is indexed by the 64-bit xxHash of its key
//! - **Table catalog**: create, switch, rename and drop tables; a default
//!   table is activated on open
//! - **Batches**: group writes into one all-or-nothing transaction
//! - **Streaming iteration** over entries and table names
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tablekv::{Result, Store};
//!
//! # fn main() -> Result<()> {
//! let mut store = Store::create_at("data.kv", true)?;
//!
//! store.set("hello", "world");
//! assert_eq!(store.get("hello").as_deref(), Some(&b"world"[..]));
//!
//! // Tables are independent key spaces
//! store.create_table("secondary");
//! assert!(!store.contains("hello"));
//!
//! for entry in store.entries().into_iter().flatten() {
//!     println!("{:?} => {:?}", entry.key, entry.value);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Batches
//!
//! ```rust,no_run
//! use tablekv::{Result, Store};
//!
//! # fn main() -> Result<()> {
//! let mut store = Store::open_at("data.kv", false)?;
//!
//! store.begin_batch();
//! store.set("a", "1");
//! store.set("b", "2");
//! store.commit_batch()?;
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use self::core::{
    batch, catalog, config, error, hashing, index, iter, schema, statements, store,
};

pub use crate::core::{
    config::{BatchBehavior, JournalMode, StoreConfig, SyncMode},
    error::{KvError, Result},
    hashing::{key_hash, TableId},
    iter::{Entries, Entry, Tables},
    schema::APPLICATION_ID,
    store::{Store, StoreBuilder},
};
