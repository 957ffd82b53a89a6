//! Store lifecycle
//!
//! A [`Store`] owns at most one SQLite connection. It starts closed, becomes
//! open through [`Store::create`] or [`Store::open`], and returns to closed on
//! [`Store::close`] or drop. Table, key, batch and iterator operations live in
//! their own modules as further `impl Store` blocks.

use crate::batch::Batch;
use crate::config::{BatchBehavior, JournalMode, StoreConfig, SyncMode};
use crate::error::{KvError, Result};
use crate::hashing::TableId;
use crate::schema::{self, APPLICATION_ID, DEFAULT_TABLE_KEY, KIND_KEY};
use crate::statements::StatementCache;
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// The table key operations currently run against
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Namespace {
    pub name: String,
    pub id: TableId,
}

impl Namespace {
    pub fn new(name: &str) -> Self {
        Namespace {
            name: name.to_string(),
            id: TableId::for_name(name),
        }
    }
}

/// Key-value store backed by a single SQLite file
///
/// Entries live in named tables. Exactly one table is current at a time and
/// all key operations (`get`, `set`, `erase`, ...) target it.
///
/// Precondition failures (store closed, missing key, duplicate table name)
/// are reported through `false` / `None`. Only programmer errors such as
/// committing without a batch, and failures while bootstrapping a new file,
/// are reported as [`KvError`].
///
/// # Examples
///
/// ```rust,no_run
/// use tablekv::Store;
///
/// # fn main() -> tablekv::Result<()> {
/// let mut store = Store::new();
/// store.create("settings.kv", true)?;
///
/// store.set(b"hello", b"world");
/// assert_eq!(store.get(b"hello").as_deref(), Some(&b"world"[..]));
///
/// store.create_table("secondary");
/// assert_eq!(store.table().as_deref(), Some("secondary"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Store {
    pub(crate) conn: Option<Connection>,
    pub(crate) batch: Batch,
    pub(crate) statements: StatementCache,
    pub(crate) current: Option<Namespace>,
    pub(crate) config: StoreConfig,
    path: Option<PathBuf>,
    readonly: bool,
}

impl Store {
    /// Create a closed store with the default configuration
    pub fn new() -> Self {
        Store {
            conn: None,
            batch: Batch::new(),
            statements: StatementCache::new(),
            current: None,
            config: StoreConfig::default(),
            path: None,
            readonly: false,
        }
    }

    /// Create a closed store with a validated configuration
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let mut store = Self::new();
        store.config = config;
        Ok(store)
    }

    /// Create a new store file and return it open
    ///
    /// Returns [`KvError::CreateFailed`] where [`Store::create`] would return
    /// `Ok(false)`.
    pub fn create_at<P: AsRef<Path>>(path: P, overwrite: bool) -> Result<Self> {
        let mut store = Self::new();
        if store.create(path.as_ref(), overwrite)? {
            Ok(store)
        } else {
            Err(KvError::CreateFailed(path.as_ref().to_path_buf()))
        }
    }

    /// Open an existing store file
    ///
    /// Returns [`KvError::OpenFailed`] where [`Store::open`] would return
    /// `false`.
    pub fn open_at<P: AsRef<Path>>(path: P, readonly: bool) -> Result<Self> {
        let mut store = Self::new();
        if store.open(path.as_ref(), readonly) {
            Ok(store)
        } else {
            Err(KvError::OpenFailed(path.as_ref().to_path_buf()))
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn is_readonly(&self) -> bool {
        self.is_open() && self.readonly
    }

    /// Path of the open store file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create a new store file at `path` and open it read-write
    ///
    /// Returns `Ok(false)` without touching the filesystem when the store is
    /// already open, when `path` exists and `overwrite` is false, or when
    /// `path` exists but is not a regular file. An existing regular file is
    /// removed first when `overwrite` is true, together with any `-journal`,
    /// `-wal` or `-shm` file a previous store left next to it.
    ///
    /// The new file receives the format marker, the meta and catalog tables,
    /// the configured `kind`, and the configured default table, which becomes
    /// current. All of it is written in one transaction. If any step fails the
    /// partial file is removed and [`KvError::Bootstrap`] is returned.
    pub fn create<P: AsRef<Path>>(&mut self, path: P, overwrite: bool) -> Result<bool> {
        let path = path.as_ref();
        if self.is_open() {
            debug!("Refusing to create {:?}: store already open", path);
            return Ok(false);
        }

        match fs::metadata(path) {
            Ok(meta) => {
                if !overwrite {
                    debug!("Refusing to create {:?}: path exists", path);
                    return Ok(false);
                }
                if !meta.is_file() {
                    warn!("Refusing to overwrite {:?}: not a regular file", path);
                    return Ok(false);
                }
                if let Err(e) = fs::remove_file(path) {
                    warn!("Failed to remove existing file {:?}: {}", path, e);
                    return Ok(false);
                }
                remove_sidecars(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Cannot inspect {:?}: {}", path, e);
                return Ok(false);
            }
        }

        info!("Creating store at {:?}", path);
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let bootstrapped =
            Connection::open_with_flags(path, flags).and_then(|mut conn| {
                bootstrap(&mut conn, &self.config)?;
                Ok(conn)
            });

        match bootstrapped {
            Ok(conn) => {
                self.conn = Some(conn);
                self.current = Some(Namespace::new(&self.config.default_table));
                self.path = Some(path.to_path_buf());
                self.readonly = false;
                Ok(true)
            }
            Err(source) => {
                error!("Failed to bootstrap store at {:?}: {}", path, source);
                // Never leave a half-initialized file behind
                let _ = fs::remove_file(path);
                remove_sidecars(path);
                Err(KvError::Bootstrap {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Open an existing store file
    ///
    /// Fails when the store is already open, when `path` is missing or not a
    /// regular file, when the file does not carry the store's format marker,
    /// or when no valid default table is recorded. On success the default
    /// table is current.
    pub fn open<P: AsRef<Path>>(&mut self, path: P, readonly: bool) -> bool {
        let path = path.as_ref();
        if self.is_open() {
            debug!("Refusing to open {:?}: store already open", path);
            return false;
        }

        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                debug!("Cannot open {:?}: not a regular file", path);
                return false;
            }
            Err(e) => {
                debug!("Cannot open {:?}: {}", path, e);
                return false;
            }
        }

        info!("Opening store at {:?} (readonly: {})", path, readonly);
        let access = if readonly {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        let conn = match Connection::open_with_flags(path, access | OpenFlags::SQLITE_OPEN_NO_MUTEX)
        {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Failed to open {:?}: {}", path, e);
                return false;
            }
        };

        match schema::read_format_marker(&conn) {
            Ok(APPLICATION_ID) => {}
            Ok(marker) => {
                warn!(
                    "Rejecting {:?}: format marker {:#010X} does not match {:#010X}",
                    path, marker, APPLICATION_ID
                );
                return false;
            }
            Err(e) => {
                warn!("Rejecting {:?}: cannot read format marker: {}", path, e);
                return false;
            }
        }

        if let Err(e) = schema::apply_pragmas(&conn, &self.config, readonly) {
            warn!("Failed to configure connection for {:?}: {}", path, e);
            return false;
        }

        let default_table = match resolve_default_table(&conn) {
            Ok(Some(name)) => name,
            Ok(None) => {
                warn!("Rejecting {:?}: no valid default table recorded", path);
                return false;
            }
            Err(e) => {
                warn!("Failed to read default table from {:?}: {}", path, e);
                return false;
            }
        };

        debug!("Activating default table '{}'", default_table);
        self.current = Some(Namespace::new(&default_table));
        self.conn = Some(conn);
        self.path = Some(path.to_path_buf());
        self.readonly = readonly;
        true
    }

    /// Close the store, rolling back any open batch
    ///
    /// Does nothing when already closed.
    pub fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        info!("Closing store at {:?}", self.path);
        self.batch.release(&conn);
        self.statements.clear();
        self.current = None;
        self.path = None;
        self.readonly = false;

        if let Err((_conn, e)) = conn.close() {
            warn!("Error while closing connection: {}", e);
        }
    }

    /// Free-form store kind tag
    pub fn kind(&self) -> Option<String> {
        let conn = self.conn.as_ref()?;
        match schema::read_meta(conn, KIND_KEY) {
            Ok(kind) => kind,
            Err(e) => {
                warn!("Failed to read store kind: {}", e);
                None
            }
        }
    }

    pub fn set_kind(&mut self, kind: &str) -> bool {
        let Some(conn) = self.conn.as_ref() else {
            return false;
        };
        match schema::write_meta(conn, KIND_KEY, kind) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write store kind: {}", e);
                false
            }
        }
    }

    /// Connection and current table, if open
    pub(crate) fn active(&self) -> Option<(&Connection, &Namespace)> {
        match (&self.conn, &self.current) {
            (Some(conn), Some(current)) => Some((conn, current)),
            _ => None,
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.close();
    }
}

/// Suffixes of the files SQLite keeps next to a database
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Remove journal files left behind by an earlier store at `path`
fn remove_sidecars(path: &Path) {
    for suffix in SIDECAR_SUFFIXES {
        let sidecar = sidecar_path(path, suffix);
        match fs::remove_file(&sidecar) {
            Ok(()) => debug!("Removed stale {:?}", sidecar),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {:?}: {}", sidecar, e),
        }
    }
}

/// Write everything a fresh store file needs, in one transaction
fn bootstrap(conn: &mut Connection, config: &StoreConfig) -> rusqlite::Result<()> {
    schema::apply_pragmas(conn, config, false)?;

    let tx = conn.transaction()?;
    schema::write_format_marker(&tx)?;
    schema::create_reserved_tables(&tx)?;
    schema::write_meta(&tx, KIND_KEY, &config.kind)?;
    schema::create_namespace(&tx, &config.default_table)?;
    schema::write_meta(&tx, DEFAULT_TABLE_KEY, &config.default_table)?;
    tx.commit()
}

fn resolve_default_table(conn: &Connection) -> rusqlite::Result<Option<String>> {
    match schema::read_meta(conn, DEFAULT_TABLE_KEY)? {
        Some(name) if schema::catalog_contains(conn, &name)? => Ok(Some(name)),
        _ => Ok(None),
    }
}

/// Builder for a [`Store`] with a custom configuration
///
/// # Examples
///
/// ```rust,no_run
/// use tablekv::{JournalMode, StoreBuilder};
///
/// # fn main() -> tablekv::Result<()> {
/// let mut store = StoreBuilder::new()
///     .kind("settings")
///     .default_table("global")
///     .journal_mode(JournalMode::Wal)
///     .build()?;
/// store.create("settings.kv", false)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StoreBuilder {
    config: StoreConfig,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: StoreConfig) -> Self {
        StoreBuilder { config }
    }

    /// Kind tag written when a new file is created
    pub fn kind<S: Into<String>>(mut self, kind: S) -> Self {
        self.config.kind = kind.into();
        self
    }

    /// Name of the table a new file starts with
    pub fn default_table<S: Into<String>>(mut self, name: S) -> Self {
        self.config.default_table = name.into();
        self
    }

    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.config.sync_mode = mode;
        self
    }

    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.config.journal_mode = mode;
        self
    }

    pub fn batch_behavior(mut self, behavior: BatchBehavior) -> Self {
        self.config.batch_behavior = behavior;
        self
    }

    pub fn scan_page_size(mut self, rows: usize) -> Self {
        self.config.scan_page_size = rows;
        self
    }

    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.statement_cache_capacity = capacity;
        self
    }

    /// Build a closed store
    pub fn build(self) -> Result<Store> {
        Store::with_config(self.config)
    }
}
