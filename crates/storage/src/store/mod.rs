#![forbid(unsafe_code)]

mod contents;
mod error;
mod nucache;
mod pool;
mod requests;
mod schedule;
mod variants;
mod versions;

pub use error::StoreError;
pub use pool::{PooledStore, StorePool};
pub use requests::*;

use cms_core::{ContentId, Culture, NuCacheRow, VersionId};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE_NAME: &str = "content_store.db";
const SCHEMA_VERSION: i64 = 2;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    /// Opens (or creates) the store and installs the schema.
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self::connect(storage_dir)?;
        preflight_gate(&store.conn)?;
        install_schema(&store.conn)?;
        Ok(store)
    }

    /// Opens a connection to an already-initialized store.
    pub(crate) fn connect(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let conn = Connection::open(storage_dir.join(DB_FILE_NAME))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;

        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn db_path(storage_dir: impl AsRef<Path>) -> PathBuf {
        storage_dir.as_ref().join(DB_FILE_NAME)
    }

    /// Starts a write transaction. Dropping the handle without `commit` rolls back.
    pub fn write(&mut self) -> Result<StoreTx<'_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(StoreTx { tx })
    }

    /// Starts a read transaction for a consistent multi-table view.
    pub fn read(&mut self) -> Result<StoreTx<'_>, StoreError> {
        let tx = self.conn.transaction()?;
        Ok(StoreTx { tx })
    }

    /// Lock-free cache read used by the public site.
    pub fn nucache_row(&self, node_id: ContentId) -> Result<Option<NuCacheRow>, StoreError> {
        nucache::load_row(&self.conn, node_id)
    }
}

/// One unit of work against the store; all operations share a single SQLite transaction.
pub struct StoreTx<'a> {
    tx: Transaction<'a>,
}

impl StoreTx<'_> {
    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback()?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.tx
    }
}

fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = [
        "store_state",
        "contents",
        "versions",
        "version_names",
        "version_values",
        "variant_states",
        "schedule_entries",
        "nucache",
        "nucache_counters",
    ]
    .into_iter()
    .collect();

    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }

    for table in required {
        if !tables.contains(table) {
            return Err(StoreError::InvalidInput(
                "RESET_REQUIRED: required table is missing",
            ));
        }
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          schedule_seq INTEGER NOT NULL DEFAULT 0,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS contents (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          key TEXT NOT NULL UNIQUE,
          content_type TEXT NOT NULL,
          parent_id INTEGER,
          path TEXT NOT NULL,
          level INTEGER NOT NULL,
          sort_order INTEGER NOT NULL,
          trashed INTEGER NOT NULL DEFAULT 0,
          published INTEGER NOT NULL DEFAULT 0,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(parent_id) REFERENCES contents(id) ON DELETE RESTRICT,
          CHECK(parent_id IS NULL OR parent_id <> id)
        );

        CREATE INDEX IF NOT EXISTS idx_contents_parent
          ON contents(parent_id, sort_order, id);

        CREATE TABLE IF NOT EXISTS versions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          content_id INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          creator TEXT NOT NULL,
          rolled_back_from INTEGER,
          FOREIGN KEY(content_id) REFERENCES contents(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_versions_content
          ON versions(content_id, id);

        CREATE TABLE IF NOT EXISTS version_names (
          version_id INTEGER NOT NULL,
          culture TEXT NOT NULL,
          name TEXT NOT NULL,
          PRIMARY KEY(version_id, culture),
          FOREIGN KEY(version_id) REFERENCES versions(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS version_values (
          version_id INTEGER NOT NULL,
          culture TEXT NOT NULL,
          segment TEXT NOT NULL,
          alias TEXT NOT NULL,
          kind TEXT NOT NULL,
          value TEXT NOT NULL,
          PRIMARY KEY(version_id, culture, segment, alias),
          FOREIGN KEY(version_id) REFERENCES versions(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS variant_states (
          content_id INTEGER NOT NULL,
          culture TEXT NOT NULL,
          name TEXT,
          available INTEGER NOT NULL,
          published INTEGER NOT NULL,
          edited INTEGER NOT NULL,
          current_version_id INTEGER NOT NULL,
          published_version_id INTEGER,
          published_at_ms INTEGER,
          updated_at_ms INTEGER NOT NULL,
          PRIMARY KEY(content_id, culture),
          FOREIGN KEY(content_id) REFERENCES contents(id) ON DELETE CASCADE,
          FOREIGN KEY(current_version_id) REFERENCES versions(id) ON DELETE RESTRICT,
          FOREIGN KEY(published_version_id) REFERENCES versions(id) ON DELETE RESTRICT,
          CHECK(published = 0 OR available = 1),
          CHECK((published = 1) = (published_version_id IS NOT NULL))
        );

        CREATE TABLE IF NOT EXISTS schedule_entries (
          content_id INTEGER NOT NULL,
          culture TEXT NOT NULL,
          action TEXT NOT NULL CHECK(action IN ('publish', 'unpublish')),
          due_at_ms INTEGER NOT NULL,
          seq INTEGER NOT NULL,
          attempts INTEGER NOT NULL DEFAULT 0,
          last_error TEXT,
          parked INTEGER NOT NULL DEFAULT 0,
          PRIMARY KEY(content_id, culture, action),
          FOREIGN KEY(content_id) REFERENCES contents(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_schedule_due
          ON schedule_entries(parked, due_at_ms, seq);

        CREATE TABLE IF NOT EXISTS nucache (
          node_id INTEGER NOT NULL,
          published INTEGER NOT NULL,
          data BLOB NOT NULL,
          data_hash TEXT NOT NULL,
          rv INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          PRIMARY KEY(node_id, published),
          FOREIGN KEY(node_id) REFERENCES contents(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS nucache_counters (
          node_id INTEGER PRIMARY KEY,
          last_rv INTEGER NOT NULL
        );
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}

pub(crate) fn content_id_from_row(value: i64) -> Result<ContentId, StoreError> {
    ContentId::try_new(value).map_err(|_| StoreError::CorruptRow("invalid content id"))
}

pub(crate) fn version_id_from_row(value: i64) -> Result<VersionId, StoreError> {
    VersionId::try_new(value).map_err(|_| StoreError::CorruptRow("invalid version id"))
}

pub(crate) fn culture_from_row(value: &str) -> Result<Culture, StoreError> {
    Culture::from_stored(value).map_err(|_| StoreError::CorruptRow("invalid culture"))
}

pub(crate) fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
