//! Flat string key-value persistence
//!
//! The photo library sits on top of this adapter. Writes go through a
//! `WriteBatch` that is applied all-or-nothing, and every backend enforces a
//! byte quota (keys + values) so an oversized write is refused up front
//! instead of leaving the store half rewritten.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// One pending change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: String },
    Remove { key: String },
}

/// An ordered set of changes committed atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        self.ops.push(WriteOp::Remove { key: key.into() });
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Minimal durable key-value primitive
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Apply every op in order, or none of them.
    /// Fails with `StorageQuotaExceeded` if the result would not fit.
    fn commit(&mut self, batch: WriteBatch) -> Result<()>;

    /// Bytes currently used (keys + values)
    fn used_bytes(&self) -> Result<u64>;

    fn quota_bytes(&self) -> u64;
}

fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

/// Volatile store with the same quota semantics as the SQLite one
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota: u64,
    commits: usize,
}

impl MemoryStore {
    pub fn new(quota: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota,
            commits: 0,
        }
    }

    /// Successful commits so far
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        // Stage on a copy so a refused batch leaves nothing behind
        let mut staged = self.entries.clone();
        for op in batch.ops {
            match op {
                WriteOp::Put { key, value } => {
                    staged.insert(key, value);
                }
                WriteOp::Remove { key } => {
                    staged.remove(&key);
                }
            }
        }

        let required: u64 = staged.iter().map(|(k, v)| entry_size(k, v)).sum();
        if required > self.quota {
            warn!("Refusing batch: {} bytes over a {} byte quota", required, self.quota);
            return Err(Error::StorageQuotaExceeded {
                required,
                quota: self.quota,
            });
        }

        self.entries = staged;
        self.commits += 1;
        Ok(())
    }

    fn used_bytes(&self) -> Result<u64> {
        Ok(self.entries.iter().map(|(k, v)| entry_size(k, v)).sum())
    }

    fn quota_bytes(&self) -> u64 {
        self.quota
    }
}

/// Store backed by a single SQLite table.
/// Each batch runs inside one transaction.
pub struct SqliteStore {
    conn: Connection,
    db_path: PathBuf,
    quota: u64,
}

impl SqliteStore {
    /// Open or create the database at `db_path`
    pub fn open(db_path: &Path, quota: u64) -> Result<Self> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        info!("📁 Library database at: {}", db_path.display());

        let mut store = SqliteStore {
            conn,
            db_path: db_path.to_path_buf(),
            quota,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory database, mainly for tests
    pub fn open_in_memory(quota: u64) -> Result<Self> {
        let mut store = SqliteStore {
            conn: Connection::open_in_memory()?,
            db_path: PathBuf::from(":memory:"),
            quota,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                updated_at  INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        let now = Utc::now().timestamp();
        let op_count = batch.len();

        // Dropping the transaction without commit rolls it back
        let tx = self.conn.transaction()?;
        for op in batch.ops {
            match op {
                WriteOp::Put { key, value } => {
                    tx.execute(
                        "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                        params![key, value, now],
                    )?;
                }
                WriteOp::Remove { key } => {
                    tx.execute("DELETE FROM kv WHERE key = ?1", [key])?;
                }
            }
        }

        let required: i64 = tx.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        let required = required as u64;
        if required > self.quota {
            warn!("Refusing batch: {} bytes over a {} byte quota", required, self.quota);
            return Err(Error::StorageQuotaExceeded {
                required,
                quota: self.quota,
            });
        }

        tx.commit()?;
        debug!("Committed {} op(s), {} bytes in use", op_count, required);
        Ok(())
    }

    fn used_bytes(&self) -> Result<u64> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        Ok(used as u64)
    }

    fn quota_bytes(&self) -> u64 {
        self.quota
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("quota", &self.quota)
            .finish()
    }
}
