//! Key-value persistence layer for the vehicle ledger
//!
//! The ledger only needs an ordered bucket of byte keys to byte values with point
//! reads and an atomic read-modify-write unit of work. `Database` provides that on
//! SQLite, `InMemoryPersistence` on a `BTreeMap`.

use crate::error::{LedgerError, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Name of the bucket (table) holding blocks and the tip pointer.
pub const BLOCKS_BUCKET: &str = "blocks";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Read/write view of the bucket inside one unit of work.
pub trait Bucket {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
}

/// A unit of work: every `put` it makes is committed together, or none are.
pub type UnitOfWork<'f> = dyn FnMut(&mut dyn Bucket) -> Result<()> + 'f;

/// Abstraction for persistence backends.
pub trait Persistence: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Run `work` under the backend's write lock and commit only if it returns `Ok`.
    fn update(&self, work: &mut UnitOfWork<'_>) -> Result<()>;
}

fn poisoned() -> LedgerError {
    LedgerError::Database("Mutex poisoned".to_string())
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| LedgerError::StoreUnavailable(format!("Failed to open {}: {}", path, e)))?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| LedgerError::StoreUnavailable(format!("Failed to configure {}: {}", path, e)))?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    key BLOB PRIMARY KEY,
                    value BLOB NOT NULL
                )",
                BLOCKS_BUCKET
            ),
            [],
        )
        .map_err(|e| {
            LedgerError::StoreUnavailable(format!("Failed to create {} bucket: {}", BLOCKS_BUCKET, e))
        })?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

struct SqliteBucket<'a> {
    tx: &'a rusqlite::Transaction<'a>,
}

impl Bucket for SqliteBucket<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .tx
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", BLOCKS_BUCKET),
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tx.execute(
            &format!("INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)", BLOCKS_BUCKET),
            params![key, value],
        )?;
        Ok(())
    }
}

impl Persistence for Database {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().map_err(|_| poisoned())?;
        let value = conn
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", BLOCKS_BUCKET),
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn update(&self, work: &mut UnitOfWork<'_>) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|_| poisoned())?;
        // IMMEDIATE takes SQLite's write lock up front, so the whole unit of work is
        // serialized against other writers, including other processes.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut bucket = SqliteBucket { tx: &tx };
            work(&mut bucket)?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct StagedBucket<'a> {
    committed: &'a BTreeMap<Vec<u8>, Vec<u8>>,
    staged: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Bucket for StagedBucket<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .staged
            .get(key)
            .or_else(|| self.committed.get(key))
            .cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.staged.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

impl Persistence for InMemoryPersistence {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn update(&self, work: &mut UnitOfWork<'_>) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let staged = {
            let mut bucket = StagedBucket {
                committed: &*entries,
                staged: BTreeMap::new(),
            };
            work(&mut bucket)?;
            bucket.staged
        };
        entries.extend(staged);
        Ok(())
    }
}
