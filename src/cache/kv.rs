//! Key-Value Storage Engine
//!
//! Ordered byte-key store used by the disk tier. Multi-key updates go through
//! [`WriteBatch`] and are applied atomically.
//!
//! Two engines are provided:
//!
//! - [`SqliteKvStore`]: persistent, one `kv` table in a WAL-mode SQLite file
//! - [`MemoryKvStore`]: `BTreeMap` behind a lock, for tests and throwaway caches

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::Result;

/// A key/value pair as returned by scans
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Single operation inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite a key
    Put(Vec<u8>, Vec<u8>),
    /// Delete a key (no-op if absent)
    Delete(Vec<u8>),
}

/// Set of writes applied in one transaction
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
        self
    }

    /// Queue a delete
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete(key.into()));
        self
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Queued operations, in order
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// Ordered, transactional byte-key store
pub trait KvStore: Send + Sync {
    /// Read a single key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Write a single key
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a single key
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// All pairs whose key starts with `prefix`, in ascending key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>>;

    /// Lowest pair whose key starts with `prefix`
    fn first_with_prefix(&self, prefix: &[u8]) -> Result<Option<KvPair>>;

    /// Apply every operation of `batch` atomically
    fn write(&self, batch: WriteBatch) -> Result<()>;

    /// Release the underlying handle
    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Smallest byte string greater than every key starting with `prefix`.
///
/// `None` when no such bound exists (empty prefix or all `0xff`).
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < u8::MAX {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}

// =============================================================================
// SQLite engine
// =============================================================================

fn pair_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KvPair> {
    Ok((row.get(0)?, row.get(1)?))
}

/// File name of the database inside the cache directory
pub const SQLITE_FILE_NAME: &str = "cache.db";

/// Persistent [`KvStore`] on a single SQLite table.
///
/// SQLite compares BLOBs with `memcmp`, so `ORDER BY key` is bytewise order.
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKvStore")
            .field("conn", &"<sqlite>")
            .finish()
    }
}

impl SqliteKvStore {
    /// Open (or create) the store in `dir`, creating the directory if needed
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SQLITE_FILE_NAME);
        debug!(path = %path.display(), "Opening SQLite cache store");

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   BLOB PRIMARY KEY NOT NULL,
                value BLOB NOT NULL
            ) WITHOUT ROWID",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KvStore for SqliteKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let value = conn
            .prepare_cached("SELECT value FROM kv WHERE key = ?1")?
            .query_row(params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")?
            .execute(params![key, value])?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached("DELETE FROM kv WHERE key = ?1")?
            .execute(params![key])?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let upper = prefix_upper_bound(prefix);
        let conn = self.conn.lock();
        let pairs = match &upper {
            Some(upper) => conn
                .prepare_cached(
                    "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                )?
                .query_map(params![prefix, upper], pair_from_row)?
                .collect::<std::result::Result<Vec<KvPair>, _>>()?,
            None => conn
                .prepare_cached("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")?
                .query_map(params![prefix], pair_from_row)?
                .collect::<std::result::Result<Vec<KvPair>, _>>()?,
        };
        Ok(pairs)
    }

    fn first_with_prefix(&self, prefix: &[u8]) -> Result<Option<KvPair>> {
        let upper = prefix_upper_bound(prefix);
        let conn = self.conn.lock();
        let pair = match &upper {
            Some(upper) => conn
                .prepare_cached(
                    "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key LIMIT 1",
                )?
                .query_row(params![prefix, upper], pair_from_row)
                .optional()?,
            None => conn
                .prepare_cached("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key LIMIT 1")?
                .query_row(params![prefix], pair_from_row)
                .optional()?,
        };
        Ok(pair)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut put = tx.prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")?;
            let mut delete = tx.prepare_cached("DELETE FROM kv WHERE key = ?1")?;
            for op in batch.ops {
                match op {
                    BatchOp::Put(key, value) => {
                        put.execute(params![key, value])?;
                    }
                    BatchOp::Delete(key) => {
                        delete.execute(params![key])?;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, err)| err.into())
    }
}

// =============================================================================
// In-memory engine
// =============================================================================

/// Non-persistent [`KvStore`].
///
/// Clones share the same map, so a clone outlives a closed cache and can be
/// handed to a new one to simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    map: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKvStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.map.write().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let map = self.map.read();
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn first_with_prefix(&self, prefix: &[u8]) -> Result<Option<KvPair>> {
        let map = self.map.read();
        Ok(map
            .range(prefix.to_vec()..)
            .next()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone())))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut map = self.map.write();
        for op in batch.ops {
            match op {
                BatchOp::Put(key, value) => {
                    map.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engines() -> (TempDir, Vec<Box<dyn KvStore>>) {
        let dir = TempDir::new().unwrap();
        let sqlite = SqliteKvStore::open(dir.path()).unwrap();
        (dir, vec![Box::new(sqlite), Box::new(MemoryKvStore::new())])
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound(b"\x01"), Some(vec![0x02]));
        assert_eq!(prefix_upper_bound(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(prefix_upper_bound(&[0xff, 0xff]), None);
        assert_eq!(prefix_upper_bound(b""), None);
    }

    #[test]
    fn test_get_put_delete() {
        let (_dir, stores) = engines();
        for store in stores {
            assert_eq!(store.get(b"k").unwrap(), None);
            store.put(b"k", b"v1").unwrap();
            store.put(b"k", b"v2").unwrap();
            assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
            store.delete(b"k").unwrap();
            store.delete(b"k").unwrap();
            assert_eq!(store.get(b"k").unwrap(), None);
        }
    }

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() {
        let (_dir, stores) = engines();
        for store in stores {
            store.put(&[0x02, 0, 3], b"c").unwrap();
            store.put(&[0x02, 0, 1], b"a").unwrap();
            store.put(&[0x02, 0xff], b"z").unwrap();
            store.put(&[0x01, 0, 2], b"other").unwrap();
            store.put(&[0x03], b"next").unwrap();

            let values: Vec<_> = store
                .scan_prefix(&[0x02])
                .unwrap()
                .into_iter()
                .map(|(_, v)| v)
                .collect();
            assert_eq!(values, vec![b"a".to_vec(), b"c".to_vec(), b"z".to_vec()]);

            let first = store.first_with_prefix(&[0x02]).unwrap().unwrap();
            assert_eq!(first.0, vec![0x02, 0, 1]);
            assert!(store.first_with_prefix(&[0x04]).unwrap().is_none());
            assert_eq!(store.scan_prefix(b"").unwrap().len(), 5);
        }
    }

    #[test]
    fn test_write_batch_applies_in_order() {
        let (_dir, stores) = engines();
        for store in stores {
            store.put(b"gone", b"x").unwrap();

            let mut batch = WriteBatch::new();
            batch.put(b"a".to_vec(), b"1".to_vec());
            batch.put(b"b".to_vec(), b"2".to_vec());
            batch.delete(b"gone".to_vec());
            batch.delete(b"b".to_vec());
            assert_eq!(batch.len(), 4);
            store.write(batch).unwrap();

            assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
            assert_eq!(store.get(b"b").unwrap(), None);
            assert_eq!(store.get(b"gone").unwrap(), None);
        }
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = SqliteKvStore::open(dir.path()).unwrap();
            store.put(b"key", b"value").unwrap();
            Box::new(store).close().unwrap();
        }
        let store = SqliteKvStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert!(dir.path().join(SQLITE_FILE_NAME).exists());
    }

    #[test]
    fn test_memory_clones_share_state() {
        let store = MemoryKvStore::new();
        let other = store.clone();
        store.put(b"k", b"v").unwrap();
        assert_eq!(other.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(other.len(), 1);
    }
}
