//! Disk Tier - persistent FIFO store
//!
//! Each entry is a group of sub-records sharing the prefix
//! `ENTRY_TAG ‖ composite key`, written and deleted together in one
//! [`WriteBatch`]. A reverse index `INDEX_TAG ‖ be_u64(id) → composite key`
//! records insertion order; its lowest key is the oldest entry.
//!
//! The entry count is not stored; it is rebuilt by scanning the index when
//! the tier is opened, which tolerates an unclean shutdown. The next
//! insertion id is the larger of the last indexed id plus one and a
//! high-water mark written with every save, so ids are never reused.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

use super::entry::{CacheEntry, CacheKey, Headers};
use super::kv::{KvStore, WriteBatch};
use crate::error::{Error, Result};

/// Prefix of every entry sub-record
pub const ENTRY_TAG: u8 = 0x01;
/// Prefix of the insertion-order index
pub const INDEX_TAG: u8 = 0x02;
/// Next-id high-water mark (`be_u64`)
pub const NEXT_ID_KEY: [u8; 1] = [0x03];

/// Insertion id (`be_u64`)
pub const ID_SUBTAG: u8 = 0x01;
/// Content bytes
pub const DATA_SUBTAG: u8 = 0x02;
/// Modification time (`be_i64` unix nanoseconds)
pub const TIME_SUBTAG: u8 = 0x03;
/// Headers (JSON object)
pub const HEADERS_SUBTAG: u8 = 0x04;

const SUBTAGS: [u8; 4] = [ID_SUBTAG, DATA_SUBTAG, TIME_SUBTAG, HEADERS_SUBTAG];

fn entry_key(composite: &[u8], subtag: u8) -> Vec<u8> {
    let mut key = Vec::with_capacity(composite.len() + 2);
    key.push(ENTRY_TAG);
    key.extend_from_slice(composite);
    key.push(subtag);
    key
}

fn index_key(id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(INDEX_TAG);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn decode_u64(bytes: &[u8], what: &str) -> Result<u64> {
    let buf: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("{} must be 8 bytes, got {}", what, bytes.len())))?;
    Ok(u64::from_be_bytes(buf))
}

fn encode_time(time: &DateTime<Utc>) -> Result<[u8; 8]> {
    time.timestamp_nanos_opt()
        .map(i64::to_be_bytes)
        .ok_or_else(|| Error::Storage(format!("timestamp {} out of range", time)))
}

fn decode_time(bytes: &[u8]) -> Result<DateTime<Utc>> {
    let nanos = decode_u64(bytes, "timestamp")? as i64;
    Ok(Utc.timestamp_nanos(nanos))
}

fn decode_headers(bytes: Option<Vec<u8>>) -> Result<Headers> {
    match bytes {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| Error::Storage(format!("invalid stored headers: {}", e))),
        None => Ok(Headers::new()),
    }
}

/// Persistent tier of the two-tier cache
pub struct DiskCache {
    store: Box<dyn KvStore>,
    max_entries: usize,
    count: usize,
    next_id: u64,
}

impl DiskCache {
    /// Open the tier on `store`, rebuilding count and next id from the index
    pub fn open(store: Box<dyn KvStore>, max_entries: usize) -> Result<Self> {
        if max_entries == 0 {
            return Err(Error::Config(
                "disk tier needs room for at least one entry".to_string(),
            ));
        }

        let index = store.scan_prefix(&[INDEX_TAG])?;
        let after_last = match index.last() {
            Some((key, _)) => decode_u64(&key[1..], "index id")? + 1,
            None => 0,
        };
        let high_water = match store.get(&NEXT_ID_KEY)? {
            Some(bytes) => decode_u64(&bytes, "next id")?,
            None => 0,
        };
        let next_id = after_last.max(high_water);
        let count = index.len();
        debug!(count, next_id, max_entries, "Disk cache opened");

        Ok(Self {
            store,
            max_entries,
            count,
            next_id,
        })
    }

    /// Number of entries on disk
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if the tier is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check whether saving a new identity would evict
    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= self.max_entries
    }

    /// Check if an identity is stored
    pub fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.stored_id(&key.composite())?.is_some())
    }

    fn stored_id(&self, composite: &[u8]) -> Result<Option<u64>> {
        self.store
            .get(&entry_key(composite, ID_SUBTAG))?
            .map(|bytes| decode_u64(&bytes, "entry id"))
            .transpose()
    }

    fn delete_ops(batch: &mut WriteBatch, composite: &[u8], id: Option<u64>) {
        for subtag in SUBTAGS {
            batch.delete(entry_key(composite, subtag));
        }
        if let Some(id) = id {
            batch.delete(index_key(id));
        }
    }

    /// Store an entry, returning the identity evicted to make room.
    ///
    /// Re-saving a stored identity replaces it in place and moves it to the
    /// back of the eviction order without evicting anything.
    pub fn save(&mut self, entry: &CacheEntry) -> Result<Option<CacheKey>> {
        let composite = entry.key.composite();
        let previous = self.stored_id(&composite)?;

        let evicted = if previous.is_none() && self.is_full() {
            self.evict_oldest()?
        } else {
            None
        };

        let mut batch = WriteBatch::new();
        self.save_ops(&mut batch, entry, composite, previous)?;
        self.store.write(batch)?;

        self.next_id += 1;
        if previous.is_none() {
            self.count += 1;
        }
        Ok(evicted)
    }

    /// Queue the records of `entry` under the next insertion id
    fn save_ops(
        &self,
        batch: &mut WriteBatch,
        entry: &CacheEntry,
        composite: Vec<u8>,
        previous: Option<u64>,
    ) -> Result<()> {
        let headers = serde_json::to_vec(&entry.headers)
            .map_err(|e| Error::Storage(format!("cannot encode headers: {}", e)))?;
        let id = self.next_id;

        if let Some(old_id) = previous {
            batch.delete(index_key(old_id));
        }
        batch
            .put(entry_key(&composite, ID_SUBTAG), id.to_be_bytes().to_vec())
            .put(entry_key(&composite, DATA_SUBTAG), entry.content.to_vec())
            .put(
                entry_key(&composite, TIME_SUBTAG),
                encode_time(&entry.modified)?.to_vec(),
            )
            .put(entry_key(&composite, HEADERS_SUBTAG), headers)
            .put(index_key(id), composite)
            .put(NEXT_ID_KEY.to_vec(), (id + 1).to_be_bytes().to_vec());
        Ok(())
    }

    /// Read an entry and delete it in the same write, for promotion to RAM
    pub fn take(&mut self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.take_replacing(key, None)
    }

    /// Take an entry and store `demoted` in its place, in one write.
    ///
    /// The slot freed by the taken entry is reused, so nothing is evicted.
    /// When `key` is not stored nothing is written and `demoted` stays with
    /// the caller. A failed write leaves the tier unchanged.
    pub fn take_replacing(
        &mut self,
        key: &CacheKey,
        demoted: Option<&CacheEntry>,
    ) -> Result<Option<CacheEntry>> {
        let composite = key.composite();
        let Some(id) = self.stored_id(&composite)? else {
            return Ok(None);
        };

        let content = self.store.get(&entry_key(&composite, DATA_SUBTAG))?;
        let modified = self.store.get(&entry_key(&composite, TIME_SUBTAG))?;
        let headers = self.store.get(&entry_key(&composite, HEADERS_SUBTAG))?;

        let mut batch = WriteBatch::new();
        Self::delete_ops(&mut batch, &composite, Some(id));
        let mut added = 0;
        if let Some(demoted) = demoted {
            let demoted_composite = demoted.key.composite();
            let previous = self.stored_id(&demoted_composite)?;
            self.save_ops(&mut batch, demoted, demoted_composite, previous)?;
            if previous.is_none() {
                added = 1;
            }
        }
        self.store.write(batch)?;

        if demoted.is_some() {
            self.next_id += 1;
        }
        self.count = self.count.saturating_sub(1) + added;

        match (content, modified) {
            (Some(content), Some(modified)) => Ok(Some(CacheEntry::new(
                key.clone(),
                Bytes::from(content),
                decode_time(&modified)?,
                decode_headers(headers)?,
            ))),
            _ => {
                warn!(key = %key, "Dropped incomplete disk cache entry");
                Ok(None)
            }
        }
    }

    /// Delete an identity; returns whether it was stored
    pub fn remove(&mut self, key: &CacheKey) -> Result<bool> {
        let composite = key.composite();
        let Some(id) = self.stored_id(&composite)? else {
            return Ok(false);
        };
        let mut batch = WriteBatch::new();
        Self::delete_ops(&mut batch, &composite, Some(id));
        self.store.write(batch)?;
        self.count = self.count.saturating_sub(1);
        Ok(true)
    }

    /// Modification time of a stored identity
    pub fn get_last_modified(&self, key: &CacheKey) -> Result<Option<DateTime<Utc>>> {
        self.store
            .get(&entry_key(&key.composite(), TIME_SUBTAG))?
            .map(|bytes| decode_time(&bytes))
            .transpose()
    }

    /// Headers of a stored identity
    pub fn headers(&self, key: &CacheKey) -> Result<Option<Headers>> {
        let composite = key.composite();
        if self.stored_id(&composite)?.is_none() {
            return Ok(None);
        }
        let headers = self.store.get(&entry_key(&composite, HEADERS_SUBTAG))?;
        decode_headers(headers).map(Some)
    }

    /// Delete the entry with the lowest insertion id.
    ///
    /// An index record whose target is gone is still removed and still
    /// counts, so the tracked count cannot drift above the real one.
    pub fn evict_oldest(&mut self) -> Result<Option<CacheKey>> {
        let Some((index, composite)) = self.store.first_with_prefix(&[INDEX_TAG])? else {
            return Ok(None);
        };

        let mut batch = WriteBatch::new();
        batch.delete(index);
        let key = match CacheKey::from_composite(&composite) {
            Ok(key) => {
                Self::delete_ops(&mut batch, &composite, None);
                Some(key)
            }
            Err(err) => {
                warn!(error = %err, "Removing unreadable disk cache index record");
                None
            }
        };
        self.store.write(batch)?;
        self.count = self.count.saturating_sub(1);

        if let Some(key) = &key {
            debug!(key = %key, "Evicted oldest disk cache entry");
        }
        Ok(key)
    }

    /// Close the underlying store
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}
