//! In-memory remote store
//!
//! Holds websites laid out exactly as a deployment writes them, so the whole
//! read path can run without a node.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::keys;
use super::{RemoteStore, RemoteStoreStats};
use crate::error::{Error, Result};
use crate::website::chunk::{divide_into_chunks, encode_chunk_count};

/// In-memory remote store for testing.
/// Uses DashMap for lock-free concurrent access.
#[derive(Default)]
pub struct InMemoryStore {
    /// Storage (address -> key -> value)
    storage: DashMap<String, DashMap<Vec<u8>, Bytes>>,
    /// When set, every call fails with `RemoteUnavailable`
    unavailable: AtomicBool,
    /// When set, multi-key reads drop their last value
    short_batches: AtomicBool,
    entry_calls: AtomicU64,
    keys_requested: AtomicU64,
    key_listing_calls: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a raw key
    pub fn put(&self, address: &str, key: impl Into<Vec<u8>>, value: impl Into<Bytes>) {
        self.storage
            .entry(address.to_string())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Delete a raw key; returns whether it existed
    pub fn remove(&self, address: &str, key: &[u8]) -> bool {
        self.storage
            .get(address)
            .map_or(false, |space| space.remove(key).is_some())
    }

    /// Deploy a resource: path entry, chunk count and chunks.
    ///
    /// Returns the number of chunks written.
    pub fn upload(&self, address: &str, path: &str, content: &[u8], chunk_size: usize) -> usize {
        let chunks = divide_into_chunks(content, chunk_size);
        self.put(address, keys::file_location_key(path), path.as_bytes().to_vec());
        self.put(
            address,
            keys::chunk_count_key(path),
            encode_chunk_count(chunks.len() as u32).to_vec(),
        );
        for (index, chunk) in chunks.iter().enumerate() {
            self.put(
                address,
                keys::chunk_key(path, index as u32),
                Bytes::copy_from_slice(chunk),
            );
        }
        chunks.len()
    }

    /// Set a website-wide metadata entry
    pub fn set_global_metadata(&self, address: &str, key: &str, value: &str) {
        self.put(
            address,
            keys::global_metadata_key(key.as_bytes()),
            value.as_bytes().to_vec(),
        );
    }

    /// Set a file-scoped metadata entry
    pub fn set_file_metadata(&self, address: &str, path: &str, key: &str, value: &str) {
        self.put(
            address,
            keys::file_metadata_key(path, key.as_bytes()),
            value.as_bytes().to_vec(),
        );
    }

    /// Set a website-wide HTTP header
    pub fn set_global_header(&self, address: &str, name: &str, value: &str) {
        let key = format!("{}{}", keys::HTTP_HEADER_PREFIX, name);
        self.set_global_metadata(address, &key, value);
    }

    /// Set an HTTP header for one file
    pub fn set_file_header(&self, address: &str, path: &str, name: &str, value: &str) {
        let key = format!("{}{}", keys::HTTP_HEADER_PREFIX, name);
        self.set_file_metadata(address, path, &key, value);
    }

    /// Record a deploy time, in unix seconds
    pub fn set_last_update(&self, address: &str, unix_seconds: i64) {
        self.set_global_metadata(address, keys::LAST_UPDATE_KEY, &unix_seconds.to_string());
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Answer multi-key reads with one value too few, like a misbehaving node
    pub fn set_short_batches(&self, short: bool) {
        self.short_batches.store(short, Ordering::Relaxed);
    }

    /// Get store statistics
    pub fn stats(&self) -> RemoteStoreStats {
        RemoteStoreStats {
            entry_calls: self.entry_calls.load(Ordering::Relaxed),
            keys_requested: self.keys_requested.load(Ordering::Relaxed),
            key_listing_calls: self.key_listing_calls.load(Ordering::Relaxed),
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(Error::RemoteUnavailable("in-memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn datastore_entries(
        &self,
        address: &str,
        keys: &[Vec<u8>],
    ) -> Result<Vec<Option<Bytes>>> {
        self.entry_calls.fetch_add(1, Ordering::Relaxed);
        self.keys_requested
            .fetch_add(keys.len() as u64, Ordering::Relaxed);
        self.check_available()?;

        let mut values: Vec<Option<Bytes>> = match self.storage.get(address) {
            Some(space) => keys
                .iter()
                .map(|key| space.get(key).map(|value| value.clone()))
                .collect(),
            None => vec![None; keys.len()],
        };
        if keys.len() > 1 && self.short_batches.load(Ordering::Relaxed) {
            values.pop();
        }
        Ok(values)
    }

    async fn datastore_keys(&self, address: &str) -> Result<Vec<Vec<u8>>> {
        self.key_listing_calls.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        let mut listed: Vec<Vec<u8>> = self
            .storage
            .get(address)
            .map(|space| space.iter().map(|entry| entry.key().clone()).collect())
            .unwrap_or_default();
        listed.sort();
        Ok(listed)
    }
}
