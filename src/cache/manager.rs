//! Cache Manager - Two-Tier Website Resource Cache
//!
//! Combines the RAM tier (LRU) with the disk tier (FIFO). An entry lives in
//! exactly one tier: reads promote disk entries into RAM, and whatever RAM
//! evicts is demoted to disk in the same critical section.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::disk::DiskCache;
use super::entry::{CacheEntry, CacheKey, Headers};
use super::kv::{KvStore, SqliteKvStore};
use super::metrics::{CacheMetrics, MetricsSnapshot};
use super::ram::RamTier;
use crate::config::CacheConfig;
use crate::error::{Error, Result};

/// Cache tier enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// In-memory LRU
    Ram,
    /// Persistent FIFO
    Disk,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::Ram => write!(f, "RAM"),
            CacheTier::Disk => write!(f, "disk"),
        }
    }
}

struct Tiers {
    ram: RamTier,
    disk: DiskCache,
}

/// Two-tier cache of assembled website resources
pub struct TwoTierCache {
    tiers: Mutex<Tiers>,
    metrics: Arc<CacheMetrics>,
}

impl TwoTierCache {
    /// Open a cache whose disk tier lives in `config.disk_cache_dir`
    pub fn open(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let store = SqliteKvStore::open(&config.disk_cache_dir)?;
        Self::with_store(config, Box::new(store))
    }

    /// Open a cache on an arbitrary storage engine
    pub fn with_store(config: &CacheConfig, store: Box<dyn KvStore>) -> Result<Self> {
        config.validate()?;
        let ram_capacity = NonZeroUsize::new(config.max_ram_entries)
            .ok_or_else(|| Error::Config("max_ram_entries must be at least 1".into()))?;
        let disk = DiskCache::open(store, config.max_disk_entries)?;

        info!(
            max_ram_entries = config.max_ram_entries,
            max_disk_entries = config.max_disk_entries,
            disk_entries = disk.len(),
            "Website cache opened"
        );

        Ok(Self {
            tiers: Mutex::new(Tiers {
                ram: RamTier::new(ram_capacity),
                disk,
            }),
            metrics: Arc::new(CacheMetrics::new()),
        })
    }

    /// Get content and headers, promoting a disk entry into RAM.
    ///
    /// Absent from both tiers is [`Error::CacheMiss`]. The promotion and the
    /// demotion it causes are one disk write; if it fails both entries stay
    /// where they were and the error is returned.
    pub fn read(&self, address: &str, resource: &str) -> Result<(Bytes, Headers)> {
        let key = CacheKey::new(address, resource);
        let mut tiers = self.tiers.lock();

        if let Some(entry) = tiers.ram.get(&key) {
            self.metrics.record_ram_hit();
            return Ok((entry.content.clone(), entry.headers.clone()));
        }

        if !tiers.disk.contains(&key)? {
            self.metrics.record_miss();
            return Err(Error::cache_miss(address, resource));
        }

        let displaced = tiers.ram.pop_displaced(&key);
        let taken = match tiers.disk.take_replacing(&key, displaced.as_ref()) {
            Ok(taken) => taken,
            Err(err) => {
                warn!(key = %key, error = %err, "Failed to promote cache entry");
                if let Some(entry) = displaced {
                    tiers.ram.restore(entry);
                }
                return Err(err);
            }
        };
        if let Some(demoted) = &displaced {
            self.metrics.record_demotion();
            debug!(key = %demoted.key, "Demoted entry from RAM to disk");
        }

        let Some(entry) = taken else {
            self.metrics.record_miss();
            return Err(Error::cache_miss(address, resource));
        };

        self.metrics.record_disk_hit();
        self.metrics.record_promotion();
        debug!(key = %key, "Promoted entry from disk to RAM");

        let found = (entry.content.clone(), entry.headers.clone());
        tiers.ram.insert(entry);
        Ok(found)
    }

    /// Store a resource, replacing any previous version in either tier
    pub fn save(
        &self,
        address: &str,
        resource: &str,
        content: Bytes,
        modified: DateTime<Utc>,
        headers: Headers,
    ) -> Result<()> {
        let key = CacheKey::new(address, resource);
        let mut tiers = self.tiers.lock();

        tiers.ram.remove(&key);
        tiers.disk.remove(&key)?;

        self.metrics.record_save();
        self.insert_ram(
            &mut tiers,
            CacheEntry::new(key, content, modified, headers),
        )
    }

    /// Modification time recorded at save, without touching LRU order
    pub fn get_last_modified(&self, address: &str, resource: &str) -> Result<DateTime<Utc>> {
        let key = CacheKey::new(address, resource);
        let tiers = self.tiers.lock();

        if let Some(entry) = tiers.ram.peek(&key) {
            return Ok(entry.modified);
        }
        tiers
            .disk
            .get_last_modified(&key)?
            .ok_or_else(|| Error::cache_miss(address, resource))
    }

    /// Stored headers, without touching LRU order
    pub fn headers(&self, address: &str, resource: &str) -> Result<Headers> {
        let key = CacheKey::new(address, resource);
        let tiers = self.tiers.lock();

        if let Some(entry) = tiers.ram.peek(&key) {
            return Ok(entry.headers.clone());
        }
        tiers
            .disk
            .headers(&key)?
            .ok_or_else(|| Error::cache_miss(address, resource))
    }

    /// A single stored header; names compare case-insensitively
    pub fn header(&self, address: &str, resource: &str, name: &str) -> Result<Option<String>> {
        let headers = self.headers(address, resource)?;
        Ok(headers
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value))
    }

    /// Remove a resource from both tiers (idempotent)
    pub fn delete(&self, address: &str, resource: &str) -> Result<()> {
        let key = CacheKey::new(address, resource);
        let mut tiers = self.tiers.lock();

        let in_ram = tiers.ram.remove(&key).is_some();
        let on_disk = tiers.disk.remove(&key)?;
        if in_ram || on_disk {
            self.metrics.record_delete();
            debug!(key = %key, "Deleted cache entry");
        }
        Ok(())
    }

    /// Which tier holds a resource, if any
    pub fn tier_of(&self, address: &str, resource: &str) -> Result<Option<CacheTier>> {
        let key = CacheKey::new(address, resource);
        let tiers = self.tiers.lock();

        if tiers.ram.peek(&key).is_some() {
            return Ok(Some(CacheTier::Ram));
        }
        Ok(tiers.disk.contains(&key)?.then_some(CacheTier::Disk))
    }

    /// Number of entries in RAM
    pub fn ram_len(&self) -> usize {
        self.tiers.lock().ram.len()
    }

    /// Number of entries on disk
    pub fn disk_len(&self) -> usize {
        self.tiers.lock().disk.len()
    }

    /// Get cache metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Flush every RAM entry to disk and close the store.
    ///
    /// Entries are flushed least recently used first, so with a full disk
    /// tier the most recently used ones are the survivors.
    pub fn close(self) -> Result<()> {
        let Tiers { mut ram, mut disk } = self.tiers.into_inner();
        let entries = ram.drain();
        let flushed = entries.len();

        let mut first_err = None;
        for entry in entries {
            if let Err(err) = disk.save(&entry) {
                warn!(key = %entry.key, error = %err, "Failed to flush cache entry");
                first_err.get_or_insert(err);
            }
        }
        info!(flushed, disk_entries = disk.len(), "Website cache closed");

        disk.close()?;
        first_err.map_or(Ok(()), Err)
    }

    // =========================================================================
    // Tier movement
    // =========================================================================

    /// Insert into RAM, demoting whatever loses its slot first.
    ///
    /// If the demotion fails the displaced entry goes back into RAM, `entry`
    /// is not inserted and the error is returned.
    fn insert_ram(&self, tiers: &mut Tiers, entry: CacheEntry) -> Result<()> {
        if let Some(displaced) = tiers.ram.pop_displaced(&entry.key) {
            if let Err(err) = self.demote(&mut tiers.disk, &displaced) {
                warn!(key = %displaced.key, error = %err, "Failed to demote cache entry");
                tiers.ram.restore(displaced);
                return Err(err);
            }
        }
        tiers.ram.insert(entry);
        Ok(())
    }

    fn demote(&self, disk: &mut DiskCache, entry: &CacheEntry) -> Result<()> {
        if let Some(evicted) = disk.save(entry)? {
            self.metrics.record_disk_eviction();
            debug!(key = %evicted, "Disk tier full, evicted oldest entry");
        }
        self.metrics.record_demotion();
        debug!(key = %entry.key, "Demoted entry from RAM to disk");
        Ok(())
    }
}
