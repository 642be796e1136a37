//! Cache Metrics Collection
//!
//! Hit, miss and tier-movement counters for the two-tier cache.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    ram_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,

    // Tier movement
    promotions: AtomicU64,
    demotions: AtomicU64,
    disk_evictions: AtomicU64,

    saves: AtomicU64,
    deletes: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ram_hit(&self) {
        self.ram_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Disk → RAM
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// RAM → disk
    pub fn record_demotion(&self) {
        self.demotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_eviction(&self) {
        self.disk_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save(&self) {
        self.saves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ram_hits(&self) -> u64 {
        self.ram_hits.load(Ordering::Relaxed)
    }

    pub fn disk_hits(&self) -> u64 {
        self.disk_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get overall cache hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.ram_hits() + self.disk_hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ram_hits: self.ram_hits(),
            disk_hits: self.disk_hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            promotions: self.promotions.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
            disk_evictions: self.disk_evictions.load(Ordering::Relaxed),
            saves: self.saves.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.ram_hits,
            &self.disk_hits,
            &self.misses,
            &self.promotions,
            &self.demotions,
            &self.disk_evictions,
            &self.saves,
            &self.deletes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub ram_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,

    // Tier movement
    pub promotions: u64,
    pub demotions: u64,
    pub disk_evictions: u64,

    pub saves: u64,
    pub deletes: u64,
}
