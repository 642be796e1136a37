//! Two-Tier Website Resource Cache
//!
//! Bounded RAM tier backed by a bounded persistent disk tier.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         TwoTierCache                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  RAM tier                      │ Disk tier                       │
//! │  ┌──────────────────────────┐  │ ┌─────────────────────────────┐ │
//! │  │ LRU keyed by 64-bit hash │  │ │ KvStore (SQLite / memory)   │ │
//! │  │ identity checked on read │  │ │ sub-records + FIFO index    │ │
//! │  │ max_ram_entries          │  │ │ max_disk_entries            │ │
//! │  └──────────────────────────┘  │ └─────────────────────────────┘ │
//! │            │    ▲              │        ▲         │              │
//! │            │    └── promote ───┼────────┼─────────┘              │
//! │            └────── demote ─────┼────────┘                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An entry is resident in at most one tier. Promotion happens on `read`,
//! demotion whenever RAM evicts. Both happen under one lock, so the
//! invariant holds between calls.

mod disk;
mod entry;
mod kv;
mod manager;
mod metrics;
mod ram;

pub use disk::DiskCache;
pub use entry::{CacheEntry, CacheKey, Headers};
pub use kv::{BatchOp, KvPair, KvStore, MemoryKvStore, SqliteKvStore, WriteBatch, SQLITE_FILE_NAME};
pub use manager::{CacheTier, TwoTierCache};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use ram::RamTier;
