//! deweb-cache - Website Resource Cache
//!
//! Serves website files that are deployed, in fixed-size chunks, into a
//! remote key/value datastore, and keeps assembled files in a bounded
//! two-tier local cache.
//!
//! # Architecture
//!
//! ```text
//! request ─▶ ResourceService ─▶ ResourceResolver ─▶ TwoTierCache ─┐
//!                  │                                 (RAM + disk) │ miss / stale
//!                  │                                              ▼
//!                  └──────────── ChunkAssembler + metadata ◀── RemoteStore
//! ```
//!
//! A [`NameResolutionCache`] sits in front, mapping website names to
//! datastore addresses.
//!
//! # Modules
//!
//! - [`cache`] - RAM LRU tier, persistent FIFO disk tier and their orchestration
//! - [`config`] - YAML configuration with defaults
//! - [`error`] - Error types
//! - [`names`] - Expiring name → address cache
//! - [`store`] - Remote datastore access (JSON-RPC and in-memory)
//! - [`website`] - Path resolution, chunk assembly and the resource service

pub mod cache;
pub mod config;
pub mod error;
pub mod names;
pub mod store;
pub mod website;

// Re-export commonly used types
pub use cache::{CacheTier, TwoTierCache};
pub use config::{CacheConfig, Config, NameResolutionConfig};
pub use error::{Error, Result};
pub use names::{NameResolutionCache, NameResolver};
pub use store::{InMemoryStore, JsonRpcStore, RemoteStore};
pub use website::{ResourceService, ResourceSource, WebsiteResource};
