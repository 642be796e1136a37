//! Name Resolution Cache
//!
//! Maps human-readable website names to datastore addresses for a short time,
//! so that every request for a website does not resolve its name again.
//! Failed resolutions are not cached.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::NameResolutionConfig;
use crate::error::Result;

/// Default lifetime of a resolved name
pub const DEFAULT_NAME_TTL: Duration = Duration::from_secs(16);

/// Default number of cached names
pub const DEFAULT_NAME_CACHE_SIZE: usize = 1000;

/// Resolves a website name to its datastore address
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_name(&self, name: &str) -> Result<String>;
}

struct ResolvedName {
    address: String,
    expires_at: Instant,
}

/// Bounded LRU cache of resolved names with a per-entry TTL
pub struct NameResolutionCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, ResolvedName>>,
}

impl NameResolutionCache {
    /// Create a cache; a zero `ttl` or `size` selects the default
    pub fn new(ttl: Duration, size: usize) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_NAME_TTL } else { ttl };
        let size = NonZeroUsize::new(size)
            .or(NonZeroUsize::new(DEFAULT_NAME_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            ttl,
            entries: Mutex::new(LruCache::new(size)),
        }
    }

    pub fn from_config(config: &NameResolutionConfig) -> Self {
        Self::new(config.ttl(), config.cache_size)
    }

    /// Get the address of `name`, if cached and not expired
    pub fn get(&self, name: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(name) {
            None => return None,
            Some(entry) if Instant::now() < entry.expires_at => {
                return Some(entry.address.clone())
            }
            Some(_) => {}
        }
        entries.pop(name);
        None
    }

    /// Cache `address` for `name`, refreshing its expiry.
    ///
    /// When the cache is full, expired names are dropped before the least
    /// recently used live one.
    pub fn set(&self, name: &str, address: &str) {
        let now = Instant::now();
        let entry = ResolvedName {
            address: address.to_string(),
            expires_at: now + self.ttl,
        };

        let mut entries = self.entries.lock();
        if entries.len() >= entries.cap().get() && !entries.contains(name) {
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, resolved)| resolved.expires_at <= now)
                .map(|(name, _)| name.clone())
                .collect();
            for name in expired {
                entries.pop(&name);
            }
        }
        entries.put(name.to_string(), entry);
    }

    /// Cached address of `name`, or resolve it with `resolver` and cache the result
    pub async fn resolve_with(&self, name: &str, resolver: &dyn NameResolver) -> Result<String> {
        if let Some(address) = self.get(name) {
            return Ok(address);
        }

        let address = resolver.resolve_name(name).await?;
        debug!(name = %name, address = %address, "Resolved website name");
        self.set(name, &address);
        Ok(address)
    }

    /// Number of cached names, expired ones included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}
