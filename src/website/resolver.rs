//! Resource Resolver
//!
//! Maps a requested path to the path a website actually stores, using the
//! website's path list. Path lists are cached per address for a short TTL.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, instrument};

use super::DATASTORE_BATCH_SIZE;
use crate::error::{Error, Result};
use crate::store::keys;
use crate::store::RemoteStore;

/// Fallback document for single-page applications
pub const INDEX_HTML: &str = "index.html";

const HTML_SUFFIX: &str = ".html";

/// Set of paths a website stores
pub type PathList = Arc<HashSet<String>>;

struct PathListEntry {
    paths: PathList,
    expires_at: Instant,
}

/// Per-address path list cache with a fixed TTL
pub struct FilePathListCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, PathListEntry>>,
}

impl FilePathListCache {
    /// Create a cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached path list of `address`, if present and not expired
    pub fn get(&self, address: &str) -> Option<PathList> {
        let entries = self.entries.read();
        entries
            .get(address)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| Arc::clone(&entry.paths))
    }

    /// Store the path list of `address`, dropping expired lists of any address
    pub fn set(&self, address: &str, paths: impl IntoIterator<Item = String>) -> PathList {
        let now = Instant::now();
        let paths: PathList = Arc::new(paths.into_iter().collect());

        let mut entries = self.entries.write();
        entries.retain(|_, entry| now < entry.expires_at);
        entries.insert(
            address.to_string(),
            PathListEntry {
                paths: Arc::clone(&paths),
                expires_at: now + self.ttl,
            },
        );
        paths
    }

    /// Forget the path list of `address`
    pub fn invalidate(&self, address: &str) {
        self.entries.write().remove(address);
    }

    /// Number of stored lists, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Resolves requested paths against a website's stored paths
pub struct ResourceResolver {
    store: Arc<dyn RemoteStore>,
    path_lists: FilePathListCache,
}

impl ResourceResolver {
    /// Create a resolver caching path lists for `path_list_ttl`
    pub fn new(store: Arc<dyn RemoteStore>, path_list_ttl: Duration) -> Self {
        Self {
            store,
            path_lists: FilePathListCache::new(path_list_ttl),
        }
    }

    /// The remote store this resolver reads from
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// The path list cache
    pub fn path_lists(&self) -> &FilePathListCache {
        &self.path_lists
    }

    /// Every path stored by `address`
    #[instrument(skip(self))]
    pub async fn file_paths(&self, address: &str) -> Result<PathList> {
        if let Some(paths) = self.path_lists.get(address) {
            return Ok(paths);
        }

        let location_keys: Vec<Vec<u8>> = self
            .store
            .datastore_keys(address)
            .await?
            .into_iter()
            .filter(|key| keys::is_file_location_key(key))
            .collect();

        let mut paths = Vec::with_capacity(location_keys.len());
        for batch in location_keys.chunks(DATASTORE_BATCH_SIZE) {
            let values = self.store.datastore_entries(address, batch).await?;
            if values.len() != batch.len() {
                return Err(Error::Corrupt(format!(
                    "expected {} path entries, got {}",
                    batch.len(),
                    values.len()
                )));
            }
            paths.extend(
                values
                    .into_iter()
                    .flatten()
                    .map(|value| String::from_utf8_lossy(&value).into_owned()),
            );
        }

        debug!(paths = paths.len(), "Fetched website path list");
        Ok(self.path_lists.set(address, paths))
    }

    /// Check whether `address` stores `path`
    pub async fn file_path_exists(&self, address: &str, path: &str) -> Result<bool> {
        Ok(self.file_paths(address).await?.contains(path))
    }

    /// Canonical path for a request.
    ///
    /// Tries `requested`, then `requested.html` (when it lacks the suffix),
    /// then `index.html`. Returns the first stored candidate, or the last one
    /// tried when none is stored.
    #[instrument(skip(self))]
    pub async fn resolve(&self, address: &str, requested: &str) -> Result<String> {
        let mut candidate = requested.to_string();
        if self.file_path_exists(address, &candidate).await? {
            return Ok(candidate);
        }

        if !candidate.ends_with(HTML_SUFFIX) {
            candidate.push_str(HTML_SUFFIX);
            if self.file_path_exists(address, &candidate).await? {
                debug!(resolved = %candidate, "Resolved with .html suffix");
                return Ok(candidate);
            }
        }

        if candidate != INDEX_HTML {
            candidate = INDEX_HTML.to_string();
            if self.file_path_exists(address, &candidate).await? {
                debug!("Falling back to index.html");
                return Ok(candidate);
            }
        }

        debug!(candidate = %candidate, "No stored candidate for requested path");
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn site(paths: &[&str]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for path in paths {
            store.upload("AS1", path, b"content", 4);
        }
        store
    }

    fn resolver(store: &Arc<InMemoryStore>) -> ResourceResolver {
        ResourceResolver::new(store.clone(), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_file_paths() {
        let store = site(&["index.html", "assets/app.js"]);
        store.set_last_update("AS1", 1);
        let resolver = resolver(&store);

        let paths = resolver.file_paths("AS1").await.unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains("assets/app.js"));
        assert!(resolver.file_path_exists("AS1", "index.html").await.unwrap());
        assert!(!resolver.file_path_exists("AS1", "nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_path_list_is_cached() {
        let store = site(&["index.html"]);
        let resolver = resolver(&store);

        resolver.file_paths("AS1").await.unwrap();
        resolver.file_paths("AS1").await.unwrap();
        resolver.file_path_exists("AS1", "x").await.unwrap();
        assert_eq!(store.stats().key_listing_calls, 1);
    }

    #[tokio::test]
    async fn test_path_list_is_batched() {
        let names: Vec<String> = (0..130).map(|i| format!("page-{}.html", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let store = site(&refs);
        let resolver = resolver(&store);

        let paths = resolver.file_paths("AS1").await.unwrap();
        assert_eq!(paths.len(), 130);
        // 64 + 64 + 2
        assert_eq!(store.stats().entry_calls, 3);
    }

    #[tokio::test]
    async fn test_resolve_exact() {
        let store = site(&["index.html", "about.html", "app.js"]);
        let resolver = resolver(&store);
        assert_eq!(resolver.resolve("AS1", "app.js").await.unwrap(), "app.js");
        assert_eq!(resolver.resolve("AS1", "about.html").await.unwrap(), "about.html");
    }

    #[tokio::test]
    async fn test_resolve_adds_html_suffix() {
        let store = site(&["index.html", "about.html"]);
        let resolver = resolver(&store);
        assert_eq!(resolver.resolve("AS1", "about").await.unwrap(), "about.html");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_index() {
        let store = site(&["index.html"]);
        let resolver = resolver(&store);
        assert_eq!(resolver.resolve("AS1", "missing").await.unwrap(), "index.html");
        assert_eq!(resolver.resolve("AS1", "gone.html").await.unwrap(), "index.html");
    }

    #[tokio::test]
    async fn test_resolve_returns_last_candidate() {
        let store = site(&["app.js"]);
        let resolver = resolver(&store);
        assert_eq!(resolver.resolve("AS1", "missing").await.unwrap(), "index.html");
        assert_eq!(resolver.resolve("AS1", "index").await.unwrap(), "index.html");
    }

    #[tokio::test]
    async fn test_resolve_propagates_remote_errors() {
        let store = site(&["index.html"]);
        store.set_unavailable(true);
        let resolver = resolver(&store);
        let err = resolver.resolve("AS1", "index.html").await.unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_short_path_batch_is_corrupt() {
        let store = site(&["index.html", "about.html"]);
        store.set_short_batches(true);
        let resolver = resolver(&store);

        let err = resolver.file_paths("AS1").await.unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
        assert!(resolver.path_lists().get("AS1").is_none());
    }

    #[test]
    fn test_path_list_cache_expiry() {
        let cache = FilePathListCache::new(Duration::from_millis(20));
        cache.set("AS1", vec!["a".to_string()]);
        assert!(cache.get("AS1").unwrap().contains("a"));

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("AS1").is_none());

        // Setting another address purges the expired list
        cache.set("AS2", vec![]);
        assert_eq!(cache.len(), 1);
        cache.invalidate("AS2");
        assert!(cache.is_empty());
    }
}
