//! Website Resource Service
//!
//! Answers "give me resource R of website A". Cached copies are served while
//! they are at least as recent as the website's last deploy; anything else is
//! assembled from the remote datastore and written back to the cache.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::assembler::ChunkAssembler;
use super::metadata;
use super::resolver::ResourceResolver;
use crate::cache::{Headers, TwoTierCache};
use crate::error::Result;
use crate::store::RemoteStore;

// =============================================================================
// Types
// =============================================================================

/// Where a resource was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSource {
    /// RAM or disk tier of the local cache
    Cache,
    /// Assembled from the remote datastore
    Remote,
}

impl std::fmt::Display for ResourceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceSource::Cache => write!(f, "cache"),
            ResourceSource::Remote => write!(f, "remote"),
        }
    }
}

/// A served website resource
#[derive(Debug, Clone)]
pub struct WebsiteResource {
    /// Stored path the request resolved to
    pub resource: String,
    /// Assembled content
    pub content: Bytes,
    /// HTTP headers to serve with the content
    pub headers: Headers,
    /// Cache or datastore
    pub source: ResourceSource,
}

// =============================================================================
// Service
// =============================================================================

/// Serves website resources from the cache or the remote datastore
pub struct ResourceService {
    resolver: Arc<ResourceResolver>,
    assembler: ChunkAssembler,
}

impl ResourceService {
    /// Create a service reading from `store`, caching path lists for `path_list_ttl`
    pub fn new(store: Arc<dyn RemoteStore>, path_list_ttl: Duration) -> Self {
        let resolver = Arc::new(ResourceResolver::new(store, path_list_ttl));
        Self {
            assembler: ChunkAssembler::new(Arc::clone(&resolver)),
            resolver,
        }
    }

    /// Get the resolver
    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }

    /// Get the remote store
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        self.resolver.store()
    }

    /// Serve `requested` from `address`.
    ///
    /// Resolver and assembler errors propagate unchanged. Cache failures never
    /// fail the request.
    #[instrument(skip(self, cache), fields(cached = cache.is_some()))]
    pub async fn get_website_resource(
        &self,
        address: &str,
        requested: &str,
        cache: Option<&TwoTierCache>,
    ) -> Result<WebsiteResource> {
        let resource = self.resolver.resolve(address, requested).await?;

        if let Some(cache) = cache {
            self.invalidate_if_stale(address, &resource, cache).await;

            match cache.read(address, &resource) {
                Ok((content, headers)) => {
                    debug!(resource = %resource, "Serving from cache");
                    return Ok(WebsiteResource {
                        resource,
                        content,
                        headers,
                        source: ResourceSource::Cache,
                    });
                }
                Err(err) if err.is_cache_miss() => {}
                Err(err) => warn!(resource = %resource, error = %err, "Cache read failed"),
            }
        }

        let content = self.assembler.fetch(address, &resource).await?;
        let headers = metadata::http_headers(self.store().as_ref(), address, &resource).await?;
        info!(resource = %resource, bytes = content.len(), "Fetched resource from datastore");

        if let Some(cache) = cache {
            if let Err(err) = cache.save(
                address,
                &resource,
                content.clone(),
                Utc::now(),
                headers.clone(),
            ) {
                warn!(resource = %resource, error = %err, "Failed to cache resource");
            }
        }

        Ok(WebsiteResource {
            resource,
            content,
            headers,
            source: ResourceSource::Remote,
        })
    }

    /// Drop the cached copy of `resource` when the website was deployed after it.
    ///
    /// An unreadable deploy time keeps the cached copy.
    async fn invalidate_if_stale(&self, address: &str, resource: &str, cache: &TwoTierCache) {
        let cached_at = match cache.get_last_modified(address, resource) {
            Ok(modified) => modified,
            Err(err) if err.is_cache_miss() => return,
            Err(err) => {
                warn!(resource = %resource, error = %err, "Failed to read cache timestamp");
                return;
            }
        };

        let deployed_at =
            match metadata::last_update_timestamp(self.store().as_ref(), address).await {
                Ok(deployed_at) => deployed_at,
                Err(err) => {
                    warn!(
                        address = %address,
                        error = %err,
                        "Last update time unavailable, serving cached copy"
                    );
                    return;
                }
            };

        if deployed_at > cached_at {
            debug!(resource = %resource, %cached_at, %deployed_at, "Cached copy is stale");
            if let Err(err) = cache.delete(address, resource) {
                warn!(resource = %resource, error = %err, "Failed to delete stale entry");
            }
        }
    }
}
