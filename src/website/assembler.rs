//! Chunk Assembler
//!
//! Rebuilds a resource from its stored chunks. Chunk keys are requested in
//! sequential batches of [`DATASTORE_BATCH_SIZE`].

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, instrument};

use super::chunk::decode_chunk_count;
use super::resolver::ResourceResolver;
use super::DATASTORE_BATCH_SIZE;
use crate::error::{Error, Result};
use crate::store::keys;

/// Fetches and concatenates resource chunks
pub struct ChunkAssembler {
    resolver: Arc<ResourceResolver>,
}

impl ChunkAssembler {
    /// Create an assembler sharing `resolver`'s store and path list cache
    pub fn new(resolver: Arc<ResourceResolver>) -> Self {
        Self { resolver }
    }

    /// Number of chunks stored for `path`
    pub async fn chunk_count(&self, address: &str, path: &str) -> Result<u32> {
        let value = self
            .resolver
            .store()
            .datastore_entry(address, &keys::chunk_count_key(path))
            .await?
            .ok_or_else(|| Error::NotFound(format!("no chunks found for file '{}'", path)))?;
        decode_chunk_count(&value)
    }

    /// Full content of `path`
    #[instrument(skip(self))]
    pub async fn fetch(&self, address: &str, path: &str) -> Result<Bytes> {
        if !self.resolver.file_path_exists(address, path).await? {
            return Err(Error::NotFound(format!("file '{}' not found", path)));
        }

        let count = self.chunk_count(address, path).await?;
        debug!(chunks = count, "Fetching chunks");

        let chunk_keys: Vec<Vec<u8>> = (0..count).map(|i| keys::chunk_key(path, i)).collect();
        let total_batches = chunk_keys.len().div_ceil(DATASTORE_BATCH_SIZE);
        let mut content = BytesMut::new();

        for (batch_no, batch) in chunk_keys.chunks(DATASTORE_BATCH_SIZE).enumerate() {
            let values = self
                .resolver
                .store()
                .datastore_entries(address, batch)
                .await?;
            if values.len() != batch.len() {
                return Err(Error::Corrupt(format!(
                    "expected {} entries, got {}",
                    batch.len(),
                    values.len()
                )));
            }

            for (offset, value) in values.into_iter().enumerate() {
                let chunk = value.filter(|chunk| !chunk.is_empty()).ok_or_else(|| {
                    Error::Corrupt(format!(
                        "empty chunk {} of '{}'",
                        batch_no * DATASTORE_BATCH_SIZE + offset,
                        path
                    ))
                })?;
                content.extend_from_slice(&chunk);
            }
            debug!("Processed batch {}/{}", batch_no + 1, total_batches);
        }

        Ok(content.freeze())
    }
}
