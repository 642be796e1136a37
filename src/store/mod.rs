//! Remote Datastore Access
//!
//! The remote datastore is a per-address key/value space that websites are
//! deployed into. It is read-only from this crate's point of view.
//!
//! - [`JsonRpcStore`]: talks to a node over JSON-RPC
//! - [`InMemoryStore`]: holds websites in memory, for tests and local tooling

pub mod keys;
mod jsonrpc;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

pub use jsonrpc::JsonRpcStore;
pub use memory::InMemoryStore;

/// Read access to the remote datastore
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Values of `keys` under `address`, positionally; absent keys are `None`.
    ///
    /// A conforming store returns one value per key. Callers that depend on
    /// that check the length themselves.
    async fn datastore_entries(&self, address: &str, keys: &[Vec<u8>])
        -> Result<Vec<Option<Bytes>>>;

    /// Every key stored under `address`
    async fn datastore_keys(&self, address: &str) -> Result<Vec<Vec<u8>>>;

    /// Value of a single key
    async fn datastore_entry(&self, address: &str, key: &[u8]) -> Result<Option<Bytes>> {
        let mut values = self.datastore_entries(address, &[key.to_vec()]).await?;
        if values.len() != 1 {
            return Err(Error::Corrupt(format!(
                "expected 1 datastore entry, got {}",
                values.len()
            )));
        }
        Ok(values.pop().flatten())
    }
}

/// Remote store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteStoreStats {
    /// `datastore_entries` calls
    pub entry_calls: u64,
    /// Keys requested across all `datastore_entries` calls
    pub keys_requested: u64,
    /// `datastore_keys` calls
    pub key_listing_calls: u64,
}
