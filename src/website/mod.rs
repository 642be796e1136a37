//! Website Resources
//!
//! Turns a request for `(address, path)` into content and headers read from
//! the remote datastore.
//!
//! # Components
//!
//! - [`ResourceResolver`]: maps a requested path onto a stored one
//! - [`ChunkAssembler`]: reads the chunk count, then the chunks in batches
//! - [`metadata`]: HTTP headers and the last deploy time
//! - [`ResourceService`]: ties the above to the two-tier cache

mod assembler;
pub mod chunk;
pub mod metadata;
mod proptest;
pub mod resolver;
mod service;

pub use assembler::ChunkAssembler;
pub use chunk::{divide_into_chunks, CHUNK_SIZE};
pub use resolver::{FilePathListCache, PathList, ResourceResolver, INDEX_HTML};
pub use service::{ResourceService, ResourceSource, WebsiteResource};

/// Maximum number of keys requested from the datastore in one call
pub const DATASTORE_BATCH_SIZE: usize = 64;
