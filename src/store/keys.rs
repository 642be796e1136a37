//! Datastore key layout
//!
//! Every key a website occupies in the remote datastore is built here:
//!
//! ```text
//! FILE_TAG ‖ sha256(path) ‖ CHUNK_NB_TAG                    chunk count
//! FILE_TAG ‖ sha256(path) ‖ CHUNK_TAG ‖ be_u32(index)       chunk bytes
//! FILE_LOCATION_TAG ‖ sha256(path)                          path (value)
//! FILE_METADATA_TAG ‖ sha256(path) ‖ key                    file metadata
//! GLOBAL_METADATA_TAG ‖ key                                 global metadata
//! ```

use sha2::{Digest, Sha256};

pub const FILE_TAG: &[u8] = b"\x01FILE";
pub const FILE_LOCATION_TAG: &[u8] = b"\x02LOCATION";
pub const CHUNK_TAG: &[u8] = b"\x03CHUNK";
pub const CHUNK_NB_TAG: &[u8] = b"\x04CHUNK_NB";
pub const FILE_METADATA_TAG: &[u8] = b"\x05FM";
pub const GLOBAL_METADATA_TAG: &[u8] = b"\x06GM";

/// Metadata key prefix marking an HTTP header
pub const HTTP_HEADER_PREFIX: &str = "http-header:";

/// Global metadata key holding the last deploy time (decimal unix seconds)
pub const LAST_UPDATE_KEY: &str = "LAST_UPDATE";

/// SHA-256 of a resource path
pub fn path_hash(path: &str) -> [u8; 32] {
    Sha256::digest(path.as_bytes()).into()
}

fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// Key of a resource's chunk count
pub fn chunk_count_key(path: &str) -> Vec<u8> {
    concat(&[FILE_TAG, &path_hash(path), CHUNK_NB_TAG])
}

/// Key of one chunk of a resource
pub fn chunk_key(path: &str, index: u32) -> Vec<u8> {
    concat(&[FILE_TAG, &path_hash(path), CHUNK_TAG, &index.to_be_bytes()])
}

/// Key whose value is the resource path itself
pub fn file_location_key(path: &str) -> Vec<u8> {
    concat(&[FILE_LOCATION_TAG, &path_hash(path)])
}

/// Key of a file-scoped metadata entry
pub fn file_metadata_key(path: &str, key: &[u8]) -> Vec<u8> {
    concat(&[FILE_METADATA_TAG, &path_hash(path), key])
}

/// Key of a website-wide metadata entry
pub fn global_metadata_key(key: &[u8]) -> Vec<u8> {
    concat(&[GLOBAL_METADATA_TAG, key])
}

/// True for keys listing a resource path (tag followed by at least one byte)
pub fn is_file_location_key(key: &[u8]) -> bool {
    key.len() > FILE_LOCATION_TAG.len() && key.starts_with(FILE_LOCATION_TAG)
}
