//! Chunking
//!
//! Resources are stored as consecutive chunks of at most [`CHUNK_SIZE`] bytes
//! plus a chunk count. The count is a 4-byte little-endian signed integer.

use crate::error::{Error, Result};

/// Chunk size used when deploying a website
pub const CHUNK_SIZE: usize = 64_000;

/// Split `data` into chunks of at most `chunk_size` bytes.
///
/// Every chunk but the last is exactly `chunk_size` long. Empty data or a
/// zero chunk size yields no chunks.
pub fn divide_into_chunks(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if data.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    data.chunks(chunk_size).collect()
}

/// Encode a chunk count as stored in the datastore
pub fn encode_chunk_count(count: u32) -> [u8; 4] {
    (count as i32).to_le_bytes()
}

/// Decode a stored chunk count; zero, negative and wrongly sized values are corrupt
pub fn decode_chunk_count(bytes: &[u8]) -> Result<u32> {
    let buf: [u8; 4] = bytes.try_into().map_err(|_| {
        Error::Corrupt(format!(
            "chunk count must be 4 bytes, got {}",
            bytes.len()
        ))
    })?;
    let count = i32::from_le_bytes(buf);
    if count <= 0 {
        return Err(Error::Corrupt(format!("invalid chunk count {}", count)));
    }
    Ok(count as u32)
}
