//! Cache Entry Types
//!
//! Identity, key encodings and the cached value shared by both tiers.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// HTTP-header-like metadata stored with every resource
pub type Headers = HashMap<String, String>;

/// Size of a length prefix in the composite disk key
const LEN_PREFIX: usize = 8;

/// Cache key - (website address, resource path) identity
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    address: String,
    resource: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(address: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            resource: resource.into(),
        }
    }

    /// Website address
    #[inline]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Resource path within the website
    #[inline]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// 64-bit key used by the RAM tier.
    ///
    /// FxHash over both components, each preceded by its length so that
    /// ("ab", "c") and ("a", "bc") hash differently.
    #[inline]
    pub fn ram_hash(&self) -> u64 {
        const SEED: u64 = 0x517cc1b727220a95;
        let mut hash = SEED;
        for part in [self.address.as_bytes(), self.resource.as_bytes()] {
            for byte in (part.len() as u64).to_be_bytes().iter().chain(part) {
                hash = hash.rotate_left(5) ^ (*byte as u64);
                hash = hash.wrapping_mul(SEED);
            }
        }
        hash
    }

    /// Length-prefixed encoding used as the disk key:
    /// `be_u64(len(address)) ‖ address ‖ be_u64(len(resource)) ‖ resource`
    pub fn composite(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(2 * LEN_PREFIX + self.address.len() + self.resource.len());
        buf.extend_from_slice(&(self.address.len() as u64).to_be_bytes());
        buf.extend_from_slice(self.address.as_bytes());
        buf.extend_from_slice(&(self.resource.len() as u64).to_be_bytes());
        buf.extend_from_slice(self.resource.as_bytes());
        buf
    }

    /// Decode a key produced by [`CacheKey::composite`]
    pub fn from_composite(bytes: &[u8]) -> Result<Self> {
        let (address, rest) = take_prefixed(bytes)?;
        let (resource, rest) = take_prefixed(rest)?;
        if !rest.is_empty() {
            return Err(Error::Storage(format!(
                "trailing {} bytes in composite cache key",
                rest.len()
            )));
        }
        Ok(Self::new(address, resource))
    }
}

fn take_prefixed(bytes: &[u8]) -> Result<(String, &[u8])> {
    if bytes.len() < LEN_PREFIX {
        return Err(Error::Storage("truncated composite cache key".to_string()));
    }
    let (len_bytes, rest) = bytes.split_at(LEN_PREFIX);
    let mut len_buf = [0u8; LEN_PREFIX];
    len_buf.copy_from_slice(len_bytes);
    let len = u64::from_be_bytes(len_buf) as usize;
    if rest.len() < len {
        return Err(Error::Storage("truncated composite cache key".to_string()));
    }
    let (value, rest) = rest.split_at(len);
    let value = String::from_utf8(value.to_vec())
        .map_err(|e| Error::Storage(format!("invalid utf-8 in cache key: {}", e)))?;
    Ok((value, rest))
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.resource)
    }
}

/// A cached resource, resident in exactly one tier
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// Identity
    pub key: CacheKey,
    /// Assembled resource content
    pub content: Bytes,
    /// Modification time recorded at save (opaque to the cache)
    pub modified: DateTime<Utc>,
    /// HTTP headers to serve with the content
    pub headers: Headers,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(key: CacheKey, content: Bytes, modified: DateTime<Utc>, headers: Headers) -> Self {
        Self {
            key,
            content,
            modified,
            headers,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_accessors() {
        let key = CacheKey::new("AS12abc", "assets/app.js");
        assert_eq!(key.address(), "AS12abc");
        assert_eq!(key.resource(), "assets/app.js");
        assert_eq!(key.to_string(), "AS12abc/assets/app.js");
    }

    #[test]
    fn test_ram_hash_is_stable() {
        let a = CacheKey::new("site", "index.html");
        let b = CacheKey::new("site", "index.html");
        assert_eq!(a.ram_hash(), b.ram_hash());
    }

    #[test]
    fn test_ram_hash_respects_component_boundaries() {
        let a = CacheKey::new("ab", "c");
        let b = CacheKey::new("a", "bc");
        assert_ne!(a.ram_hash(), b.ram_hash());
        assert_ne!(
            CacheKey::new("x", "y").ram_hash(),
            CacheKey::new("y", "x").ram_hash()
        );
    }

    #[test]
    fn test_composite_layout() {
        let key = CacheKey::new("ab", "c");
        let encoded = key.composite();
        assert_eq!(
            encoded,
            vec![0, 0, 0, 0, 0, 0, 0, 2, b'a', b'b', 0, 0, 0, 0, 0, 0, 0, 1, b'c']
        );
    }

    #[test]
    fn test_composite_is_unambiguous() {
        let a = CacheKey::new("ab", "c").composite();
        let b = CacheKey::new("a", "bc").composite();
        assert_ne!(a, b);
    }

    #[test]
    fn test_composite_decode() {
        let key = CacheKey::new("AS1site", "dir/page.html");
        let decoded = CacheKey::from_composite(&key.composite()).unwrap();
        assert_eq!(decoded, key);

        let empty = CacheKey::new("", "");
        assert_eq!(CacheKey::from_composite(&empty.composite()).unwrap(), empty);
    }

    #[test]
    fn test_composite_decode_rejects_truncated() {
        let mut encoded = CacheKey::new("site", "file").composite();
        encoded.truncate(encoded.len() - 1);
        assert!(matches!(
            CacheKey::from_composite(&encoded),
            Err(Error::Storage(_))
        ));
        assert!(CacheKey::from_composite(&[0, 0, 1]).is_err());
    }
}
