//! RAM Tier - bounded in-memory LRU
//!
//! Entries are keyed by the 64-bit [`CacheKey::ram_hash`] and carry their full
//! identity, which is checked on every lookup. Nothing here touches the disk:
//! evicted or displaced entries are handed back to the caller, which demotes
//! them while it still holds the cache lock.

use std::num::NonZeroUsize;

use lru::LruCache;

use super::entry::{CacheEntry, CacheKey};

/// RAM tier of the two-tier cache
pub struct RamTier {
    entries: LruCache<u64, CacheEntry>,
}

impl RamTier {
    /// Create a RAM tier holding at most `capacity` entries
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Look up an entry and mark it most recently used
    pub fn get(&mut self, key: &CacheKey) -> Option<&CacheEntry> {
        let hash = key.ram_hash();
        // Identity check goes through peek so a colliding lookup leaves the
        // LRU order untouched.
        if !self.holds(hash, key) {
            return None;
        }
        self.entries.get(&hash)
    }

    /// Look up an entry without changing the LRU order
    pub fn peek(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries
            .peek(&key.ram_hash())
            .filter(|entry| entry.key == *key)
    }

    /// Remove an entry, returning it if this identity was resident
    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let hash = key.ram_hash();
        if !self.holds(hash, key) {
            return None;
        }
        self.entries.pop(&hash)
    }

    /// Insert an entry as most recently used.
    ///
    /// Returns an entry of a *different* identity that lost its slot, either
    /// because the tier was full or because both identities share a RAM
    /// hash. Callers that want no implicit eviction call [`RamTier::pop_lru`]
    /// first when [`RamTier::is_full`].
    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let hash = entry.key.ram_hash();
        let key = entry.key.clone();
        match self.entries.push(hash, entry) {
            Some((_, displaced)) if displaced.key != key => Some(displaced),
            _ => None,
        }
    }

    /// Remove and return the least recently used entry
    pub fn pop_lru(&mut self) -> Option<CacheEntry> {
        self.entries.pop_lru().map(|(_, entry)| entry)
    }

    /// Remove the entry an insert of `key` would push out, if any.
    ///
    /// That is a resident identity sharing the RAM hash, or the least
    /// recently used entry when the tier is full. Re-inserting a resident
    /// identity pushes nothing out.
    pub fn pop_displaced(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let hash = key.ram_hash();
        match self.entries.peek(&hash) {
            Some(entry) if entry.key == *key => None,
            Some(_) => self.entries.pop(&hash),
            None if self.is_full() => self.pop_lru(),
            None => None,
        }
    }

    /// Put back an entry taken by [`RamTier::pop_displaced`], as least
    /// recently used
    pub fn restore(&mut self, entry: CacheEntry) {
        let hash = entry.key.ram_hash();
        self.entries.push(hash, entry);
        self.entries.demote(&hash);
    }

    /// Remove every entry, least recently used first
    pub fn drain(&mut self) -> Vec<CacheEntry> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.pop_lru() {
            drained.push(entry);
        }
        drained
    }

    /// Check whether an insert of a new identity would evict
    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.entries.cap().get()
    }

    /// Number of resident entries
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the tier is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn holds(&self, hash: u64, key: &CacheKey) -> bool {
        self.entries
            .peek(&hash)
            .map_or(false, |entry| entry.key == *key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;

    use crate::cache::entry::Headers;

    fn make_key(resource: &str) -> CacheKey {
        CacheKey::new("site", resource)
    }

    fn make_entry(resource: &str, content: &'static [u8]) -> CacheEntry {
        CacheEntry::new(
            make_key(resource),
            Bytes::from_static(content),
            Utc::now(),
            Headers::new(),
        )
    }

    fn tier(capacity: usize) -> RamTier {
        RamTier::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn test_insert_and_get() {
        let mut ram = tier(4);
        assert!(ram.insert(make_entry("a", b"alpha")).is_none());

        let entry = ram.get(&make_key("a")).unwrap();
        assert_eq!(entry.content, Bytes::from_static(b"alpha"));
        assert!(ram.get(&make_key("b")).is_none());
        assert_eq!(ram.len(), 1);
    }

    #[test]
    fn test_get_promotes_peek_does_not() {
        let mut ram = tier(2);
        ram.insert(make_entry("a", b"1"));
        ram.insert(make_entry("b", b"2"));

        // peek leaves "a" as LRU
        assert!(ram.peek(&make_key("a")).is_some());
        assert_eq!(ram.pop_lru().unwrap().key, make_key("a"));

        ram.insert(make_entry("a", b"1"));
        // get makes "b" the LRU
        assert!(ram.get(&make_key("b")).is_some());
        assert_eq!(ram.pop_lru().unwrap().key, make_key("a"));
    }

    #[test]
    fn test_insert_when_full_returns_lru() {
        let mut ram = tier(2);
        ram.insert(make_entry("a", b"1"));
        ram.insert(make_entry("b", b"2"));
        assert!(ram.is_full());

        let displaced = ram.insert(make_entry("c", b"3")).unwrap();
        assert_eq!(displaced.key, make_key("a"));
        assert_eq!(ram.len(), 2);
    }

    #[test]
    fn test_replacing_same_identity_returns_nothing() {
        let mut ram = tier(2);
        ram.insert(make_entry("a", b"old"));
        assert!(ram.insert(make_entry("a", b"new")).is_none());
        assert_eq!(
            ram.peek(&make_key("a")).unwrap().content,
            Bytes::from_static(b"new")
        );
        assert_eq!(ram.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut ram = tier(2);
        ram.insert(make_entry("a", b"1"));
        assert!(ram.remove(&make_key("a")).is_some());
        assert!(ram.remove(&make_key("a")).is_none());
        assert!(ram.is_empty());
    }

    #[test]
    fn test_drain_oldest_first() {
        let mut ram = tier(3);
        ram.insert(make_entry("a", b"1"));
        ram.insert(make_entry("b", b"2"));
        ram.insert(make_entry("c", b"3"));
        ram.get(&make_key("a"));

        let order: Vec<_> = ram
            .drain()
            .into_iter()
            .map(|e| e.key.resource().to_string())
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert!(ram.is_empty());
    }

    #[test]
    fn test_pop_displaced() {
        let mut ram = tier(2);
        ram.insert(make_entry("a", b"1"));
        assert!(ram.pop_displaced(&make_key("b")).is_none());

        ram.insert(make_entry("b", b"2"));
        assert!(ram.is_full());
        // a resident identity is replaced in place
        assert!(ram.pop_displaced(&make_key("b")).is_none());

        let displaced = ram.pop_displaced(&make_key("c")).unwrap();
        assert_eq!(displaced.key, make_key("a"));
        assert_eq!(ram.len(), 1);
    }

    #[test]
    fn test_restore_as_lru() {
        let mut ram = tier(2);
        ram.insert(make_entry("a", b"1"));
        ram.insert(make_entry("b", b"2"));

        let displaced = ram.pop_displaced(&make_key("c")).unwrap();
        ram.restore(displaced);
        assert_eq!(ram.len(), 2);
        assert_eq!(ram.pop_lru().unwrap().key, make_key("a"));
    }
}
