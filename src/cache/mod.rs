//! The parse cache (C1): a bounded, concurrent LRU mapping file-identity to
//! a parsed syntax tree, its source bytes, and a derived root node.
//!
//! Tree-sitter's `Tree` already owns its native resources and frees them on
//! `Drop`, so in Rust the "exclusive ownership, closed exactly once on
//! eviction" invariant from spec §3.2/§4.1/§9 falls straight out of normal
//! ownership: `CachedParse` owns the `Tree`; when an entry is evicted,
//! removed, or the cache is cleared, the `Tree` is dropped and its memory
//! reclaimed. No component may retain a `Node` borrowed from a `CachedParse`
//! past that point — `Node`'s lifetime is tied to `&CachedParse` by
//! `root_node()`, so the borrow checker enforces it statically instead of at
//! runtime.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tree_sitter::{Node, Tree};

/// A cached parse result: the owned tree, its source bytes, and a coarse
/// memory estimate (`6 × byte_len`, per spec §4.1/§9).
pub struct CachedParse {
    tree: Tree,
    source_bytes: std::sync::Arc<[u8]>,
    memory_estimate: usize,
}

impl CachedParse {
    pub fn new(tree: Tree, source_bytes: impl Into<std::sync::Arc<[u8]>>) -> Self {
        let source_bytes = source_bytes.into();
        let memory_estimate = Self::estimate_memory(source_bytes.len());
        Self {
            tree,
            source_bytes,
            memory_estimate,
        }
    }

    /// The deliberately coarse memory estimator from spec §4.1/§9. Kept as a
    /// named function (not inlined) so a future monotone estimator can
    /// replace it without touching call sites (DESIGN.md OQ3).
    pub fn estimate_memory(byte_len: usize) -> usize {
        byte_len.saturating_mul(6)
    }

    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source_bytes
    }

    pub fn source_str(&self) -> &str {
        std::str::from_utf8(&self.source_bytes).unwrap_or("")
    }

    pub fn memory_estimate(&self) -> usize {
        self.memory_estimate
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStatsWithMemory {
    pub hits: u64,
    pub misses: u64,
    pub memory: usize,
}

struct Entry<K> {
    key: K,
    value: CachedParse,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Intrusive doubly-linked recency list plus a hash index, giving O(1)
/// get/put/remove. The MRU end is `head`, the LRU end is `tail`.
struct Inner<K: Eq + Hash + Clone> {
    slots: Vec<Option<Entry<K>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    memory: usize,
    max_entries: usize,
    max_memory: usize,
}

impl<K: Eq + Hash + Clone> Inner<K> {
    fn detach(&mut self, slot: usize) {
        let (prev, next) = {
            let entry = self.slots[slot].as_ref().unwrap();
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let entry = self.slots[slot].as_mut().unwrap();
            entry.prev = None;
            entry.next = old_head;
        }
        if let Some(h) = old_head {
            self.slots[h].as_mut().unwrap().prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn promote(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.detach(slot);
        self.push_front(slot);
    }

    fn evict_one(&mut self) -> Option<K> {
        let tail = self.tail?;
        self.detach(tail);
        let entry = self.slots[tail].take().unwrap();
        self.free.push(tail);
        self.index.remove(&entry.key);
        self.memory -= entry.value.memory_estimate();
        Some(entry.key)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// A bounded, concurrent LRU parse cache.
///
/// `max_entries` and `max_memory_bytes` are both enforced: `Put` of a new key
/// evicts from the LRU end while either cap would otherwise be exceeded, but
/// never evicts the last remaining entry just to satisfy the byte cap (spec
/// §8 cache-bounds invariant).
pub struct ParseCache<K: Eq + Hash + Clone = String> {
    inner: Mutex<Inner<K>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

const DEFAULT_MAX_ENTRIES: usize = 100;
const DEFAULT_MAX_MEMORY_BYTES: usize = 32 * 1024 * 1024;

impl<K: Eq + Hash + Clone> ParseCache<K> {
    /// `max_entries = 0` or `max_memory_bytes = 0` fall back to their
    /// defaults, per spec §4.1.
    pub fn new(max_entries: usize, max_memory_bytes: usize) -> Self {
        let max_entries = if max_entries == 0 { DEFAULT_MAX_ENTRIES } else { max_entries };
        let max_memory_bytes = if max_memory_bytes == 0 {
            DEFAULT_MAX_MEMORY_BYTES
        } else {
            max_memory_bytes
        };

        Self {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                free: Vec::new(),
                index: HashMap::new(),
                head: None,
                tail: None,
                memory: 0,
                max_entries,
                max_memory: max_memory_bytes,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_MEMORY_BYTES)
    }

    /// Run `f` with a reference to the cached parse for `key`, promoting it
    /// to MRU on hit. Returns `None` on miss without calling `f`.
    ///
    /// Exposed as a closure-taking accessor rather than returning `&CachedParse`
    /// directly so the mutex guard's lifetime never has to outlive this call
    /// — matching the "no operation may block holding the cache lock" rule
    /// from spec §5 while still letting callers read the tree.
    pub fn get_with<R>(&self, key: &K, f: impl FnOnce(&CachedParse) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        let slot = *inner.index.get(key)?;
        inner.promote(slot);
        let result = f(&inner.slots[slot].as_ref().unwrap().value);
        drop(inner);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(result)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().index.contains_key(key)
    }

    /// Insert or replace the cached parse for `key`. Updating an existing
    /// key promotes it to MRU and refreshes the memory counter without
    /// triggering eviction against itself.
    pub fn put(&self, key: K, value: CachedParse) {
        let mut inner = self.inner.lock();

        if let Some(&slot) = inner.index.get(&key) {
            let old_estimate = inner.slots[slot].as_ref().unwrap().value.memory_estimate();
            inner.memory = inner.memory - old_estimate + value.memory_estimate();
            inner.slots[slot].as_mut().unwrap().value = value;
            inner.promote(slot);
            return;
        }

        let new_estimate = value.memory_estimate();

        // Evict from the LRU end while over either cap, but never evict the
        // last entry purely to satisfy the byte cap (spec §8).
        while inner.len() >= 1
            && (inner.len() >= inner.max_entries || inner.memory + new_estimate > inner.max_memory)
        {
            if inner.len() == 1 && inner.len() < inner.max_entries {
                // Only the byte cap is over budget and this is the sole
                // entry; the cache still accepts the new entry, so don't
                // evict it for nothing. Break and let insertion proceed —
                // the new entry will itself become the sole (possibly
                // over-budget) entry.
                break;
            }
            if inner.evict_one().is_none() {
                break;
            }
        }

        let slot = if let Some(free_slot) = inner.free.pop() {
            free_slot
        } else {
            inner.slots.push(None);
            inner.slots.len() - 1
        };

        inner.slots[slot] = Some(Entry {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        inner.index.insert(key, slot);
        inner.push_front(slot);
        inner.memory += new_estimate;
    }

    pub fn remove(&self, key: &K) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.index.get(key).copied() {
            inner.detach(slot);
            let entry = inner.slots[slot].take().unwrap();
            inner.free.push(slot);
            inner.index.remove(&entry.key);
            inner.memory -= entry.value.memory_estimate();
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.free.clear();
        inner.index.clear();
        inner.head = None;
        inner.tail = None;
        inner.memory = 0;
    }

    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn memory_usage(&self) -> usize {
        self.inner.lock().memory
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn stats_with_memory(&self) -> CacheStatsWithMemory {
        let inner = self.inner.lock();
        CacheStatsWithMemory {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            memory: inner.memory,
        }
    }

    /// Record a miss. Callers call this when `get_with` returns `None` and
    /// they go on to parse; kept separate so `get_with` doesn't have to
    /// assume the caller always reparses on miss.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_parse(byte_len: usize) -> CachedParse {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&tree_sitter_rust::LANGUAGE.into()).unwrap();
        let src = "x".repeat(byte_len.max(1));
        let tree = parser.parse(&src, None).unwrap();
        CachedParse::new(tree, src.into_bytes())
    }

    #[test]
    fn put_then_get_hits_and_promotes() {
        let cache: ParseCache<String> = ParseCache::new(10, 10 * 1024 * 1024);
        cache.put("a.rs".into(), dummy_parse(10));
        assert!(cache.get_with(&"a.rs".to_string(), |_| ()).is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_on_absent_key() {
        let cache: ParseCache<String> = ParseCache::new(10, 10 * 1024 * 1024);
        assert!(cache.get_with(&"missing.rs".to_string(), |_| ()).is_none());
    }

    #[test]
    fn entry_cap_evicts_lru() {
        let cache: ParseCache<String> = ParseCache::new(2, 10 * 1024 * 1024);
        cache.put("a.rs".into(), dummy_parse(10));
        cache.put("b.rs".into(), dummy_parse(10));
        // Touch a.rs so b.rs becomes LRU.
        cache.get_with(&"a.rs".to_string(), |_| ());
        cache.put("c.rs".into(), dummy_parse(10));

        assert_eq!(cache.size(), 2);
        assert!(cache.contains(&"a.rs".to_string()));
        assert!(cache.contains(&"c.rs".to_string()));
        assert!(!cache.contains(&"b.rs".to_string()));
    }

    #[test]
    fn memory_cap_evicts_until_new_entry_fits() {
        // Each dummy_parse(100) has memory_estimate = 600.
        let cache: ParseCache<String> = ParseCache::new(100, 1300);
        cache.put("a.rs".into(), dummy_parse(100));
        cache.put("b.rs".into(), dummy_parse(100));
        assert_eq!(cache.size(), 2);
        // A third entry would exceed 1300 bytes; eviction must make room.
        cache.put("c.rs".into(), dummy_parse(100));
        assert!(cache.memory_usage() <= 1300);
        assert!(cache.size() <= 2);
    }

    #[test]
    fn last_entry_is_never_evicted_for_byte_cap_alone() {
        let cache: ParseCache<String> = ParseCache::new(100, 1);
        cache.put("a.rs".into(), dummy_parse(1000));
        // Single oversized entry is still accepted even though it alone
        // exceeds the byte cap (spec §8 cache-bounds invariant).
        assert_eq!(cache.size(), 1);
        assert!(cache.contains(&"a.rs".to_string()));
    }

    #[test]
    fn zero_caps_fall_back_to_defaults() {
        let cache: ParseCache<String> = ParseCache::new(0, 0);
        cache.put("a.rs".into(), dummy_parse(10));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn clear_removes_everything() {
        let cache: ParseCache<String> = ParseCache::new(10, 10 * 1024 * 1024);
        cache.put("a.rs".into(), dummy_parse(10));
        cache.clear();
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn put_existing_key_updates_without_evicting() {
        let cache: ParseCache<String> = ParseCache::new(10, 10 * 1024 * 1024);
        cache.put("a.rs".into(), dummy_parse(10));
        cache.put("a.rs".into(), dummy_parse(20));
        assert_eq!(cache.size(), 1);
    }
}
