#![forbid(unsafe_code)]

//! Fixed-capacity LRU hash table keyed by [`StrongHash`].
//!
//! The table maps 128-bit content fingerprints to values and hands every live
//! entry a dense **entry index** in `[0, capacity)` that stays stable from
//! insertion to eviction. The atlas layer turns that index into a tile
//! location, which is why stability matters: a tile must not move on the GPU
//! while its cache entry is alive.
//!
//! Storage model: entries live in a flat arena (`Vec<Option<Entry>>`) indexed
//! by entry index; evicted indices return to a free list and are reused. The
//! LRU order is a doubly linked list threaded through the arena by index, and
//! lookup goes through a power-of-two bucket array with a per-entry chain
//! link. No pointers, no rehashing, no allocation after construction (beyond
//! what values themselves own).

use std::fmt;

use crate::strong_hash::StrongHash;

/// Counters describing table behavior since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableStats {
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Entries dropped to make room (not counting explicit `remove`/`clear`).
    pub evictions: u64,
    /// Current live entry count.
    pub len: usize,
    /// Maximum live entry count.
    pub capacity: usize,
}

struct Entry<V> {
    hash: StrongHash,
    value: V,
    /// Toward MRU.
    lru_prev: Option<u32>,
    /// Toward LRU.
    lru_next: Option<u32>,
    /// Next entry in the same bucket chain.
    bucket_next: Option<u32>,
}

/// Bounded `StrongHash -> V` map with LRU eviction and stable entry indices.
///
/// Capacity is fixed at construction and never grows. Once full, inserting a
/// new hash evicts the least-recently-used entry (dropping its value) and
/// reuses its entry index for the newcomer.
///
/// The value constructors passed to [`get_or_emplace`](Self::get_or_emplace)
/// and friends receive the entry index so they can derive index-addressed
/// resources (the atlas derives the tile location from it).
pub struct StrongLruTable<V> {
    buckets: Box<[Option<u32>]>,
    bucket_mask: u32,
    entries: Vec<Option<Entry<V>>>,
    free_indices: Vec<u32>,
    /// MRU end of the LRU list.
    head: Option<u32>,
    /// LRU end of the LRU list; first to be evicted.
    tail: Option<u32>,
    len: usize,
    name: String,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> StrongLruTable<V> {
    /// Create a table holding at most `capacity` live entries.
    ///
    /// `bucket_count` sizes the bucket array (rounded up to a power of two);
    /// it should be at least `capacity` to keep chains short. `name` labels
    /// the table in diagnostics and trace events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or exceeds `u32::MAX`.
    #[must_use]
    pub fn new(bucket_count: usize, capacity: usize, name: impl Into<String>) -> Self {
        assert!(capacity > 0, "LRU table capacity must be nonzero");
        assert!(capacity <= u32::MAX as usize, "LRU table capacity too large");
        let bucket_count = bucket_count.max(1).next_power_of_two();

        let mut entries = Vec::new();
        entries.resize_with(capacity, || None);

        Self {
            buckets: vec![None; bucket_count].into_boxed_slice(),
            bucket_mask: (bucket_count - 1) as u32,
            entries,
            // Reversed so indices are handed out in ascending order.
            free_indices: (0..capacity as u32).rev().collect(),
            head: None,
            tail: None,
            len: 0,
            name: name.into(),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Current live entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum live entry count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Diagnostic label given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Behavior counters since construction.
    #[must_use]
    pub fn stats(&self) -> TableStats {
        TableStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            len: self.len,
            capacity: self.capacity(),
        }
    }

    /// Whether an entry for `hash` is live. Does not touch LRU order.
    #[must_use]
    pub fn contains(&self, hash: StrongHash) -> bool {
        self.find(hash).is_some()
    }

    /// Borrow the value for `hash` without promoting it.
    #[must_use]
    pub fn peek(&self, hash: StrongHash) -> Option<&V> {
        let index = self.find(hash)?;
        self.entries[index as usize].as_ref().map(|e| &e.value)
    }

    /// Promote the entry for `hash` to most-recently-used, if present.
    pub fn touch(&mut self, hash: StrongHash) {
        if let Some(index) = self.find(hash) {
            self.promote(index);
        }
    }

    /// Look up `hash`, promoting the entry to most-recently-used on a hit.
    pub fn try_get(&mut self, hash: StrongHash) -> Option<&V> {
        match self.find(hash) {
            Some(index) => {
                self.hits += 1;
                self.promote(index);
                self.entries[index as usize].as_ref().map(|e| &e.value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Return the live entry for `hash`, constructing it on a miss.
    ///
    /// On a hit the entry is promoted and `create` is not called. On a miss,
    /// `create` runs exactly once with the entry index the new entry will
    /// occupy; if the table is full, the LRU tail is evicted first (its value
    /// is dropped before `create` runs) and its index is reused.
    pub fn get_or_emplace(&mut self, hash: StrongHash, create: impl FnOnce(u32) -> V) -> &V {
        if let Some(index) = self.find(hash) {
            self.hits += 1;
            self.promote(index);
            return self.value_at(index);
        }
        self.misses += 1;
        let index = self.allocate_index();
        let value = create(index);
        self.insert_at(index, hash, value);
        self.value_at(index)
    }

    /// Like [`get_or_emplace`](Self::get_or_emplace), but the constructor may
    /// decline by returning `None`, in which case nothing is inserted and
    /// `None` is returned.
    ///
    /// A decline leaves the table exactly as it was: live count, LRU order,
    /// and every existing entry are untouched. The entry index passed to the
    /// constructor is only a reservation; at capacity it names the LRU tail,
    /// which is evicted (dropping its value) only once the constructor has
    /// actually produced a replacement.
    pub fn get_or_try_emplace(
        &mut self,
        hash: StrongHash,
        create: impl FnOnce(u32) -> Option<V>,
    ) -> Option<&V> {
        if let Some(index) = self.find(hash) {
            self.hits += 1;
            self.promote(index);
            return self.entries[index as usize].as_ref().map(|e| &e.value);
        }
        self.misses += 1;
        // Pick the index the new entry would occupy without disturbing
        // anything yet: a free index if one exists, otherwise the tail's.
        let (index, must_evict) = match self.free_indices.last() {
            Some(&index) => (index, false),
            None => match self.tail {
                Some(index) => (index, true),
                None => unreachable!("table with neither free indices nor live entries"),
            },
        };
        let value = create(index)?;
        // Confirmed: the old value (if any) is dropped before the new one is
        // installed at the same index.
        if must_evict {
            let freed = self.evict_tail();
            debug_assert_eq!(freed, index);
        } else {
            self.free_indices.pop();
        }
        self.insert_at(index, hash, value);
        Some(self.value_at(index))
    }

    /// Insert unconditionally, replacing any existing entry for `hash`.
    ///
    /// The previous value for `hash` (if any) is dropped before `create`
    /// runs; otherwise behaves like a [`get_or_emplace`](Self::get_or_emplace)
    /// miss. The new entry lands at the MRU end.
    pub fn emplace(&mut self, hash: StrongHash, create: impl FnOnce(u32) -> V) {
        self.remove(hash);
        let index = self.allocate_index();
        let value = create(index);
        self.insert_at(index, hash, value);
    }

    /// Drop the entry for `hash` and free its entry index. No-op if absent.
    pub fn remove(&mut self, hash: StrongHash) {
        let Some(index) = self.find(hash) else {
            return;
        };
        self.detach_lru(index);
        self.detach_bucket(index);
        self.entries[index as usize] = None;
        self.free_indices.push(index);
        self.len -= 1;
    }

    /// Drop all entries and free all entry indices.
    pub fn clear(&mut self) {
        tracing::trace!(table = %self.name, dropped = self.len, "clearing LRU table");
        for entry in &mut self.entries {
            *entry = None;
        }
        self.buckets.fill(None);
        self.free_indices = (0..self.capacity() as u32).rev().collect();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Live hashes in most-recently-used to least-recently-used order.
    pub fn hashes(&self) -> impl Iterator<Item = StrongHash> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let index = cursor?;
            let entry = self.entries[index as usize].as_ref()?;
            cursor = entry.lru_next;
            Some(entry.hash)
        })
    }

    /// Write a human-readable dump of the table state.
    pub fn inspect(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "LRU table '{}'", self.name)?;
        writeln!(out, "  entries   : {} / {}", self.len, self.capacity())?;
        writeln!(
            out,
            "  hits      : {} (misses {}, evictions {})",
            self.hits, self.misses, self.evictions
        )?;
        write!(out, "  MRU..LRU  :")?;
        for hash in self.hashes() {
            write!(out, " {hash}")?;
        }
        writeln!(out)
    }

    // ── internals ──────────────────────────────────────────────────────

    fn bucket_of(&self, hash: StrongHash) -> usize {
        (hash.project32() & self.bucket_mask) as usize
    }

    /// Walk the bucket chain for `hash`.
    fn find(&self, hash: StrongHash) -> Option<u32> {
        let mut cursor = self.buckets[self.bucket_of(hash)];
        while let Some(index) = cursor {
            let entry = self.entries[index as usize].as_ref()?;
            if entry.hash == hash {
                return Some(index);
            }
            cursor = entry.bucket_next;
        }
        None
    }

    fn value_at(&self, index: u32) -> &V {
        match self.entries[index as usize].as_ref() {
            Some(entry) => &entry.value,
            None => unreachable!("entry index {index} vacated while borrowed"),
        }
    }

    /// Pop a free entry index, evicting the LRU tail if none remain.
    fn allocate_index(&mut self) -> u32 {
        if let Some(index) = self.free_indices.pop() {
            return index;
        }
        self.evict_tail()
    }

    /// Drop the LRU tail and return its now-free entry index.
    fn evict_tail(&mut self) -> u32 {
        let index = match self.tail {
            Some(index) => index,
            None => unreachable!("allocation with neither free indices nor live entries"),
        };
        self.detach_lru(index);
        self.detach_bucket(index);
        if let Some(entry) = self.entries[index as usize].take() {
            tracing::trace!(
                table = %self.name,
                hash = %entry.hash,
                entry_index = index,
                "evicting LRU tail",
            );
        }
        self.len -= 1;
        self.evictions += 1;
        index
    }

    /// Link a fresh entry at the MRU end and into its bucket chain.
    fn insert_at(&mut self, index: u32, hash: StrongHash, value: V) {
        let bucket = self.bucket_of(hash);
        let entry = Entry {
            hash,
            value,
            lru_prev: None,
            lru_next: self.head,
            bucket_next: self.buckets[bucket],
        };
        if let Some(old_head) = self.head {
            if let Some(e) = self.entries[old_head as usize].as_mut() {
                e.lru_prev = Some(index);
            }
        }
        self.head = Some(index);
        if self.tail.is_none() {
            self.tail = Some(index);
        }
        self.buckets[bucket] = Some(index);
        self.entries[index as usize] = Some(entry);
        self.len += 1;
    }

    /// Move a live entry to the MRU end.
    fn promote(&mut self, index: u32) {
        if self.head == Some(index) {
            return;
        }
        self.detach_lru(index);
        let old_head = self.head;
        if let Some(entry) = self.entries[index as usize].as_mut() {
            entry.lru_prev = None;
            entry.lru_next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(e) = self.entries[h as usize].as_mut() {
                e.lru_prev = Some(index);
            }
        }
        self.head = Some(index);
        if self.tail.is_none() {
            self.tail = Some(index);
        }
    }

    /// Unlink an entry from the LRU list, patching neighbors and ends.
    fn detach_lru(&mut self, index: u32) {
        // Read links via a shared borrow first, then patch neighbors.
        let Some(entry) = self.entries[index as usize].as_ref() else {
            return;
        };
        let prev = entry.lru_prev;
        let next = entry.lru_next;

        match prev {
            Some(p) => {
                if let Some(e) = self.entries[p as usize].as_mut() {
                    e.lru_next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(e) = self.entries[n as usize].as_mut() {
                    e.lru_prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(entry) = self.entries[index as usize].as_mut() {
            entry.lru_prev = None;
            entry.lru_next = None;
        }
    }

    /// Unlink an entry from its bucket chain.
    fn detach_bucket(&mut self, index: u32) {
        let Some(entry) = self.entries[index as usize].as_ref() else {
            return;
        };
        let bucket = self.bucket_of(entry.hash);
        let after = entry.bucket_next;

        let mut cursor = self.buckets[bucket];
        if cursor == Some(index) {
            self.buckets[bucket] = after;
            return;
        }
        while let Some(i) = cursor {
            let Some(e) = self.entries[i as usize].as_ref() else {
                return;
            };
            if e.bucket_next == Some(index) {
                if let Some(e) = self.entries[i as usize].as_mut() {
                    e.bucket_next = after;
                }
                return;
            }
            cursor = e.bucket_next;
        }
    }
}

impl<V> fmt::Debug for StrongLruTable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrongLruTable")
            .field("name", &self.name)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .field("evictions", &self.evictions)
            .finish_non_exhaustive()
    }
}
