//! Translation cache.
//!
//! A small least-recently-used store of resolved machine addresses, keyed by
//! a symbol name or a page-aligned virtual address together with the owning
//! process. Entries live in a fixed slot array. Eviction scans for the oldest
//! stamp.

use crate::{Ma, Va, os::ProcessId};

/// The key of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A kernel symbol name.
    Symbol(String),

    /// A virtual address.
    ///
    /// Only the page-aligned part of the address takes part in comparisons.
    Address(Va),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    key: CacheKey,
    pid: ProcessId,
    value: Ma,
    last_used: u64,
}

/// Bounded least-recently-used translation cache.
///
/// A machine address of zero is never stored and never returned.
#[derive(Debug)]
pub struct TranslationCache {
    entries: Vec<CacheEntry>,
    capacity: usize,
    page_mask: u64,
    tick: u64,
}

impl TranslationCache {
    /// The default number of entries.
    pub const DEFAULT_CAPACITY: usize = 10;

    /// Creates an empty cache with [`DEFAULT_CAPACITY`] slots.
    ///
    /// [`DEFAULT_CAPACITY`]: Self::DEFAULT_CAPACITY
    pub fn new(page_size: u64) -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY, page_size)
    }

    /// Creates an empty cache with `capacity` slots.
    ///
    /// A capacity of zero disables caching.
    pub fn with_capacity(capacity: usize, page_size: u64) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            page_mask: !(page_size - 1),
            tick: 0,
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Looks up a previously resolved machine address.
    ///
    /// A hit refreshes the entry's stamp. Address hits carry the page offset
    /// of `key` over to the returned machine address.
    pub fn lookup(&mut self, key: &CacheKey, pid: ProcessId) -> Option<Ma> {
        let normalized = self.normalize(key);
        let stamp = self.next_tick();

        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.pid == pid && entry.key == normalized)?;

        entry.last_used = stamp;

        match key {
            CacheKey::Symbol(_) => Some(entry.value),
            CacheKey::Address(va) => {
                let offset = va.0 & !self.page_mask;
                tracing::trace!(%va, offset, value = %entry.value, "cache hit");
                Some(entry.value + offset)
            }
        }
    }

    /// Inserts or updates the entry for `(key, pid)`.
    ///
    /// When the cache is full, the entry with the oldest stamp is evicted
    /// first.
    pub fn insert(&mut self, key: CacheKey, pid: ProcessId, value: Ma) {
        let value = match key {
            CacheKey::Symbol(_) => value,
            CacheKey::Address(_) => value & self.page_mask,
        };

        if value.is_null() || self.capacity == 0 {
            return;
        }

        let key = self.normalize(&key);
        let stamp = self.next_tick();

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.pid == pid && entry.key == key)
        {
            entry.value = value;
            entry.last_used = stamp;
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        tracing::trace!(?key, %pid, %value, "cache set");
        self.entries.push(CacheEntry {
            key,
            pid,
            value,
            last_used: stamp,
        });
    }

    /// Removes every entry.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    fn evict_oldest(&mut self) {
        let mut oldest = 0;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.last_used < self.entries[oldest].last_used {
                oldest = index;
            }
        }

        let evicted = self.entries.remove(oldest);
        tracing::trace!(key = ?evicted.key, pid = %evicted.pid, "cache evict");
    }

    fn normalize(&self, key: &CacheKey) -> CacheKey {
        match key {
            CacheKey::Symbol(name) => CacheKey::Symbol(name.clone()),
            CacheKey::Address(va) => CacheKey::Address(*va & self.page_mask),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
