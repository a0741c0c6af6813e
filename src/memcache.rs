//! Memory Cache (C6, §4.6): the byte-level LRU store backing `Cached`
//! entries.
//!
//! `moka` is used elsewhere in this crate (the Cache Entry Table, C8) for
//! its at-most-once-per-key creation semantics, but it is deliberately not
//! used here: eviction in this cache must respect ref-count pinning and an
//! explicit high/low watermark pair, neither of which moka's built-in
//! size-based eviction exposes. A hand-rolled `Mutex<HashMap<..>>` gives us
//! exact control over both.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::path::VirtualPath;

struct Slot {
    bytes: Arc<Vec<u8>>,
    last_used: u64,
}

/// Byte-addressable cache of `(VirtualPath -> bytes)`, bounded by
/// `capacity_bytes` and evicted down to `low_watermark` once usage crosses
/// `high_watermark` (§4.6). Entries for which `pin_predicate` returns true
/// (non-zero ref-count) are never evicted.
pub struct MemoryCache {
    capacity_bytes: u64,
    high_watermark: f64,
    low_watermark: f64,
    slots: Mutex<HashMap<VirtualPath, Slot>>,
    used_bytes: AtomicU64,
    clock: AtomicU64,
}

impl MemoryCache {
    pub fn new(capacity_bytes: u64, high_watermark: f64, low_watermark: f64) -> Self {
        MemoryCache {
            capacity_bytes,
            high_watermark,
            low_watermark,
            slots: Mutex::new(HashMap::new()),
            used_bytes: AtomicU64::new(0),
            clock: AtomicU64::new(0),
        }
    }

    pub fn with_default_watermarks(capacity_bytes: u64) -> Self {
        Self::new(capacity_bytes, 0.90, 0.80)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, vp: &VirtualPath) -> Option<Arc<Vec<u8>>> {
        let mut slots = self.slots.lock().expect("memory cache lock poisoned");
        let tick = self.tick();
        let slot = slots.get_mut(vp)?;
        slot.last_used = tick;
        Some(slot.bytes.clone())
    }

    /// Inserts `bytes` for `vp`, then evicts down to the low watermark if
    /// the high watermark was crossed. Insertion itself is soft: it always
    /// succeeds, even if the resulting usage exceeds `capacity_bytes` (§9
    /// Open Question decision — strict rejection is a separate, explicit
    /// config mode this crate does not implement by default).
    ///
    /// `on_evict` runs once per `(path, bytes freed)` this call evicts, so a
    /// caller that tracks state elsewhere (the Cache Entry Table dropping a
    /// path back to `Virtual`, the Observation Hooks eviction counter) can
    /// stay in sync with what bytes actually remain.
    pub fn insert(&self, vp: VirtualPath, bytes: Vec<u8>, pinned: impl Fn(&VirtualPath) -> bool, on_evict: impl FnMut(&VirtualPath, u64)) {
        let len = bytes.len() as u64;
        let tick = self.tick();
        {
            let mut slots = self.slots.lock().expect("memory cache lock poisoned");
            if let Some(old) = slots.insert(vp.clone(), Slot { bytes: Arc::new(bytes), last_used: tick }) {
                self.used_bytes.fetch_sub(old.bytes.len() as u64, Ordering::Relaxed);
            }
            self.used_bytes.fetch_add(len, Ordering::Relaxed);
        }
        self.maybe_evict(pinned, on_evict);
    }

    pub fn remove(&self, vp: &VirtualPath) {
        let mut slots = self.slots.lock().expect("memory cache lock poisoned");
        if let Some(slot) = slots.remove(vp) {
            self.used_bytes.fetch_sub(slot.bytes.len() as u64, Ordering::Relaxed);
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    pub fn entry_count(&self) -> usize {
        self.slots.lock().expect("memory cache lock poisoned").len()
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    fn high_watermark_bytes(&self) -> u64 {
        (self.capacity_bytes as f64 * self.high_watermark) as u64
    }

    fn low_watermark_bytes(&self) -> u64 {
        (self.capacity_bytes as f64 * self.low_watermark) as u64
    }

    /// Evicts least-recently-used, unpinned entries until usage is at or
    /// below the low watermark, or until no unpinned entry remains.
    fn maybe_evict(&self, pinned: impl Fn(&VirtualPath) -> bool, mut on_evict: impl FnMut(&VirtualPath, u64)) {
        if self.size_bytes() <= self.high_watermark_bytes() {
            return;
        }
        let target = self.low_watermark_bytes();
        let mut slots = self.slots.lock().expect("memory cache lock poisoned");
        let mut candidates: Vec<(VirtualPath, u64, u64)> = slots
            .iter()
            .filter(|(vp, _)| !pinned(vp))
            .map(|(vp, slot)| (vp.clone(), slot.last_used, slot.bytes.len() as u64))
            .collect();
        candidates.sort_by_key(|(_, last_used, _)| *last_used);

        let mut used = self.used_bytes.load(Ordering::Relaxed);
        for (vp, _, size) in candidates {
            if used <= target {
                break;
            }
            if slots.remove(&vp).is_some() {
                used = used.saturating_sub(size);
                self.used_bytes.fetch_sub(size, Ordering::Relaxed);
                on_evict(&vp, size);
            }
        }
    }

    /// Forces eviction down to `target_bytes`, honoring `pin_predicate`.
    /// Used by the Download Manager before admitting a large new fetch
    /// that alone would not cross the high watermark but would overshoot
    /// capacity outright.
    pub fn evict_until(&self, target_bytes: u64, pinned: impl Fn(&VirtualPath) -> bool, mut on_evict: impl FnMut(&VirtualPath, u64)) {
        let mut slots = self.slots.lock().expect("memory cache lock poisoned");
        let mut candidates: Vec<(VirtualPath, u64, u64)> = slots
            .iter()
            .filter(|(vp, _)| !pinned(vp))
            .map(|(vp, slot)| (vp.clone(), slot.last_used, slot.bytes.len() as u64))
            .collect();
        candidates.sort_by_key(|(_, last_used, _)| *last_used);

        let mut used = self.used_bytes.load(Ordering::Relaxed);
        for (vp, _, size) in candidates {
            if used <= target_bytes {
                break;
            }
            if slots.remove(&vp).is_some() {
                used = used.saturating_sub(size);
                self.used_bytes.fetch_sub(size, Ordering::Relaxed);
                on_evict(&vp, size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::normalize(s)
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let cache = MemoryCache::with_default_watermarks(1024);
        cache.insert(vp("/a.txt"), b"hello".to_vec(), |_| false, |_, _| {});
        assert_eq!(*cache.get(&vp("/a.txt")).unwrap(), b"hello".to_vec());
        assert_eq!(cache.size_bytes(), 5);
    }

    #[test]
    fn crossing_high_watermark_evicts_down_to_low_watermark() {
        // capacity 100, high=0.9 (90), low=0.5 (50) for a crisper test.
        let cache = MemoryCache::new(100, 0.9, 0.5);
        cache.insert(vp("/a"), vec![0u8; 40], |_| false, |_, _| {});
        cache.insert(vp("/b"), vec![0u8; 40], |_| false, |_, _| {});
        // usage 80, below high watermark (90): no eviction yet.
        assert_eq!(cache.size_bytes(), 80);

        let mut evicted = Vec::new();
        cache.insert(vp("/c"), vec![0u8; 20], |_| false, |vp, size| evicted.push((vp.clone(), size)));
        // usage 100 > 90: evict LRU ("/a" then "/b" if needed) down to <= 50.
        assert!(cache.size_bytes() <= 50);
        assert!(cache.get(&vp("/a")).is_none());
        assert!(evicted.iter().any(|(p, size)| p == &vp("/a") && *size == 40));
    }

    #[test]
    fn pinned_entries_survive_eviction() {
        let cache = MemoryCache::new(100, 0.9, 0.5);
        cache.insert(vp("/pinned"), vec![0u8; 40], |_| false, |_, _| {});
        cache.insert(vp("/b"), vec![0u8; 40], |_| false, |_, _| {});
        cache.insert(vp("/c"), vec![0u8; 30], |p| p.as_str() == "/pinned", |_, _| {});

        assert!(cache.get(&vp("/pinned")).is_some());
    }

    #[test]
    fn remove_frees_accounted_bytes() {
        let cache = MemoryCache::with_default_watermarks(1024);
        cache.insert(vp("/a"), vec![0u8; 10], |_| false, |_, _| {});
        cache.remove(&vp("/a"));
        assert_eq!(cache.size_bytes(), 0);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn evict_until_forces_target_even_below_high_watermark() {
        let cache = MemoryCache::new(1000, 0.9, 0.8);
        cache.insert(vp("/a"), vec![0u8; 100], |_| false, |_, _| {});
        cache.insert(vp("/b"), vec![0u8; 100], |_| false, |_, _| {});
        cache.evict_until(50, |_| false, |_, _| {});
        assert!(cache.size_bytes() <= 50);
    }
}
