//! Cache Entry Table (C8, §4.8): per-path bookkeeping that sits between
//! the Filesystem Facade and the Memory Cache / Download Manager.
//!
//! Backed by `moka::sync::Cache`, whose `get_with` gives us "create at
//! most once per key under concurrent callers" for free — exactly the
//! single-flight guarantee `get_or_create` needs on its slow path. The
//! actual file bytes never live in moka; only the small `CacheEntry`
//! record does. Byte storage and its own eviction policy stay in
//! [`crate::memcache::MemoryCache`].

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use moka::sync::Cache as MokaCache;

use crate::path::VirtualPath;
use crate::policy::CachePolicy;
use crate::tree::{DirectoryTree, NodeKind};

/// Lifecycle state of a cache entry (§4.8).
///
/// `Placeholder` is part of the original state machine but is never
/// constructed by this crate (§9 Open Question decision): any code path
/// that would have produced it instead surfaces `Error::UnexpectedPlaceholder`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileState {
    Virtual,
    Fetching,
    Cached,
    NetworkOnly,
    Placeholder,
}

/// Per-path bookkeeping record. Cheaply cloned; the mutable fields are
/// behind atomics so readers don't need to take a lock to check state.
pub struct CacheEntry {
    pub virtual_path: VirtualPath,
    pub upstream_location: String,
    pub policy: CachePolicy,
    size: AtomicU64,
    pub attributes: u32,
    pub created: SystemTime,
    pub modified: SystemTime,
    state: std::sync::atomic::AtomicU8,
    last_used_monotonic: AtomicU64,
    access_count: AtomicU64,
    ref_count: AtomicI64,
}

fn state_to_u8(s: FileState) -> u8 {
    match s {
        FileState::Virtual => 0,
        FileState::Fetching => 1,
        FileState::Cached => 2,
        FileState::NetworkOnly => 3,
        FileState::Placeholder => 4,
    }
}

fn u8_to_state(v: u8) -> FileState {
    match v {
        1 => FileState::Fetching,
        2 => FileState::Cached,
        3 => FileState::NetworkOnly,
        4 => FileState::Placeholder,
        _ => FileState::Virtual,
    }
}

impl CacheEntry {
    fn new(virtual_path: VirtualPath, upstream_location: String, policy: CachePolicy, size: u64, attributes: u32, created: SystemTime, modified: SystemTime) -> Self {
        CacheEntry {
            virtual_path,
            upstream_location,
            policy,
            size: AtomicU64::new(size),
            attributes,
            created,
            modified,
            state: std::sync::atomic::AtomicU8::new(state_to_u8(FileState::Virtual)),
            last_used_monotonic: AtomicU64::new(0),
            access_count: AtomicU64::new(0),
            ref_count: AtomicI64::new(0),
        }
    }

    /// Current reported size: the directory-enumeration size until a fetch
    /// completes, after which it's the number of bytes actually read (§4.7,
    /// §8 invariant `state==Cached ⇒ memory_cache.get(vp).len == entry.size`).
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    pub fn set_size(&self, size: u64) {
        self.size.store(size, Ordering::Relaxed);
    }

    pub fn state(&self) -> FileState {
        u8_to_state(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: FileState) {
        self.state.store(state_to_u8(state), Ordering::Release);
    }

    pub fn touch(&self, tick: u64) {
        self.last_used_monotonic.store(tick, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_used_monotonic(&self) -> u64 {
        self.last_used_monotonic.load(Ordering::Relaxed)
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    pub fn ref_count(&self) -> i64 {
        self.ref_count.load(Ordering::Relaxed)
    }

    /// Pins the entry against eviction. Every `reference` must be paired
    /// with an `unreference` (§4.8 handle lifecycle).
    pub fn reference(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn unreference(&self) {
        self.ref_count.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some((v - 1).max(0))).ok();
    }

    pub fn is_pinned(&self) -> bool {
        self.ref_count() > 0
    }
}

/// The table itself: one entry per virtual path ever observed, created
/// lazily and at most once per path even under concurrent lookups.
pub struct CacheEntryTable {
    inner: MokaCache<VirtualPath, Arc<CacheEntry>>,
    clock: AtomicU64,
}

impl CacheEntryTable {
    pub fn new(max_capacity: u64) -> Self {
        CacheEntryTable {
            inner: MokaCache::builder().max_capacity(max_capacity).build(),
            clock: AtomicU64::new(0),
        }
    }

    pub fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the existing entry for `vp`, or creates one by consulting
    /// the directory tree (fast path) — at most once across concurrent
    /// callers racing on the same path (§4.8).
    pub fn get_or_create(
        &self,
        vp: &VirtualPath,
        tree: &DirectoryTree,
        policy: CachePolicy,
    ) -> Option<Arc<CacheEntry>> {
        if let Some(existing) = self.inner.get(vp) {
            return Some(existing);
        }
        let node = tree.find(vp)?;
        if node.kind != NodeKind::Dir && node.kind != NodeKind::File {
            return None;
        }
        let vp = vp.clone();
        let entry = self.inner.get_with(vp.clone(), || {
            Arc::new(CacheEntry::new(
                node.virtual_path.clone(),
                node.upstream_location.clone(),
                policy,
                node.size,
                node.attributes,
                node.times.created,
                node.times.modified,
            ))
        });
        Some(entry)
    }

    /// Fallback path from §4.8 point 3: no directory node exists for `vp`,
    /// so a stub entry is created instead of failing outright. This
    /// preserves host callback semantics (callers still get a handle back
    /// from `open`), though a read against it typically surfaces
    /// `NotFound` once the stub's empty `upstream_location` fails to
    /// resolve. Also created at most once per path.
    pub fn get_or_create_stub(&self, vp: &VirtualPath, policy: CachePolicy) -> Arc<CacheEntry> {
        if let Some(existing) = self.inner.get(vp) {
            return existing;
        }
        let now = SystemTime::now();
        self.inner.get_with(vp.clone(), || {
            Arc::new(CacheEntry::new(vp.clone(), String::new(), policy, 0, 0, now, now))
        })
    }

    pub fn get(&self, vp: &VirtualPath) -> Option<Arc<CacheEntry>> {
        self.inner.get(vp)
    }

    pub fn invalidate(&self, vp: &VirtualPath) {
        self.inner.invalidate(vp);
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Snapshot of every currently-cached-in-memory entry's virtual path,
    /// used by the Memory Cache's `pin_predicate` to consult ref counts.
    pub fn is_pinned(&self, vp: &VirtualPath) -> bool {
        self.inner.get(vp).map(|e| e.is_pinned()).unwrap_or(false)
    }
}
