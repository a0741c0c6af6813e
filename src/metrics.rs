//! Observation Hooks (C10, §4.10): a narrow trait the rest of the crate
//! calls into on cache hits/misses, evictions, and download completions.
//!
//! No external metrics crate is pulled in for this — nothing in the
//! retrieved corpus exports a generic metrics facade, so a hand-rolled
//! trait with a no-op default is the grounded choice rather than
//! fabricating a dependency. Hosts that want Prometheus, StatsD, or
//! similar wire this trait to their own exporter.
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters, gauges, and histograms the cache engine reports as it runs
/// (§4.10): hit/miss/eviction/download counters, one counter per facade
/// operation and per upstream network call (labeled by success), cache-size
/// and queue-depth gauges, and download/open/network latency histograms,
/// expressed as plain method calls rather than a handle into a specific
/// metrics crate. All methods have default no-op bodies so implementors
/// only need to override what they care about.
pub trait Metrics: Send + Sync {
    fn cache_hit(&self, _path: &str) {}
    fn cache_miss(&self, _path: &str) {}
    fn eviction(&self, _path: &str, _bytes: u64) {}
    fn download_queued(&self, _path: &str) {}
    fn download_started(&self, _path: &str) {}
    fn download_completed(&self, _path: &str, _bytes: u64, _duration_ms: u64) {}
    fn download_failed(&self, _path: &str) {}
    /// Counter: one facade operation (`open`/`read`/`read_directory`/
    /// `get_attributes`/`close`), labeled by `op`.
    fn filesystem_operation(&self, _op: &str) {}
    /// Counter: one upstream network call, labeled by `op` and whether it
    /// succeeded.
    fn network_operation(&self, _op: &str, _success: bool) {}

    /// Gauge: current memory cache occupancy, reported after every insert
    /// or eviction that changes it.
    fn cache_gauges(&self, _bytes: u64, _entries: u64) {}
    /// Gauge: current Download Manager queue depth.
    fn queue_depth(&self, _pending: u64, _active: u64) {}
    /// Histogram: wall-clock time an `open` call spent before returning,
    /// including any synchronous cache-hit path.
    fn open_duration(&self, _duration_ms: u64) {}
    /// Histogram: wall-clock time a `NetworkOnly` read spent waiting on the
    /// upstream reader.
    fn network_latency(&self, _duration_ms: u64) {}
}

/// Does nothing; used when no host-side sink is configured.
#[derive(Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {}

/// An in-process sink useful for tests and the demo binary: plain atomic
/// counters, no external reporting.
#[derive(Default)]
pub struct CountingMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    downloads_queued: AtomicU64,
    downloads_completed: AtomicU64,
    downloads_failed: AtomicU64,
    cache_bytes: AtomicU64,
    cache_entries: AtomicU64,
    pending_downloads: AtomicU64,
    active_downloads: AtomicU64,
    filesystem_operations: AtomicU64,
    network_operations_ok: AtomicU64,
    network_operations_failed: AtomicU64,
}

impl CountingMetrics {
    /// Plain-text rendering of the current counters and gauges, in the
    /// shape a `/metrics` HTTP endpoint would serve (§6 Observability).
    /// Serving it over HTTP is a host-side concern this crate doesn't
    /// implement; this is the snapshot the host's exporter would format
    /// and return.
    pub fn render_text(&self) -> String {
        format!(
            "cache_hits {}\ncache_misses {}\nevictions {}\ndownloads_queued {}\ndownloads_completed {}\ndownloads_failed {}\ncache_bytes {}\ncache_entries {}\npending_downloads {}\nactive_downloads {}\nfilesystem_operations {}\nnetwork_operations_ok {}\nnetwork_operations_failed {}\n",
            self.hits(),
            self.misses(),
            self.evictions(),
            self.downloads_queued(),
            self.downloads_completed(),
            self.downloads_failed(),
            self.cache_bytes(),
            self.cache_entries(),
            self.pending_downloads(),
            self.active_downloads(),
            self.filesystem_operations(),
            self.network_operations_ok(),
            self.network_operations_failed(),
        )
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn downloads_completed(&self) -> u64 {
        self.downloads_completed.load(Ordering::Relaxed)
    }

    pub fn downloads_failed(&self) -> u64 {
        self.downloads_failed.load(Ordering::Relaxed)
    }

    pub fn cache_bytes(&self) -> u64 {
        self.cache_bytes.load(Ordering::Relaxed)
    }

    pub fn cache_entries(&self) -> u64 {
        self.cache_entries.load(Ordering::Relaxed)
    }

    pub fn pending_downloads(&self) -> u64 {
        self.pending_downloads.load(Ordering::Relaxed)
    }

    pub fn active_downloads(&self) -> u64 {
        self.active_downloads.load(Ordering::Relaxed)
    }

    pub fn downloads_queued(&self) -> u64 {
        self.downloads_queued.load(Ordering::Relaxed)
    }

    pub fn filesystem_operations(&self) -> u64 {
        self.filesystem_operations.load(Ordering::Relaxed)
    }

    pub fn network_operations_ok(&self) -> u64 {
        self.network_operations_ok.load(Ordering::Relaxed)
    }

    pub fn network_operations_failed(&self) -> u64 {
        self.network_operations_failed.load(Ordering::Relaxed)
    }
}

impl Metrics for CountingMetrics {
    fn cache_hit(&self, _path: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_miss(&self, _path: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn eviction(&self, _path: &str, _bytes: u64) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn download_queued(&self, _path: &str) {
        self.downloads_queued.fetch_add(1, Ordering::Relaxed);
    }

    fn download_completed(&self, _path: &str, _bytes: u64, _duration_ms: u64) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
    }

    fn download_failed(&self, _path: &str) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_gauges(&self, bytes: u64, entries: u64) {
        self.cache_bytes.store(bytes, Ordering::Relaxed);
        self.cache_entries.store(entries, Ordering::Relaxed);
    }

    fn queue_depth(&self, pending: u64, active: u64) {
        self.pending_downloads.store(pending, Ordering::Relaxed);
        self.active_downloads.store(active, Ordering::Relaxed);
    }

    fn filesystem_operation(&self, _op: &str) {
        self.filesystem_operations.fetch_add(1, Ordering::Relaxed);
    }

    fn network_operation(&self, _op: &str, success: bool) {
        if success {
            self.network_operations_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.network_operations_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
