//! Download Manager (C7, §4.7): a bounded worker pool that performs
//! upstream fetches, de-duplicating concurrent requests for the same
//! virtual path (single-flight) via an "active set".

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::entry::{CacheEntryTable, FileState};
use crate::error::Status;
use crate::memcache::MemoryCache;
use crate::metrics::Metrics;
use crate::path::VirtualPath;
use crate::policy::CachePolicy;
use crate::upstream::UpstreamReader;

/// Owns the FIFO download queue and its worker pool.
///
/// `queue_download` never blocks: it either enqueues and returns
/// `Status::Pending`, reports `Status::InProgress` for a path already in
/// flight, or `Status::Cancelled` once the manager has begun shutting
/// down (§4.7).
pub struct DownloadManager {
    sender: Mutex<Option<mpsc::UnboundedSender<VirtualPath>>>,
    active: Arc<Mutex<HashSet<VirtualPath>>>,
    shutting_down: Arc<AtomicBool>,
    pending_count: Arc<AtomicU64>,
    active_count: Arc<AtomicU64>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<dyn Metrics>,
}

impl DownloadManager {
    pub fn new(
        worker_count: usize,
        table: Arc<CacheEntryTable>,
        memcache: Arc<MemoryCache>,
        upstream: Arc<dyn UpstreamReader + Send + Sync>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<VirtualPath>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let active = Arc::new(Mutex::new(HashSet::new()));
        let shutting_down = Arc::new(AtomicBool::new(false));
        let pending_count = Arc::new(AtomicU64::new(0));
        let active_count = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(worker_count.max(1));
        for id in 0..worker_count.max(1) {
            let rx = rx.clone();
            let active = active.clone();
            let shutting_down = shutting_down.clone();
            let pending_count = pending_count.clone();
            let active_count = active_count.clone();
            let table = table.clone();
            let memcache = memcache.clone();
            let upstream = upstream.clone();
            let metrics = metrics.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let vp = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(vp) = vp else {
                        debug!(worker = id, "download worker: queue closed, exiting");
                        break;
                    };
                    pending_count.fetch_sub(1, Ordering::Relaxed);

                    if shutting_down.load(Ordering::Acquire) {
                        if let Some(entry) = table.get(&vp) {
                            entry.set_state(FileState::Virtual);
                        }
                        active.lock().expect("active set lock poisoned").remove(&vp);
                        continue;
                    }

                    active_count.fetch_add(1, Ordering::Relaxed);
                    metrics.queue_depth(pending_count.load(Ordering::Relaxed), active_count.load(Ordering::Relaxed));
                    Self::fetch_one(&vp, &table, &memcache, upstream.as_ref(), metrics.as_ref()).await;
                    active_count.fetch_sub(1, Ordering::Relaxed);
                    metrics.queue_depth(pending_count.load(Ordering::Relaxed), active_count.load(Ordering::Relaxed));
                    active.lock().expect("active set lock poisoned").remove(&vp);
                }
            }));
        }

        DownloadManager {
            sender: Mutex::new(Some(tx)),
            active,
            shutting_down,
            pending_count,
            active_count,
            workers: Mutex::new(workers),
            metrics,
        }
    }

    async fn fetch_one(
        vp: &VirtualPath,
        table: &CacheEntryTable,
        memcache: &MemoryCache,
        upstream: &(dyn UpstreamReader + Send + Sync),
        metrics: &dyn Metrics,
    ) {
        let Some(entry) = table.get(vp) else { return };

        if entry.policy == CachePolicy::NeverCache {
            entry.set_state(FileState::NetworkOnly);
            return;
        }

        metrics.download_started(vp.as_str());
        let started = Instant::now();
        match upstream.read_all(&entry.upstream_location).await {
            Ok(bytes) => {
                let len = bytes.len() as u64;
                metrics.network_operation("read_all", true);
                memcache.insert(vp.clone(), bytes, |p| table.is_pinned(p), |evicted, size| {
                    if let Some(evicted_entry) = table.get(evicted) {
                        evicted_entry.set_state(FileState::Virtual);
                    }
                    metrics.eviction(evicted.as_str(), size);
                });
                // Keep the reported size in sync with what actually landed
                // in the memory cache: the directory enumeration's size can
                // be stale if the upstream file changed since startup.
                entry.set_size(len);
                entry.touch(table.tick());
                entry.set_state(FileState::Cached);
                metrics.download_completed(vp.as_str(), len, started.elapsed().as_millis() as u64);
                metrics.cache_gauges(memcache.size_bytes(), memcache.entry_count() as u64);
            }
            Err(e) => {
                warn!(path = %vp, error = %e, "download: upstream fetch failed");
                entry.set_state(FileState::Virtual);
                metrics.download_failed(vp.as_str());
                metrics.network_operation("read_all", false);
            }
        }
    }

    /// Enqueues `vp` for download. Requires the entry already exist in
    /// `table` (the facade is responsible for creating it via
    /// `CacheEntryTable::get_or_create` first).
    pub fn queue_download(&self, vp: &VirtualPath, table: &CacheEntryTable) -> Status {
        if self.shutting_down.load(Ordering::Acquire) {
            return Status::Cancelled;
        }

        let mut active = self.active.lock().expect("active set lock poisoned");
        if active.contains(vp) {
            return Status::InProgress;
        }
        active.insert(vp.clone());
        drop(active);

        if let Some(entry) = table.get(vp) {
            entry.set_state(FileState::Fetching);
        }

        let sender = self.sender.lock().expect("sender lock poisoned");
        match sender.as_ref() {
            Some(tx) if tx.send(vp.clone()).is_ok() => {
                self.pending_count.fetch_add(1, Ordering::Relaxed);
                self.metrics.download_queued(vp.as_str());
                self.metrics.queue_depth(self.pending_count(), self.active_count());
                Status::Pending
            }
            _ => {
                self.active.lock().expect("active set lock poisoned").remove(vp);
                Status::Cancelled
            }
        }
    }

    /// Removes `vp` from the active set if it is still queued. Does not
    /// abort an in-flight fetch that a worker has already started (§9 Open
    /// Question decision: matches the original, no cooperative cancel).
    pub fn cancel(&self, vp: &VirtualPath) -> bool {
        self.active.lock().expect("active set lock poisoned").remove(vp)
    }

    pub fn pending_count(&self) -> u64 {
        self.pending_count.load(Ordering::Relaxed)
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Stops accepting new work, drains anything still queued (marking it
    /// `Virtual` again rather than completing it), and joins every worker.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.sender.lock().expect("sender lock poisoned").take();

        let handles: Vec<_> = self.workers.lock().expect("workers lock poisoned").drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glob::CaseSensitivity;
    use crate::metrics::NoopMetrics;
    use crate::tree::{DirectoryTree, NodeTimes};
    use crate::upstream::LocalUpstreamReader;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Arc<DirectoryTree>, Arc<CacheEntryTable>, Arc<MemoryCache>, Arc<dyn UpstreamReader + Send + Sync>) {
        let tree = Arc::new(DirectoryTree::new(CaseSensitivity::Sensitive));
        tree.add_file(&VirtualPath::normalize("/msvc/cl.exe"), "cl.exe".into(), 3, NodeTimes::default());
        let table = Arc::new(CacheEntryTable::new(100));
        let memcache = Arc::new(MemoryCache::with_default_watermarks(1024 * 1024));
        let upstream: Arc<dyn UpstreamReader + Send + Sync> = Arc::new(LocalUpstreamReader::new(dir.path()));
        (tree, table, memcache, upstream)
    }

    #[tokio::test]
    async fn queue_download_fetches_and_caches() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cl.exe"), b"exe").unwrap();
        let (tree, table, memcache, upstream) = setup(&dir);
        let vp = VirtualPath::normalize("/msvc/cl.exe");
        table.get_or_create(&vp, &tree, CachePolicy::AlwaysCache).unwrap();

        let manager = DownloadManager::new(2, table.clone(), memcache.clone(), upstream, Arc::new(NoopMetrics));
        let status = manager.queue_download(&vp, &table);
        assert_eq!(status, Status::Pending);

        for _ in 0..50 {
            if memcache.get(&vp).is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(*memcache.get(&vp).unwrap(), b"exe".to_vec());
        assert_eq!(table.get(&vp).unwrap().state(), FileState::Cached);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_queue_requests_return_in_progress() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cl.exe"), b"exe").unwrap();
        let (tree, table, memcache, upstream) = setup(&dir);
        let vp = VirtualPath::normalize("/msvc/cl.exe");
        table.get_or_create(&vp, &tree, CachePolicy::AlwaysCache).unwrap();

        let manager = DownloadManager::new(1, table.clone(), memcache.clone(), upstream, Arc::new(NoopMetrics));
        assert_eq!(manager.queue_download(&vp, &table), Status::Pending);
        assert_eq!(manager.queue_download(&vp, &table), Status::InProgress);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_rejects_further_downloads() {
        let dir = TempDir::new().unwrap();
        let (tree, table, memcache, upstream) = setup(&dir);
        let vp = VirtualPath::normalize("/msvc/cl.exe");
        table.get_or_create(&vp, &tree, CachePolicy::AlwaysCache).unwrap();

        let manager = DownloadManager::new(1, table.clone(), memcache, upstream, Arc::new(NoopMetrics));
        manager.shutdown().await;

        assert_eq!(manager.queue_download(&vp, &table), Status::Cancelled);
    }

    #[tokio::test]
    async fn never_cache_policy_marks_network_only_without_fetching() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.bin"), vec![0u8; 10]).unwrap();
        let (tree, table, memcache, upstream) = setup(&dir);
        tree.add_file(&VirtualPath::normalize("/msvc/big.bin"), "big.bin".into(), 10, NodeTimes::default());
        let vp = VirtualPath::normalize("/msvc/big.bin");
        table.get_or_create(&vp, &tree, CachePolicy::NeverCache).unwrap();

        let manager = DownloadManager::new(1, table.clone(), memcache.clone(), upstream, Arc::new(NoopMetrics));
        manager.queue_download(&vp, &table);

        for _ in 0..50 {
            if table.get(&vp).unwrap().state() == FileState::NetworkOnly {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(table.get(&vp).unwrap().state(), FileState::NetworkOnly);
        assert!(memcache.get(&vp).is_none());

        manager.shutdown().await;
    }
}
