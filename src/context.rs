//! The single context object the spec's design notes call for: one place
//! that owns the Directory Tree, Cache Entry Table, Memory Cache, Download
//! Manager, and Policy Engine, injected into the Filesystem Facade rather
//! than reached via ambient globals (§9 "Global mutable state").

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

use crate::access::AccessTracker;
use crate::config::CrateConfig;
use crate::dircache::DirectoryCache;
use crate::download::DownloadManager;
use crate::entry::CacheEntryTable;
use crate::glob;
use crate::memcache::MemoryCache;
use crate::metrics::{Metrics, NoopMetrics};
use crate::policy::PolicyEngine;
use crate::tree::DirectoryTree;
use crate::upstream::UpstreamReader;

/// Process-wide state for one mounted namespace. Cheap to clone (everything
/// inside is already `Arc`), so a `Context` can be handed to as many
/// `Facade` instances as the host needs.
#[derive(Clone)]
pub struct Context {
    pub tree: Arc<DirectoryTree>,
    pub table: Arc<CacheEntryTable>,
    pub memcache: Arc<MemoryCache>,
    pub downloads: Arc<DownloadManager>,
    pub policy: Arc<PolicyEngine>,
    pub access: Arc<AccessTracker>,
    pub metrics: Arc<dyn Metrics>,
    pub upstream: Arc<dyn UpstreamReader + Send + Sync>,
    access_report_shutdown: Arc<Notify>,
    access_report_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Context {
    /// Builds a `Context` from validated configuration: enumerates every
    /// compiler root's upstream directory once (§4.4), then starts the
    /// Download Manager's worker pool (§4.7). This is the "build Directory
    /// Tree would start Download Manager" step of the service lifecycle
    /// (§4.13).
    pub async fn build(
        config: CrateConfig,
        upstream: Arc<dyn UpstreamReader + Send + Sync>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        let tree = Arc::new(DirectoryTree::new(config.global.case_sensitivity));
        let cache = DirectoryCache::new(upstream.as_ref());
        cache.build(&tree, &config.compiler_roots).await;
        info!(nodes = tree.node_count(), "directory tree populated");

        let table = Arc::new(CacheEntryTable::new(u64::MAX));
        let memcache = Arc::new(MemoryCache::new(
            config.global.total_cache_size_bytes,
            config.global.high_watermark,
            config.global.low_watermark,
        ));
        let downloads = Arc::new(DownloadManager::new(
            config.global.download_threads,
            table.clone(),
            memcache.clone(),
            upstream.clone(),
            metrics.clone(),
        ));
        let policy = Arc::new(PolicyEngine::new(config.compiler_roots, config.global.case_sensitivity));
        Self::queue_prefetch(&tree, &table, &policy, &downloads);
        let access = Arc::new(AccessTracker::new());

        let access_report_shutdown = Arc::new(Notify::new());
        let access_report_task = Arc::new(Mutex::new(None));
        if let (Some(dir), Some(interval)) =
            (config.global.access_report_dir.clone(), config.global.access_report_interval)
        {
            info!(dir = %dir.display(), interval_secs = interval.as_secs(), "starting periodic access report task");
            let handle = access.clone().spawn_periodic(dir, interval, access_report_shutdown.clone());
            *access_report_task.lock().expect("access report task lock poisoned") = Some(handle);
        }

        Context {
            tree,
            table,
            memcache,
            downloads,
            policy,
            access,
            metrics,
            upstream,
            access_report_shutdown,
            access_report_task,
        }
    }

    /// Walks every compiler root's `prefetch` patterns against the now
    /// fully-enumerated tree and queues a download for each match, moving
    /// it `Virtual -> Fetching` before any host ever opens it (§3's
    /// pre-cache transition). Best-effort: a root whose `upstream_root` has
    /// no matching files simply queues nothing.
    fn queue_prefetch(
        tree: &Arc<DirectoryTree>,
        table: &Arc<CacheEntryTable>,
        policy: &Arc<PolicyEngine>,
        downloads: &Arc<DownloadManager>,
    ) {
        let case = tree.case_sensitivity();
        let mut queued = 0usize;
        for root in policy.roots() {
            if root.prefetch.is_empty() {
                continue;
            }
            for file in tree.files_under(&root.virtual_root) {
                let relative = root.virtual_root.relative_to(&file.virtual_path);
                if !glob::matches_any(&relative, &root.prefetch, case) {
                    continue;
                }
                let file_policy = policy.policy_for(&file.virtual_path);
                if file_policy == crate::policy::CachePolicy::NeverCache {
                    continue;
                }
                if table.get_or_create(&file.virtual_path, tree, file_policy).is_some() {
                    downloads.queue_download(&file.virtual_path, table);
                    queued += 1;
                }
            }
        }
        if queued > 0 {
            info!(count = queued, "prefetch: queued startup downloads");
        }
    }

    /// `Context::build` with a no-op metrics sink, for tests and demos that
    /// don't care about observation hooks.
    pub async fn build_with_defaults(
        config: CrateConfig,
        upstream: Arc<dyn UpstreamReader + Send + Sync>,
    ) -> Self {
        Self::build(config, upstream, Arc::new(NoopMetrics)).await
    }

    /// Drains and joins the Download Manager's worker pool (§4.7 shutdown),
    /// and wakes and joins the periodic access report task if one was
    /// started. The host's service lifecycle (§4.13) calls this on signal,
    /// before the CLI's own final, manual report flush and exit.
    pub async fn shutdown(&self) {
        self.downloads.shutdown().await;

        self.access_report_shutdown.notify_one();
        let handle = self.access_report_task.lock().expect("access report task lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
