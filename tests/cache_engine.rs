//! End-to-end tests against the public API: build a `Context` over a
//! temporary directory standing in for an upstream share, then drive it
//! through `Facade` exactly as a host filesystem driver would.

use std::sync::Arc;

use compiler_cache_fs::config::CrateConfig;
use compiler_cache_fs::context::Context;
use compiler_cache_fs::entry::FileState;
use compiler_cache_fs::facade::{self, AccessFlags, ReadOutcome};
use compiler_cache_fs::metrics::CountingMetrics;
use compiler_cache_fs::upstream::LocalUpstreamReader;
use tempfile::TempDir;

async fn context_over(dir: &TempDir, toml: &str) -> Arc<Context> {
    let config = CrateConfig::parse(toml).expect("valid demo config");
    let upstream: Arc<dyn compiler_cache_fs::upstream::UpstreamReader + Send + Sync> =
        Arc::new(LocalUpstreamReader::new(dir.path()));
    Arc::new(Context::build_with_defaults(config, upstream).await)
}

async fn read_whole_file(facade: &facade::Facade, path: &str) -> Vec<u8> {
    let handle = facade::open(facade, path, AccessFlags::read_only()).expect("open");
    loop {
        match facade::read(facade, &handle, 0, 1 << 20).await.expect("read") {
            ReadOutcome::Bytes(bytes) => {
                facade::close(facade, handle);
                return bytes;
            }
            ReadOutcome::Pending => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
        }
    }
}

#[tokio::test]
async fn scenario_six_pending_then_cached_read() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("cl.exe"), b"int main(){}").unwrap();
    let toml = format!(
        "[[compiler_root]]\nvirtual_root = \"/msvc\"\nupstream_root = \"{}\"\n",
        dir.path().display()
    );
    let context = context_over(&dir, &toml).await;
    let fac = facade::Facade::new(context.clone());

    let bytes = read_whole_file(&fac, "/msvc/cl.exe").await;
    assert_eq!(bytes, b"int main(){}".to_vec());

    let entry = context.table.get(&compiler_cache_fs::VirtualPath::normalize("/msvc/cl.exe")).unwrap();
    assert_eq!(entry.state(), FileState::Cached);
    context.shutdown().await;
}

#[tokio::test]
async fn cached_size_reflects_bytes_actually_fetched_not_the_stale_enumeration_size() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("cl.exe"), b"short").unwrap();
    let toml = format!(
        "[[compiler_root]]\nvirtual_root = \"/msvc\"\nupstream_root = \"{}\"\n",
        dir.path().display()
    );
    let context = context_over(&dir, &toml).await;
    let fac = facade::Facade::new(context.clone());

    // The upstream file grows after enumeration but before the fetch runs;
    // the cached entry's reported size must track what was actually read.
    std::fs::write(dir.path().join("cl.exe"), b"a much longer body than before").unwrap();

    let bytes = read_whole_file(&fac, "/msvc/cl.exe").await;
    assert_eq!(bytes.len(), 30);

    let attrs = facade::get_attributes(&fac, "/msvc/cl.exe").unwrap();
    assert_eq!(attrs.size, 30);

    let entry = context.table.get(&compiler_cache_fs::VirtualPath::normalize("/msvc/cl.exe")).unwrap();
    assert_eq!(entry.size(), 30);
    assert!(entry.access_count() > 0);
    context.shutdown().await;
}

#[tokio::test]
async fn on_demand_file_outside_cache_always_still_fetches_and_caches() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("huge.bin"), vec![7u8; 64]).unwrap();
    let toml = format!(
        "[[compiler_root]]\nvirtual_root = \"/msvc\"\nupstream_root = \"{}\"\ncache_always = []\n",
        dir.path().display()
    );
    let context = context_over(&dir, &toml).await;
    let fac = facade::Facade::new(context.clone());

    let bytes = read_whole_file(&fac, "/msvc/huge.bin").await;
    assert_eq!(bytes.len(), 64);

    let entry = context.table.get(&compiler_cache_fs::VirtualPath::normalize("/msvc/huge.bin")).unwrap();
    assert_eq!(entry.policy, compiler_cache_fs::policy::CachePolicy::OnDemand);
    assert_eq!(entry.state(), FileState::Cached);
    context.shutdown().await;
}

#[tokio::test]
async fn prefetch_patterns_queue_downloads_at_startup_without_a_host_open() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("cl.exe"), b"int main(){}").unwrap();
    std::fs::write(dir.path().join("readme.txt"), b"not prefetched").unwrap();
    let toml = format!(
        "[[compiler_root]]\nvirtual_root = \"/msvc\"\nupstream_root = \"{}\"\nprefetch = [\"*.exe\"]\n",
        dir.path().display()
    );
    let context = context_over(&dir, &toml).await;

    let exe = compiler_cache_fs::VirtualPath::normalize("/msvc/cl.exe");
    for _ in 0..50 {
        if context.table.get(&exe).map(|e| e.state()) == Some(FileState::Cached) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(context.table.get(&exe).unwrap().state(), FileState::Cached);

    // readme.txt never matched `prefetch`, so no entry was ever created for it.
    let readme = compiler_cache_fs::VirtualPath::normalize("/msvc/readme.txt");
    assert!(context.table.get(&readme).is_none());

    context.shutdown().await;
}

#[tokio::test]
async fn path_outside_every_compiler_root_is_never_cache_and_bypasses_the_memory_cache() {
    let dir = TempDir::new().unwrap();
    let toml = format!(
        "[[compiler_root]]\nvirtual_root = \"/compilers/msvc/vc142\"\nupstream_root = \"{}\"\n",
        dir.path().display()
    );
    let context = context_over(&dir, &toml).await;

    // `/compilers` is an implicit ancestor directory of the configured
    // root, not itself a boundary match for any compiler root (§4.5): it
    // resolves to NeverCache even though a directory node exists for it.
    let policy = context.policy.policy_for(&compiler_cache_fs::VirtualPath::normalize("/compilers"));
    assert_eq!(policy, compiler_cache_fs::policy::CachePolicy::NeverCache);
    context.shutdown().await;
}

#[tokio::test]
async fn directory_listing_is_sorted_and_filterable() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("bin")).unwrap();
    std::fs::write(dir.path().join("bin/zeta.exe"), b"z").unwrap();
    std::fs::write(dir.path().join("bin/alpha.exe"), b"a").unwrap();
    std::fs::write(dir.path().join("bin/notes.txt"), b"n").unwrap();
    let toml = format!(
        "[[compiler_root]]\nvirtual_root = \"/msvc\"\nupstream_root = \"{}\"\n",
        dir.path().display()
    );
    let context = context_over(&dir, &toml).await;
    let fac = facade::Facade::new(context.clone());

    let all = facade::read_directory(&fac, "/msvc/bin", None).unwrap();
    assert_eq!(all.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(), vec!["alpha.exe", "notes.txt", "zeta.exe"]);

    let exes = facade::read_directory(&fac, "/msvc/bin", Some("*.exe")).unwrap();
    assert_eq!(exes.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(), vec!["alpha.exe", "zeta.exe"]);

    context.shutdown().await;
}

#[tokio::test]
async fn concurrent_reads_of_the_same_path_single_flight_and_converge() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("cl.exe"), vec![9u8; 4096]).unwrap();
    let toml = format!(
        "[[compiler_root]]\nvirtual_root = \"/msvc\"\nupstream_root = \"{}\"\n",
        dir.path().display()
    );
    let context = context_over(&dir, &toml).await;
    let fac = facade::Facade::new(context.clone());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let fac = fac.clone();
        handles.push(tokio::spawn(async move { read_whole_file(&fac, "/msvc/cl.exe").await }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap().len(), 4096);
    }
    assert_eq!(context.memcache.entry_count(), 1);
    context.shutdown().await;
}

#[tokio::test]
async fn scenario_seven_access_tracking_round_trip() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("cl.exe"), b"int main(){}").unwrap();
    let toml = format!(
        "[[compiler_root]]\nvirtual_root = \"/msvc\"\nupstream_root = \"{}\"\n",
        dir.path().display()
    );
    let context = context_over(&dir, &toml).await;
    let fac = facade::Facade::new(context.clone());
    let vp = compiler_cache_fs::VirtualPath::normalize("/msvc/cl.exe");

    let handle = facade::open(&fac, "/msvc/cl.exe", AccessFlags::read_only()).expect("open");
    // First read: Pending (miss, queues the fetch), recorded only once the
    // fetch completes and subsequent reads actually serve bytes.
    let _ = facade::read(&fac, &handle, 0, 4).await.unwrap();
    for _ in 0..50 {
        if handle.entry.state() == FileState::Cached {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    for _ in 0..3 {
        match facade::read(&fac, &handle, 0, 4).await.unwrap() {
            ReadOutcome::Bytes(_) => {}
            ReadOutcome::Pending => panic!("expected cached bytes"),
        }
    }
    facade::close(&fac, handle);

    let stats = context.access.statistics();
    assert_eq!(stats.distinct_paths, 1);
    assert_eq!(stats.cache_hits + stats.cache_misses, stats.total_accesses);
    assert_eq!(stats.total_accesses, 3);
    assert!(stats.top_accessed.iter().any(|(p, _)| p == &vp));
    context.shutdown().await;
}

#[tokio::test]
async fn gauges_and_histograms_update_across_a_fetch_and_cached_read() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("cl.exe"), b"int main(){}").unwrap();
    let toml = format!(
        "[[compiler_root]]\nvirtual_root = \"/msvc\"\nupstream_root = \"{}\"\n",
        dir.path().display()
    );
    let config = CrateConfig::parse(&toml).expect("valid demo config");
    let upstream: Arc<dyn compiler_cache_fs::upstream::UpstreamReader + Send + Sync> =
        Arc::new(LocalUpstreamReader::new(dir.path()));
    let metrics = Arc::new(CountingMetrics::default());
    let context = Arc::new(Context::build(config, upstream, metrics.clone()).await);
    let fac = facade::Facade::new(context.clone());

    let _ = read_whole_file(&fac, "/msvc/cl.exe").await;

    assert!(metrics.cache_bytes() > 0);
    assert_eq!(metrics.cache_entries(), 1);
    assert_eq!(metrics.downloads_completed(), 1);
    // Queue drained back down to idle once the single fetch completed.
    assert_eq!(metrics.pending_downloads(), 0);
    assert_eq!(metrics.active_downloads(), 0);

    context.shutdown().await;
}

#[tokio::test]
async fn unknown_path_surfaces_not_found_on_get_attributes() {
    let dir = TempDir::new().unwrap();
    let toml = format!(
        "[[compiler_root]]\nvirtual_root = \"/msvc\"\nupstream_root = \"{}\"\n",
        dir.path().display()
    );
    let context = context_over(&dir, &toml).await;
    let fac = facade::Facade::new(context.clone());

    assert!(matches!(
        facade::get_attributes(&fac, "/msvc/does-not-exist.h"),
        Err(compiler_cache_fs::Error::NotFound)
    ));
    context.shutdown().await;
}
