//! CLI entry point and service lifecycle (C13, §4.13).
//!
//! This binary owns the "start -> parse config -> build Directory Tree ->
//! start Download Manager -> expose filesystem -> on signal: drain and
//! shut down workers, flush observability, exit" sequence. Mounting the
//! result under a host filesystem driver (FUSE, WinFsp, ...) is out of
//! scope (§1); this binary stops at handing a [`compiler_cache_fs::Facade`]
//! to whatever in-process consumer wants it, and spends the rest of its
//! life waiting for a shutdown signal the way a real host process would
//! while its driver thread runs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use compiler_cache_fs::access::AccessTracker;
use compiler_cache_fs::config::CrateConfig;
use compiler_cache_fs::context::Context;
use compiler_cache_fs::metrics::{CountingMetrics, Metrics, NoopMetrics};
use compiler_cache_fs::upstream::LocalUpstreamReader;

/// Config load failure.
const EXIT_CONFIG_ERROR: u8 = 2;
/// Fatal initialization error building the directory tree or cache engine.
const EXIT_INIT_ERROR: u8 = 3;

#[derive(Parser)]
#[command(name = "compiler-cache-fs")]
#[command(about = "Read-only caching virtual filesystem for remote compiler toolchains")]
struct Cli {
    /// Path to the TOML configuration file (§6 Config).
    #[clap(long)]
    config: PathBuf,

    /// Mount point to expose the cache under. Accepted and logged; handing
    /// the facade to a real host filesystem driver is out of scope (§1), so
    /// this binary stops at logging where it would have mounted.
    #[clap(long)]
    mount: Option<PathBuf>,

    /// Overrides `[global] download_threads` from the config file.
    #[clap(long)]
    download_threads: Option<usize>,

    /// Raises the tracing filter to `debug`. Repeat for `trace` (§4.13).
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory periodic access-pattern reports are written to (§6
    /// Access-pattern reports). Skipped when unset.
    #[clap(long)]
    access_report_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let default_filter = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();

    let mut config = match CrateConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if let Some(threads) = args.download_threads {
        config.global.download_threads = threads;
    }

    if config.compiler_roots.is_empty() {
        error!("no compiler roots configured, nothing to serve");
        return ExitCode::from(EXIT_INIT_ERROR);
    }

    if let Some(mount) = &args.mount {
        info!(mount = %mount.display(), "mount point accepted; handing control to a host filesystem driver is out of scope, logging only");
    }

    // Each compiler root's `upstream_root` is resolved relative to the
    // host's filesystem view of the network share; `LocalUpstreamReader`
    // treats it as a local path, which is the same shortcut the demo in
    // `demos/local_fs` uses (authentication/transport to the real share is
    // out of scope, §1).
    let upstream: Arc<dyn compiler_cache_fs::upstream::UpstreamReader + Send + Sync> =
        Arc::new(LocalUpstreamReader::new("."));

    let metrics: Arc<dyn Metrics> = if config.global.metrics.enabled {
        info!(
            bind_address = %config.global.metrics.bind_address,
            port = config.global.metrics.port,
            endpoint = %config.global.metrics.endpoint_path,
            "metrics endpoint stub: counters/gauges/histograms are collected in-process; binding an HTTP listener is a host-side exporter's job"
        );
        Arc::new(CountingMetrics::default())
    } else {
        Arc::new(NoopMetrics)
    };

    info!(roots = config.compiler_roots.len(), "building directory tree");
    let context = Context::build(config, upstream, metrics).await;
    info!(nodes = context.tree.node_count(), "directory tree ready, download manager started");

    let facade = compiler_cache_fs::Facade::new(Arc::new(context.clone()));
    let _ = &facade; // handed to the host filesystem driver in a real deployment.

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal, shutting down anyway"),
    }

    context.shutdown().await;

    if let Some(dir) = args.access_report_dir {
        let tracker: &AccessTracker = &context.access;
        if let Err(e) = tracker.write_reports(&dir) {
            error!(error = %e, "failed to flush access reports");
        }
    }

    info!("shutdown complete");
    ExitCode::SUCCESS
}
