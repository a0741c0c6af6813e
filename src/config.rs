//! Config Loader (C12, §4.12): parses the crate's TOML configuration file,
//! grounded on the teacher's `serde` + `toml` usage and the original
//! implementation's `ConfigParser`.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::glob::CaseSensitivity;
use crate::path::VirtualPath;
use crate::policy::CompilerRoot;

fn default_download_threads() -> usize {
    4
}

fn default_total_cache_size_mb() -> u64 {
    8192
}

fn default_high_watermark() -> f64 {
    0.90
}

fn default_low_watermark() -> f64 {
    0.80
}

fn default_case_sensitive() -> bool {
    cfg!(not(windows))
}

fn default_eviction_policy() -> String {
    "lru".to_string()
}

fn default_metrics_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_endpoint_path() -> String {
    "/metrics".to_string()
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    global: RawGlobal,
    #[serde(default)]
    compiler_root: Vec<RawCompilerRoot>,
}

#[derive(Debug, Deserialize)]
struct RawGlobal {
    #[serde(default = "default_download_threads")]
    download_threads: usize,
    #[serde(default = "default_total_cache_size_mb")]
    total_cache_size_mb: u64,
    #[serde(default = "default_high_watermark")]
    high_watermark: f64,
    #[serde(default = "default_low_watermark")]
    low_watermark: f64,
    #[serde(default = "default_case_sensitive")]
    case_sensitive: bool,
    /// Only `"lru"` is implemented (`MemoryCache`'s eviction order); present
    /// so a config document naming another policy fails to load instead of
    /// silently running LRU anyway.
    #[serde(default = "default_eviction_policy")]
    eviction_policy: String,
    /// Reserved for an on-disk cache tier; this crate is memory-only and
    /// never reads or writes this directory.
    cache_directory: Option<String>,
    /// Directory periodic access-pattern reports are written to (§4.11).
    /// Reporting is disabled when unset.
    access_report_dir: Option<String>,
    /// How often to flush access-pattern reports, in seconds. Ignored when
    /// `access_report_dir` is unset.
    access_report_interval_secs: Option<u64>,
    #[serde(default)]
    metrics: RawMetrics,
}

impl Default for RawGlobal {
    fn default() -> Self {
        RawGlobal {
            download_threads: default_download_threads(),
            total_cache_size_mb: default_total_cache_size_mb(),
            high_watermark: default_high_watermark(),
            low_watermark: default_low_watermark(),
            case_sensitive: default_case_sensitive(),
            eviction_policy: default_eviction_policy(),
            cache_directory: None,
            access_report_dir: None,
            access_report_interval_secs: None,
            metrics: RawMetrics::default(),
        }
    }
}

/// `[global.metrics]`: the Observation Hooks endpoint a real deployment would
/// bind. This crate only implements the `Metrics` trait and an in-process
/// snapshot (§4.10); binding an actual HTTP listener on `bind_address:port`
/// is the host-side exporter's job, out of scope per §1.
#[derive(Debug, Deserialize)]
struct RawMetrics {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_metrics_bind_address")]
    bind_address: String,
    #[serde(default = "default_metrics_port")]
    port: u16,
    #[serde(default = "default_metrics_endpoint_path")]
    endpoint_path: String,
}

impl Default for RawMetrics {
    fn default() -> Self {
        RawMetrics {
            enabled: false,
            bind_address: default_metrics_bind_address(),
            port: default_metrics_port(),
            endpoint_path: default_metrics_endpoint_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCompilerRoot {
    virtual_root: String,
    upstream_root: String,
    #[serde(default)]
    cache_always: Vec<String>,
    #[serde(default)]
    prefetch: Vec<String>,
    size_budget_mb: Option<u64>,
}

/// Global knobs that apply across every compiler root.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub download_threads: usize,
    pub total_cache_size_bytes: u64,
    pub high_watermark: f64,
    pub low_watermark: f64,
    pub case_sensitivity: CaseSensitivity,
    /// Always `"lru"` today; validated at load time rather than carried
    /// as a free-form string the rest of the crate would have to branch on.
    pub eviction_policy: String,
    /// Reserved on-disk cache tier directory; parsed and carried through
    /// but never read from or written to by this crate.
    pub cache_directory: Option<std::path::PathBuf>,
    /// Where periodic access-pattern reports land; reporting is disabled
    /// when `None` (§4.11).
    pub access_report_dir: Option<std::path::PathBuf>,
    /// How often to flush access-pattern reports while the service runs.
    /// Ignored when `access_report_dir` is `None`.
    pub access_report_interval: Option<std::time::Duration>,
    /// Metrics endpoint stub settings (§4.12, §6 Observability).
    pub metrics: MetricsConfig,
}

/// Validated `[global.metrics]` settings. When `enabled` is `false`, the
/// service still collects counters/gauges/histograms through `Metrics` but
/// reports them nowhere; no listener is ever bound.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    pub endpoint_path: String,
}

/// Fully validated configuration: ready to build the [`DirectoryTree`] and
/// [`PolicyEngine`] from (see `crate::context`).
#[derive(Debug, Clone)]
pub struct CrateConfig {
    pub global: GlobalConfig,
    pub compiler_roots: Vec<CompilerRoot>,
}

impl CrateConfig {
    /// Parses and validates `contents` as TOML.
    pub fn parse(contents: &str) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(contents).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        Self::from_raw(raw)
    }

    /// Loads and validates the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&contents)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        if raw.global.high_watermark <= raw.global.low_watermark {
            return Err(Error::Config(format!(
                "high_watermark ({}) must exceed low_watermark ({})",
                raw.global.high_watermark, raw.global.low_watermark
            )));
        }
        if !(0.0..=1.0).contains(&raw.global.high_watermark)
            || !(0.0..=1.0).contains(&raw.global.low_watermark)
        {
            return Err(Error::Config("watermarks must be fractions between 0.0 and 1.0".to_string()));
        }
        if raw.compiler_root.is_empty() {
            return Err(Error::Config("at least one [[compiler_root]] is required".to_string()));
        }

        let case_sensitivity = if raw.global.case_sensitive {
            CaseSensitivity::Sensitive
        } else {
            CaseSensitivity::Insensitive
        };

        let mut compiler_roots = Vec::with_capacity(raw.compiler_root.len());
        for root in raw.compiler_root {
            if root.upstream_root.trim().is_empty() {
                return Err(Error::Config(format!(
                    "compiler_root '{}' has an empty upstream_root",
                    root.virtual_root
                )));
            }
            for pattern in root.cache_always.iter().chain(root.prefetch.iter()) {
                if pattern.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "compiler_root '{}' has an empty glob pattern",
                        root.virtual_root
                    )));
                }
                if let Err(reason) = crate::glob::validate_pattern(pattern) {
                    return Err(Error::Config(format!(
                        "compiler_root '{}' has a malformed glob pattern '{}': {}",
                        root.virtual_root, pattern, reason
                    )));
                }
            }
            let mut compiler_root =
                CompilerRoot::new(VirtualPath::normalize(&root.virtual_root), root.upstream_root);
            compiler_root.cache_always = root.cache_always;
            compiler_root.prefetch = root.prefetch;
            compiler_root.size_budget_bytes = root.size_budget_mb.map(|mb| mb * 1024 * 1024);
            compiler_roots.push(compiler_root);
        }

        if raw.global.access_report_dir.is_some() && raw.global.access_report_interval_secs == Some(0) {
            return Err(Error::Config(
                "access_report_interval_secs must be greater than zero".to_string(),
            ));
        }

        if raw.global.metrics.enabled && !raw.global.metrics.endpoint_path.starts_with('/') {
            return Err(Error::Config(format!(
                "[global.metrics] endpoint_path '{}' must start with '/'",
                raw.global.metrics.endpoint_path
            )));
        }

        if raw.global.eviction_policy != "lru" {
            return Err(Error::Config(format!(
                "unsupported eviction_policy '{}': only 'lru' is implemented",
                raw.global.eviction_policy
            )));
        }

        Ok(CrateConfig {
            global: GlobalConfig {
                download_threads: raw.global.download_threads,
                total_cache_size_bytes: raw.global.total_cache_size_mb * 1024 * 1024,
                high_watermark: raw.global.high_watermark,
                low_watermark: raw.global.low_watermark,
                case_sensitivity,
                eviction_policy: raw.global.eviction_policy,
                cache_directory: raw.global.cache_directory.map(std::path::PathBuf::from),
                access_report_dir: raw.global.access_report_dir.map(std::path::PathBuf::from),
                access_report_interval: raw
                    .global
                    .access_report_interval_secs
                    .map(std::time::Duration::from_secs),
                metrics: MetricsConfig {
                    enabled: raw.global.metrics.enabled,
                    bind_address: raw.global.metrics.bind_address,
                    port: raw.global.metrics.port,
                    endpoint_path: raw.global.metrics.endpoint_path,
                },
            },
            compiler_roots,
        })
    }
}
