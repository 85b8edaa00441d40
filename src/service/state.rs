//! Service configuration and shared state.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::bids::DatasetBrowser;
use crate::decode::NiftiDecoder;
use crate::renderer::PreviewRenderer;
use crate::store::{InMemoryVolumeStore, StoreConfig, VolumeStore};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8000;
/// Default upload limit: 512 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;
/// Default number of renders allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_RENDERS: usize = 4;

/// Service configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Root of the browsable BIDS dataset.
    pub bids_root: PathBuf,
    /// Host-side path of the dataset mount, shown to clients.
    pub bids_host_path: String,
    /// Store capacity in volumes.
    pub store_max_volumes: usize,
    /// Store TTL in seconds, if any.
    pub store_ttl_secs: Option<u64>,
    /// Maximum request body size for uploads.
    pub max_upload_bytes: usize,
    /// Maximum concurrent renders.
    pub max_concurrent_renders: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            bids_root: PathBuf::from("/data/bids"),
            bids_host_path: String::new(),
            store_max_volumes: crate::store::memory::DEFAULT_MAX_VOLUMES,
            store_ttl_secs: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_concurrent_renders: DEFAULT_MAX_CONCURRENT_RENDERS,
        }
    }
}

impl ServiceConfig {
    /// Read configuration from environment variables.
    ///
    /// - `HOST`, `PORT`
    /// - `BIDS_ROOT`, `BIDS_HOST_PATH`
    /// - `STORE_MAX_VOLUMES`, `STORE_TTL_SECS`
    /// - `MAX_UPLOAD_BYTES`, `MAX_CONCURRENT_RENDERS`
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            bids_root: text("BIDS_ROOT").map(PathBuf::from).unwrap_or(defaults.bids_root),
            bids_host_path: lookup("BIDS_HOST_PATH").unwrap_or(defaults.bids_host_path),
            store_max_volumes: positive_or(&lookup, "STORE_MAX_VOLUMES", defaults.store_max_volumes),
            store_ttl_secs: text("STORE_TTL_SECS").and_then(|raw| match raw.parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(secs),
                Err(_) => {
                    warn_invalid("STORE_TTL_SECS", &raw, "unset");
                    None
                }
            }),
            max_upload_bytes: positive_or(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            max_concurrent_renders: positive_or(
                &lookup,
                "MAX_CONCURRENT_RENDERS",
                defaults.max_concurrent_renders,
            ),
        }
    }

    /// Store configuration derived from this config.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_volumes: self.store_max_volumes,
            ttl: self
                .store_ttl_secs
                .and_then(|secs| chrono::Duration::try_seconds(secs as i64)),
        }
    }
}

fn warn_invalid(key: &str, raw: &str, fallback: impl Display) {
    tracing::warn!(
        key = key,
        value = raw,
        fallback = %fallback,
        "invalid configuration value, using default"
    );
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        None => default,
        Some(raw) if raw.is_empty() => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn_invalid(key, &raw, &default);
            default
        }),
    }
}

fn positive_or<F>(lookup: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default) {
        0 => {
            warn_invalid(key, "0", default);
            default
        }
        value => value,
    }
}

/// Shared service state.
pub struct ServiceState<S: VolumeStore + 'static> {
    /// Volume store.
    pub store: Arc<S>,
    /// Preview renderer over the store.
    pub renderer: Arc<PreviewRenderer<S>>,
    /// Dataset browser.
    pub browser: Arc<DatasetBrowser>,
    /// Upload decoder.
    pub decoder: Arc<NiftiDecoder>,
    /// Render admission control.
    pub render_slots: Arc<Semaphore>,
    /// Configuration the service was started with.
    pub config: Arc<ServiceConfig>,
    started_at: Instant,
}

impl ServiceState<InMemoryVolumeStore> {
    /// Create state with an in-memory store sized from `config`.
    pub fn new(config: ServiceConfig) -> Self {
        let store = InMemoryVolumeStore::with_config(config.store_config());
        Self::with_store(store, config)
    }

    /// Create state from environment variables.
    pub fn from_env() -> Self {
        Self::new(ServiceConfig::from_env())
    }
}

impl<S: VolumeStore + 'static> ServiceState<S> {
    /// Create state around an existing store.
    pub fn with_store(store: S, config: ServiceConfig) -> Self {
        let store = Arc::new(store);
        Self {
            renderer: Arc::new(PreviewRenderer::new(Arc::clone(&store))),
            store,
            browser: Arc::new(DatasetBrowser::new(config.bids_root.clone())),
            decoder: Arc::new(NiftiDecoder::default()),
            render_slots: Arc::new(Semaphore::new(config.max_concurrent_renders.max(1))),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    /// Seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl<S: VolumeStore + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            renderer: Arc::clone(&self.renderer),
            browser: Arc::clone(&self.browser),
            decoder: Arc::clone(&self.decoder),
            render_slots: Arc::clone(&self.render_slots),
            config: Arc::clone(&self.config),
            started_at: self.started_at,
        }
    }
}
