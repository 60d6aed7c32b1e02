//! Bootstrap helpers for native hosts.
//!
//! Wires the `bridge-desktop` implementations into a [`WorkerConfig`] so a
//! desktop process can run the worker as an in-process caching proxy in front
//! of `origin`.

use crate::error::{Result, WorkerError};
use crate::worker::OfflineWorker;
use bridge_desktop::{LocalHostRuntime, MemoryCacheStorage, ReqwestHttpClient};
use bridge_traits::CacheStorage;
use core_runtime::config::{AssetManifest, WorkerConfig};
use core_runtime::events::EventBus;
use std::sync::Arc;
use tracing::info;

/// Bridges a desktop worker runs on.
pub struct DesktopBridges {
    pub http_client: Arc<ReqwestHttpClient>,
    pub cache_storage: Arc<dyn CacheStorage>,
    pub host_runtime: Arc<LocalHostRuntime>,
}

impl DesktopBridges {
    /// Reqwest client for `origin`, in-memory stores, local host runtime.
    pub fn in_memory(origin: &str) -> Result<Self> {
        Ok(Self {
            http_client: Arc::new(http_client(origin)?),
            cache_storage: Arc::new(MemoryCacheStorage::new()),
            host_runtime: Arc::new(LocalHostRuntime::new()),
        })
    }

    /// Like [`DesktopBridges::in_memory`] but with stores persisted in SQLite
    /// at `db_path`, so generations survive restarts.
    #[cfg(feature = "sqlite-store")]
    pub async fn persistent(origin: &str, db_path: std::path::PathBuf) -> Result<Self> {
        info!(
            database = %core_runtime::logging::strip_path(&db_path.to_string_lossy()),
            "Opening persistent cache storage"
        );
        let storage = bridge_desktop::SqliteCacheStorage::new(db_path)
            .await
            .map_err(WorkerError::Storage)?;

        Ok(Self {
            http_client: Arc::new(http_client(origin)?),
            cache_storage: Arc::new(storage),
            host_runtime: Arc::new(LocalHostRuntime::new()),
        })
    }

    /// Builds a worker configuration from `manifest` on these bridges.
    pub fn config(
        &self,
        manifest: AssetManifest,
        event_bus: Option<Arc<EventBus>>,
    ) -> Result<WorkerConfig> {
        let mut builder = WorkerConfig::builder()
            .manifest(manifest)
            .http_client(self.http_client.clone())
            .cache_storage(Arc::clone(&self.cache_storage))
            .host_runtime(self.host_runtime.clone());

        if let Some(bus) = event_bus {
            builder = builder.event_bus(bus);
        }

        Ok(builder.build()?)
    }
}

fn http_client(origin: &str) -> Result<ReqwestHttpClient> {
    let client = ReqwestHttpClient::new().map_err(|e| {
        WorkerError::Config(core_runtime::Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: e.to_string(),
        })
    })?;
    Ok(client.with_origin(origin))
}

/// Creates an in-memory desktop worker for `manifest` in front of `origin`.
pub fn bootstrap_desktop(origin: &str, manifest: AssetManifest) -> Result<OfflineWorker> {
    let bridges = DesktopBridges::in_memory(origin)?;
    let config = bridges.config(manifest, None)?;
    info!(origin, store = %config.store_name(), "Desktop worker created");
    Ok(OfflineWorker::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerState;

    #[test]
    fn test_bootstrap_uses_manifest() {
        let manifest = AssetManifest {
            version: "v9".to_string(),
            ..AssetManifest::default()
        };

        let worker = bootstrap_desktop("http://127.0.0.1:9", manifest).unwrap();
        assert_eq!(worker.store_name(), "v9::static");
        assert_eq!(worker.state(), WorkerState::Parsed);
    }

    #[test]
    fn test_invalid_manifest_is_rejected() {
        let manifest = AssetManifest {
            version: String::new(),
            ..AssetManifest::default()
        };

        let err = bootstrap_desktop("http://127.0.0.1:9", manifest).unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }
}
