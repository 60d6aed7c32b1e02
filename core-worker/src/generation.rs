//! # Cache Generation Manager
//!
//! Owns the store of the current generation: seeds it on install and removes
//! the stores of every other generation on activation.
//!
//! ## Install
//!
//! 1. Open (or create) the store `"{version}::{namespace}"`.
//! 2. Start caching the optional assets in the background. Their outcome
//!    never affects install.
//! 3. Fetch every required asset concurrently. Each must answer `2xx`; the
//!    batch is then committed with one `put_all`. Any failure fails install.
//! 4. Ask the host to activate this generation without waiting.
//!
//! ## Activate
//!
//! Deletes every store whose name does not start with the current prefix.
//! Deletions are independent: one failing is reported and the others still
//! run. The host is then asked to claim every open client.

use crate::emit;
use crate::error::{Result, WorkerError};
use bridge_traits::{
    CacheKey, CacheStorage, CacheStore, HostRuntime, HttpClient, HttpRequest, HttpResponse,
};
use core_runtime::config::{GenerationTag, WorkerConfig};
use core_runtime::events::{CacheEvent, EventBus, LifecycleEvent, WorkerEvent};
use futures::future::{join_all, try_join_all};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Background caching of the optional assets started by install.
///
/// Dropping the handle detaches the task.
#[derive(Debug)]
pub struct OptionalPrecache {
    task: Option<JoinHandle<bool>>,
}

impl OptionalPrecache {
    /// Waits for the optional batch and reports whether it was stored.
    ///
    /// An empty optional list counts as stored.
    pub async fn wait(self) -> bool {
        match self.task {
            Some(task) => task.await.unwrap_or(false),
            None => true,
        }
    }
}

/// Outcome of deleting stale generations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Store names that were deleted
    pub removed: Vec<String>,
    /// Store names whose deletion failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct GenerationManager {
    generation: GenerationTag,
    store_name: String,
    required_assets: Vec<String>,
    optional_assets: Vec<String>,
    http_client: Arc<dyn HttpClient>,
    cache_storage: Arc<dyn CacheStorage>,
    host_runtime: Arc<dyn HostRuntime>,
    event_bus: Option<Arc<EventBus>>,
}

impl GenerationManager {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            generation: config.generation.clone(),
            store_name: config.store_name(),
            required_assets: config.required_assets.clone(),
            optional_assets: config.optional_assets.clone(),
            http_client: Arc::clone(&config.http_client),
            cache_storage: Arc::clone(&config.cache_storage),
            host_runtime: Arc::clone(&config.host_runtime),
            event_bus: config.event_bus.clone(),
        }
    }

    pub fn generation(&self) -> &GenerationTag {
        &self.generation
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Seeds the current generation's store and requests immediate activation.
    ///
    /// # Errors
    ///
    /// - `WorkerError::InstallFailed` when a required asset cannot be fetched
    ///   or answers with a non-2xx status
    /// - `WorkerError::Storage` when the store cannot be opened or written
    /// - `WorkerError::Host` when `skip_waiting` fails
    #[instrument(skip(self), fields(store = %self.store_name))]
    pub async fn install_generation(&self) -> Result<OptionalPrecache> {
        self.emit_lifecycle(LifecycleEvent::Installing {
            generation: self.store_name.clone(),
        });

        match self.seed().await {
            Ok(optional) => {
                info!(
                    required = self.required_assets.len(),
                    optional = self.optional_assets.len(),
                    "Generation installed"
                );
                self.emit_lifecycle(LifecycleEvent::Installed {
                    generation: self.store_name.clone(),
                });
                Ok(optional)
            }
            Err(e) => {
                warn!(error = %e, "Generation install failed");
                self.emit_lifecycle(LifecycleEvent::InstallFailed {
                    generation: self.store_name.clone(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn seed(&self) -> Result<OptionalPrecache> {
        let store = self
            .cache_storage
            .open(&self.store_name)
            .await
            .map_err(WorkerError::Storage)?;

        let optional = self.spawn_optional_precache(Arc::clone(&store));

        add_all(self.http_client.as_ref(), store.as_ref(), &self.required_assets).await?;

        self.host_runtime
            .skip_waiting()
            .await
            .map_err(WorkerError::Host)?;

        Ok(optional)
    }

    fn spawn_optional_precache(&self, store: Arc<dyn CacheStore>) -> OptionalPrecache {
        if self.optional_assets.is_empty() {
            return OptionalPrecache { task: None };
        }

        let http_client = Arc::clone(&self.http_client);
        let urls = self.optional_assets.clone();
        let task = tokio::spawn(async move {
            match add_all(http_client.as_ref(), store.as_ref(), &urls).await {
                Ok(()) => {
                    debug!(count = urls.len(), "Optional assets cached");
                    true
                }
                Err(e) => {
                    debug!(error = %e, "Optional assets not cached");
                    false
                }
            }
        });

        OptionalPrecache { task: Some(task) }
    }

    /// Deletes every store not owned by the current generation, then asks
    /// the host to claim all open clients.
    ///
    /// Individual deletion failures are collected in the report. A failure to
    /// list the stores is logged and skips cleanup; neither blocks takeover.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Host` when `claim_clients` fails.
    #[instrument(skip(self), fields(store = %self.store_name))]
    pub async fn clear_old_generations(&self) -> Result<CleanupReport> {
        let report = match self.cache_storage.keys().await {
            Ok(names) => self.delete_stale(names).await,
            Err(e) => {
                warn!(error = %e, "Could not list cache stores, skipping cleanup");
                CleanupReport::default()
            }
        };

        self.host_runtime
            .claim_clients()
            .await
            .map_err(WorkerError::Host)?;

        info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Old generations cleared"
        );
        Ok(report)
    }

    async fn delete_stale(&self, names: Vec<String>) -> CleanupReport {
        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| !self.generation.owns(name))
            .collect();

        let deletions = stale.iter().map(|name| async move {
            (name, self.cache_storage.delete(name).await)
        });

        let mut report = CleanupReport::default();
        for (name, outcome) in join_all(deletions).await {
            match outcome {
                Ok(true) => {
                    debug!(name = %name, "Deleted old generation");
                    report.removed.push(name.clone());
                    emit(
                        &self.event_bus,
                        WorkerEvent::Cache(CacheEvent::GenerationDeleted { name: name.clone() }),
                    );
                }
                Ok(false) => {
                    debug!(name = %name, "Old generation already gone");
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "Failed to delete old generation");
                    report.failed.push((name.clone(), e.to_string()));
                    emit(
                        &self.event_bus,
                        WorkerEvent::Cache(CacheEvent::GenerationDeleteFailed {
                            name: name.clone(),
                            message: e.to_string(),
                        }),
                    );
                }
            }
        }
        report
    }

    fn emit_lifecycle(&self, event: LifecycleEvent) {
        emit(&self.event_bus, WorkerEvent::Lifecycle(event));
    }
}

/// Fetches every URL concurrently and stores the batch all-or-nothing.
async fn add_all(
    http_client: &dyn HttpClient,
    store: &dyn CacheStore,
    urls: &[String],
) -> Result<()> {
    if urls.is_empty() {
        return Ok(());
    }

    let entries = try_join_all(urls.iter().map(|url| fetch_asset(http_client, url))).await?;

    store.put_all(entries).await.map_err(WorkerError::Storage)
}

async fn fetch_asset(
    http_client: &dyn HttpClient,
    url: &str,
) -> Result<(CacheKey, HttpResponse)> {
    let response = http_client
        .execute(HttpRequest::get(url))
        .await
        .map_err(|e| WorkerError::InstallFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !response.is_success() {
        return Err(WorkerError::InstallFailed {
            url: url.to_string(),
            reason: format!("HTTP status {}", response.status),
        });
    }

    Ok((CacheKey::get(url), response))
}
