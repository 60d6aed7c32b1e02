//! # Request Interceptor
//!
//! Stale-while-revalidate with cache priority.
//!
//! ## Algorithm
//!
//! For every intercepted request:
//! 1. One network fetch starts in its own task.
//! 2. The current generation's store is consulted.
//! 3. A hit is returned at once; the fetch keeps running.
//! 4. A miss waits for the fetch and returns its response.
//! 5. A miss plus a failed fetch goes to the [`OfflineFallback`].
//!
//! Independently of which branch answered, a successful fetch overwrites the
//! stored entry for the request. That write is observable through the
//! [`RefreshHandle`] returned with every [`Interception`].
//!
//! | Cache lookup | Network fetch | Returned |
//! |---|---|---|
//! | hit | ignored | cached response |
//! | miss | success | network response |
//! | miss | failure | fallback (may be `None`) |
//!
//! Only transport failures count as a failed fetch. A `404` or `500` from the
//! origin is a response like any other: it is returned and cached.

use crate::emit;
use crate::fallback::OfflineFallback;
use bridge_traits::{
    error::Result as BridgeResult, CacheKey, CacheStorage, CacheStore, HttpClient, HttpRequest,
    HttpResponse,
};
use core_runtime::config::WorkerConfig;
use core_runtime::events::{CacheEvent, EventBus, FetchEvent, ResponseSource, WorkerEvent};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// How the background fetch for one request settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The network response was written to the store.
    Stored,
    /// The network fetch failed; the store is untouched.
    FetchFailed,
    /// The request cannot be cached (non-GET); nothing was written.
    NotCacheable,
    /// The fetch succeeded but the store rejected the write.
    StoreFailed,
    /// No background fetch was started.
    Skipped,
    /// The refresh task panicked or was cancelled.
    Aborted,
}

/// Join point for the background fetch and cache write of one request.
///
/// Dropping the handle detaches the task; the write still happens.
#[derive(Debug)]
pub struct RefreshHandle {
    task: Option<JoinHandle<RefreshOutcome>>,
}

impl RefreshHandle {
    fn spawned(task: JoinHandle<RefreshOutcome>) -> Self {
        Self { task: Some(task) }
    }

    pub(crate) fn skipped() -> Self {
        Self { task: None }
    }

    /// Whether the refresh has settled (always true when none was started).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the fetch and the cache write to settle.
    pub async fn wait(self) -> RefreshOutcome {
        let Some(task) = self.task else {
            return RefreshOutcome::Skipped;
        };

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Refresh task did not complete");
                RefreshOutcome::Aborted
            }
        }
    }
}

/// Result of intercepting one request.
#[derive(Debug)]
pub struct Interception {
    /// What the requester receives. `None` when nothing could answer.
    pub response: Option<HttpResponse>,
    /// Which branch produced `response`.
    pub source: ResponseSource,
    /// Background fetch and cache write.
    pub refresh: RefreshHandle,
}

/// Decides the response for each request and keeps the current store fresh.
pub struct RequestInterceptor {
    store_name: String,
    http_client: Arc<dyn HttpClient>,
    cache_storage: Arc<dyn CacheStorage>,
    fallback: OfflineFallback,
    event_bus: Option<Arc<EventBus>>,
}

impl RequestInterceptor {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            store_name: config.store_name(),
            http_client: Arc::clone(&config.http_client),
            cache_storage: Arc::clone(&config.cache_storage),
            fallback: OfflineFallback::from_config(config),
            event_bus: config.event_bus.clone(),
        }
    }

    /// Name of the store lookups and writes go to
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Answers `request` from the cache or the network and schedules the
    /// background refresh.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn intercept(&self, request: HttpRequest) -> Interception {
        let key = request.cache_key();
        let accept = request.accept_header().map(str::to_string);
        let store = self.open_store().await;

        let (network_tx, network_rx) = oneshot::channel();
        let (lookup_tx, lookup_rx) = oneshot::channel();
        let refresh = RefreshHandle::spawned(tokio::spawn(refresh_entry(
            Arc::clone(&self.http_client),
            store.clone(),
            key.clone(),
            request,
            RefreshChannels {
                network_tx,
                lookup_rx,
            },
            self.event_bus.clone(),
        )));

        let cached = self.lookup(store.as_deref(), &key).await;
        let _ = lookup_tx.send(());

        if let Some(cached) = cached {
            debug!("Serving from cache");
            return self.served(&key, Some(cached), ResponseSource::Cache, refresh);
        }

        // A dropped sender means the refresh task died before fetching.
        if let Ok(Ok(response)) = network_rx.await {
            debug!(status = response.status, "Cache miss served from network");
            return self.served(&key, Some(response), ResponseSource::Network, refresh);
        }

        let fallback = self
            .fallback
            .resolve(accept.as_deref(), store.as_deref())
            .await;
        let source = if fallback.is_some() {
            ResponseSource::Fallback
        } else {
            ResponseSource::Unavailable
        };
        debug!(source = %source, "Cache miss and network failure");
        self.served(&key, fallback, source, refresh)
    }

    /// Forwards `request` to the network without touching the cache.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn passthrough(&self, request: HttpRequest) -> Interception {
        let key = request.cache_key();
        let response = match self.http_client.execute(request).await {
            Ok(response) => Some(response),
            Err(e) => {
                debug!(error = %e, "Uncontrolled request failed");
                None
            }
        };

        self.served(
            &key,
            response,
            ResponseSource::Passthrough,
            RefreshHandle::skipped(),
        )
    }

    async fn open_store(&self) -> Option<Arc<dyn CacheStore>> {
        match self.cache_storage.open(&self.store_name).await {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(store = %self.store_name, error = %e, "Cache store unavailable");
                None
            }
        }
    }

    async fn lookup(
        &self,
        store: Option<&dyn CacheStore>,
        key: &CacheKey,
    ) -> Option<HttpResponse> {
        let store = store?;
        match store.match_key(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    fn served(
        &self,
        key: &CacheKey,
        response: Option<HttpResponse>,
        source: ResponseSource,
        refresh: RefreshHandle,
    ) -> Interception {
        emit(
            &self.event_bus,
            WorkerEvent::Fetch(FetchEvent::Served {
                url: key.url.clone(),
                source,
            }),
        );

        Interception {
            response,
            source,
            refresh,
        }
    }
}

struct RefreshChannels {
    /// Network result for an interceptor waiting on a miss
    network_tx: oneshot::Sender<BridgeResult<HttpResponse>>,
    /// Closed once the cache lookup has read the store
    lookup_rx: oneshot::Receiver<()>,
}

/// Performs the single network fetch for a request, hands the result to the
/// waiting interceptor, then writes a successful response to the store.
///
/// The write waits for the lookup so a hit always observes the entry as it
/// was before this request's refresh.
async fn refresh_entry(
    http_client: Arc<dyn HttpClient>,
    store: Option<Arc<dyn CacheStore>>,
    key: CacheKey,
    request: HttpRequest,
    channels: RefreshChannels,
    event_bus: Option<Arc<EventBus>>,
) -> RefreshOutcome {
    let RefreshChannels {
        network_tx,
        lookup_rx,
    } = channels;

    let response = match http_client.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            debug!(url = %key.url, error = %e, "Background fetch failed");
            emit(
                &event_bus,
                WorkerEvent::Cache(CacheEvent::RefreshFailed {
                    url: key.url.clone(),
                    message: e.to_string(),
                }),
            );
            // The receiver is gone when the request was already answered.
            let _ = network_tx.send(Err(e));
            return RefreshOutcome::FetchFailed;
        }
    };

    let _ = network_tx.send(Ok(response.clone()));

    if !key.is_cacheable() {
        return RefreshOutcome::NotCacheable;
    }

    let Some(store) = store else {
        return RefreshOutcome::StoreFailed;
    };

    // Err only means the interceptor went away, which also ends the lookup.
    let _ = lookup_rx.await;

    match store.put(key.clone(), response).await {
        Ok(()) => {
            debug!(url = %key.url, store = store.name(), "Cache entry refreshed");
            emit(
                &event_bus,
                WorkerEvent::Cache(CacheEvent::Refreshed { url: key.url }),
            );
            RefreshOutcome::Stored
        }
        Err(e) => {
            warn!(url = %key.url, error = %e, "Failed to store refreshed response");
            emit(
                &event_bus,
                WorkerEvent::Cache(CacheEvent::RefreshFailed {
                    url: key.url,
                    message: e.to_string(),
                }),
            );
            RefreshOutcome::StoreFailed
        }
    }
}
