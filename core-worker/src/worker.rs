//! # Offline Worker
//!
//! Lifecycle state machine tying the generation manager and the request
//! interceptor together.
//!
//! ```text
//! Parsed ──install──> Installing ──ok──> Installed ──activate──> Activating ──> Activated
//!   ^                     │                                                        │
//!   └───────failure───────┘                                   retire ──> Redundant <┘
//! ```
//!
//! Requests are intercepted only while `Activated`. In every other state the
//! worker does not control the page and requests go straight to the network.
//!
//! ## Channel model
//!
//! [`OfflineWorker::spawn`] moves the worker into a task driven by
//! [`WorkerCommand`]s. Lifecycle commands run one at a time in arrival order;
//! each fetch runs in its own task so a slow origin never holds up others.

use crate::emit;
use crate::error::{Result, WorkerError};
use crate::generation::{CleanupReport, GenerationManager, OptionalPrecache};
use crate::interceptor::{Interception, RequestInterceptor};
use bridge_traits::HttpRequest;
use core_runtime::config::WorkerConfig;
use core_runtime::events::{EventBus, LifecycleEvent, WorkerEvent};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// Capacity of the command channel behind a [`WorkerHandle`].
pub const COMMAND_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Created, not yet installed (or install failed and may be retried)
    Parsed,
    Installing,
    /// Required assets cached, waiting for activation
    Installed,
    Activating,
    /// Controlling requests
    Activated,
    /// Superseded by a newer worker
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }

    /// Whether intercepted requests are answered from the cache.
    pub fn controls_requests(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generation's worker.
pub struct OfflineWorker {
    state: RwLock<WorkerState>,
    generations: GenerationManager,
    interceptor: RequestInterceptor,
    event_bus: Option<Arc<EventBus>>,
}

impl OfflineWorker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            state: RwLock::new(WorkerState::Parsed),
            generations: GenerationManager::new(&config),
            interceptor: RequestInterceptor::new(&config),
            event_bus: config.event_bus,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Name of the store this worker's generation uses
    pub fn store_name(&self) -> &str {
        self.generations.store_name()
    }

    /// Moves the state from `from` to `to`, failing when the worker is elsewhere.
    fn transition(&self, from: WorkerState, to: WorkerState, operation: &str) -> Result<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(WorkerError::InvalidState(format!(
                "cannot {} while {}",
                operation, *state
            )));
        }
        debug!(from = %from, to = %to, "Worker state change");
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: WorkerState) {
        *self.state.write() = to;
    }

    /// Installs this worker's generation.
    ///
    /// On failure the worker returns to `Parsed` so the host may retry.
    #[instrument(skip(self), fields(store = %self.store_name()))]
    pub async fn install(&self) -> Result<OptionalPrecache> {
        self.transition(WorkerState::Parsed, WorkerState::Installing, "install")?;

        match self.generations.install_generation().await {
            Ok(optional) => {
                self.set_state(WorkerState::Installed);
                Ok(optional)
            }
            Err(e) => {
                self.set_state(WorkerState::Parsed);
                Err(e)
            }
        }
    }

    /// Activates the installed generation: removes old stores and claims clients.
    #[instrument(skip(self), fields(store = %self.store_name()))]
    pub async fn activate(&self) -> Result<CleanupReport> {
        self.transition(WorkerState::Installed, WorkerState::Activating, "activate")?;
        emit(
            &self.event_bus,
            WorkerEvent::Lifecycle(LifecycleEvent::Activating {
                generation: self.store_name().to_string(),
            }),
        );

        let report = match self.generations.clear_old_generations().await {
            Ok(report) => report,
            Err(e) => {
                self.set_state(WorkerState::Installed);
                return Err(e);
            }
        };

        self.set_state(WorkerState::Activated);
        info!(removed = report.removed.len(), "Worker activated");
        emit(
            &self.event_bus,
            WorkerEvent::Lifecycle(LifecycleEvent::Activated {
                generation: self.store_name().to_string(),
                removed: report.removed.clone(),
            }),
        );
        Ok(report)
    }

    /// Handles one request according to the current state.
    pub async fn fetch(&self, request: HttpRequest) -> Interception {
        if self.state().controls_requests() {
            self.interceptor.intercept(request).await
        } else {
            self.interceptor.passthrough(request).await
        }
    }

    /// Marks the worker as superseded. It stops intercepting requests.
    pub fn retire(&self) {
        let mut state = self.state.write();
        let previous = *state;
        if previous != WorkerState::Redundant {
            info!(from = %previous, "Worker retired");
            *state = WorkerState::Redundant;
        }
    }

    /// Moves the worker into a background task and returns a handle to it.
    ///
    /// Must be called from within a tokio runtime. The task ends once every
    /// handle has been dropped.
    pub fn spawn(self) -> WorkerHandle {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER_SIZE);
        tokio::spawn(run(Arc::new(self), receiver));
        WorkerHandle { sender }
    }
}

impl fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("state", &self.state())
            .field("store", &self.store_name())
            .finish()
    }
}

/// Messages accepted by a spawned worker.
pub enum WorkerCommand {
    Install {
        reply: oneshot::Sender<Result<OptionalPrecache>>,
    },
    Activate {
        reply: oneshot::Sender<Result<CleanupReport>>,
    },
    Fetch {
        request: HttpRequest,
        reply: oneshot::Sender<Interception>,
    },
    State {
        reply: oneshot::Sender<WorkerState>,
    },
    Retire {
        reply: oneshot::Sender<()>,
    },
}

async fn run(worker: Arc<OfflineWorker>, mut commands: mpsc::Receiver<WorkerCommand>) {
    debug!(store = %worker.store_name(), "Worker loop started");

    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Install { reply } => {
                let _ = reply.send(worker.install().await);
            }
            WorkerCommand::Activate { reply } => {
                let _ = reply.send(worker.activate().await);
            }
            WorkerCommand::Fetch { request, reply } => {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move {
                    let interception = worker.fetch(request).await;
                    if reply.send(interception).is_err() {
                        warn!("Fetch caller went away before the response was ready");
                    }
                });
            }
            WorkerCommand::State { reply } => {
                let _ = reply.send(worker.state());
            }
            WorkerCommand::Retire { reply } => {
                worker.retire();
                let _ = reply.send(());
            }
        }
    }

    debug!(store = %worker.store_name(), "Worker loop stopped");
}

/// Cloneable handle to a spawned [`OfflineWorker`].
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::Sender<WorkerCommand>,
}

impl WorkerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> WorkerCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| WorkerError::Stopped)?;
        response.await.map_err(|_| WorkerError::Stopped)
    }

    pub async fn install(&self) -> Result<OptionalPrecache> {
        self.request(|reply| WorkerCommand::Install { reply }).await?
    }

    pub async fn activate(&self) -> Result<CleanupReport> {
        self.request(|reply| WorkerCommand::Activate { reply }).await?
    }

    pub async fn fetch(&self, request: HttpRequest) -> Result<Interception> {
        self.request(|reply| WorkerCommand::Fetch { request, reply })
            .await
    }

    pub async fn state(&self) -> Result<WorkerState> {
        self.request(|reply| WorkerCommand::State { reply }).await
    }

    pub async fn retire(&self) -> Result<()> {
        self.request(|reply| WorkerCommand::Retire { reply }).await
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::{LocalHostRuntime, MemoryCacheStorage};
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::{CacheKey, CacheStorage, HttpClient, HttpResponse};
    use core_runtime::events::ResponseSource;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Origin that serves every URL until switched offline.
    #[derive(Default)]
    struct SwitchableOrigin {
        offline: AtomicBool,
    }

    #[async_trait]
    impl HttpClient for SwitchableOrigin {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            if self.offline.load(Ordering::SeqCst) {
                Err(BridgeError::Network("offline".to_string()))
            } else {
                Ok(HttpResponse::ok(format!("live {}", request.url)))
            }
        }
    }

    fn worker(origin: Arc<SwitchableOrigin>, storage: Arc<MemoryCacheStorage>) -> OfflineWorker {
        let config = WorkerConfig::builder()
            .version("v3")
            .required_assets(["/", "/offline/"])
            .optional_assets(Vec::<String>::new())
            .http_client(origin)
            .cache_storage(storage)
            .host_runtime(Arc::new(LocalHostRuntime::new()))
            .build()
            .unwrap();
        OfflineWorker::new(config)
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let worker = worker(
            Arc::new(SwitchableOrigin::default()),
            Arc::new(MemoryCacheStorage::new()),
        );
        assert_eq!(worker.state(), WorkerState::Parsed);

        assert!(matches!(
            worker.activate().await,
            Err(WorkerError::InvalidState(_))
        ));

        worker.install().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Installed);
        assert!(matches!(
            worker.install().await,
            Err(WorkerError::InvalidState(_))
        ));

        worker.activate().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Activated);

        worker.retire();
        assert_eq!(worker.state(), WorkerState::Redundant);
        assert!(worker.install().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_install_can_be_retried() {
        let origin = Arc::new(SwitchableOrigin::default());
        origin.offline.store(true, Ordering::SeqCst);
        let worker = worker(origin.clone(), Arc::new(MemoryCacheStorage::new()));

        let err = worker.install().await.unwrap_err();
        assert!(err.is_install_failure());
        assert_eq!(worker.state(), WorkerState::Parsed);

        origin.offline.store(false, Ordering::SeqCst);
        worker.install().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_requests_pass_through_until_activated() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let worker = worker(Arc::new(SwitchableOrigin::default()), storage.clone());
        worker.install().await.unwrap();

        let interception = worker.fetch(HttpRequest::get("/new")).await;
        assert_eq!(interception.source, ResponseSource::Passthrough);

        let store = storage.open("v3::static").await.unwrap();
        assert!(store
            .match_key(&CacheKey::get("/new"))
            .await
            .unwrap()
            .is_none());

        worker.activate().await.unwrap();
        let interception = worker.fetch(HttpRequest::get("/")).await;
        assert_eq!(interception.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_handle_drives_worker() {
        let origin = Arc::new(SwitchableOrigin::default());
        let handle = worker(origin.clone(), Arc::new(MemoryCacheStorage::new())).spawn();

        handle.install().await.unwrap();
        handle.activate().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), WorkerState::Activated);

        origin.offline.store(true, Ordering::SeqCst);
        let interception = handle
            .fetch(HttpRequest::get("/missing").accept("text/html"))
            .await
            .unwrap();
        assert_eq!(interception.source, ResponseSource::Fallback);
        assert_eq!(
            interception.response.unwrap().text().unwrap(),
            "live /offline/"
        );

        handle.retire().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), WorkerState::Redundant);
    }
}
