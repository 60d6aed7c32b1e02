//! # Worker Events
//!
//! Progress notifications published by the worker over a
//! `tokio::sync::broadcast` channel: install and activate progress, cache
//! writes, generation cleanup and the source of each served response.
//!
//! Publishing is fire-and-forget. The worker ignores the `SendError` returned
//! when nobody listens, so observers can come and go at any time. Hosts use
//! the bus to drive UI ("ready to work offline") or to collect diagnostics.
//!
//! ```rust
//! use core_runtime::events::{EventBus, EventStream, LifecycleEvent, WorkerEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::default();
//! let mut lifecycle = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, WorkerEvent::Lifecycle(_)));
//!
//! bus.emit(WorkerEvent::Lifecycle(LifecycleEvent::Installing {
//!     generation: "v0.018::static".to_string(),
//! }))
//! .ok();
//!
//! let event = lifecycle.recv().await.unwrap();
//! assert_eq!(event.description(), "Installing generation");
//! # }
//! ```
//!
//! A receiver that falls more than the channel capacity behind gets
//! `RecvError::Lagged(n)` once and then continues with the oldest retained
//! event. `RecvError::Closed` means every `EventBus` clone was dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::TryRecvError};

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Events retained per receiver before it starts lagging.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Worker Event Types
// ============================================================================

/// Everything the worker publishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum WorkerEvent {
    /// Install and activate progress
    Lifecycle(LifecycleEvent),
    /// Cache writes and generation cleanup
    Cache(CacheEvent),
    /// Per-request outcome
    Fetch(FetchEvent),
}

impl WorkerEvent {
    /// Short fixed text naming the event kind.
    pub fn description(&self) -> &str {
        match self {
            WorkerEvent::Lifecycle(e) => e.description(),
            WorkerEvent::Cache(e) => e.description(),
            WorkerEvent::Fetch(e) => e.description(),
        }
    }

    /// Failures that lose work are errors, degraded answers are warnings.
    pub fn severity(&self) -> EventSeverity {
        match self {
            WorkerEvent::Lifecycle(LifecycleEvent::InstallFailed { .. }) => EventSeverity::Error,
            WorkerEvent::Cache(CacheEvent::GenerationDeleteFailed { .. }) => EventSeverity::Error,
            WorkerEvent::Cache(CacheEvent::RefreshFailed { .. }) => EventSeverity::Warning,
            WorkerEvent::Fetch(FetchEvent::Served {
                source: ResponseSource::Unavailable,
                ..
            }) => EventSeverity::Warning,
            WorkerEvent::Lifecycle(LifecycleEvent::Installed { .. })
            | WorkerEvent::Lifecycle(LifecycleEvent::Activated { .. }) => EventSeverity::Info,
            WorkerEvent::Cache(CacheEvent::GenerationDeleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            EventSeverity::Debug => "debug",
            EventSeverity::Info => "info",
            EventSeverity::Warning => "warning",
            EventSeverity::Error => "error",
        })
    }
}

/// Where the response handed back for an intercepted request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Served from the cache; a refresh may still be running.
    Cache,
    /// Cache miss answered by the network.
    Network,
    /// Cache miss and network failure answered by an offline fallback.
    Fallback,
    /// Nothing could answer the request.
    Unavailable,
    /// Forwarded to the network without cache involvement.
    Passthrough,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
            ResponseSource::Fallback => "fallback",
            ResponseSource::Unavailable => "unavailable",
            ResponseSource::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Lifecycle Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum LifecycleEvent {
    /// Install started for a generation.
    Installing { generation: String },
    /// Required assets are cached and the worker asked to take over.
    Installed { generation: String },
    /// Install aborted; the worker stays inactive.
    InstallFailed {
        generation: String,
        /// Human-readable failure reason.
        message: String,
    },
    /// Activation started.
    Activating { generation: String },
    /// Old generations removed and clients claimed.
    Activated {
        generation: String,
        /// Store names deleted during activation.
        removed: Vec<String>,
    },
}

impl LifecycleEvent {
    fn description(&self) -> &str {
        match self {
            LifecycleEvent::Installing { .. } => "Installing generation",
            LifecycleEvent::Installed { .. } => "Generation installed",
            LifecycleEvent::InstallFailed { .. } => "Generation install failed",
            LifecycleEvent::Activating { .. } => "Activating generation",
            LifecycleEvent::Activated { .. } => "Generation activated",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum CacheEvent {
    /// A network response was written to the current store.
    Refreshed { url: String },
    /// A background refresh did not update the store.
    RefreshFailed { url: String, message: String },
    /// An old generation's store was deleted.
    GenerationDeleted { name: String },
    /// Deleting an old generation's store failed.
    GenerationDeleteFailed { name: String, message: String },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::Refreshed { .. } => "Cache entry refreshed",
            CacheEvent::RefreshFailed { .. } => "Cache refresh failed",
            CacheEvent::GenerationDeleted { .. } => "Old generation deleted",
            CacheEvent::GenerationDeleteFailed { .. } => "Old generation delete failed",
        }
    }
}

// ============================================================================
// Fetch Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum FetchEvent {
    /// An intercepted request was answered.
    Served { url: String, source: ResponseSource },
}

impl FetchEvent {
    fn description(&self) -> &str {
        match self {
            FetchEvent::Served { .. } => "Request served",
        }
    }
}

// ============================================================================
// Bus
// ============================================================================

/// Broadcast channel shared by every component of one worker.
///
/// Cloning is cheap and clones publish into the same channel. Receivers only
/// see events emitted after they subscribed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkerEvent>,
}

impl EventBus {
    /// `capacity` is the number of events each receiver may fall behind by.
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity).0,
        }
    }

    /// Publishes `event`, returning how many receivers it reached. Fails only
    /// when there are none.
    pub fn emit(&self, event: WorkerEvent) -> Result<usize, SendError<WorkerEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<WorkerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&WorkerEvent) -> bool + Send + Sync>;

/// Receiver that skips events rejected by an optional predicate.
pub struct EventStream {
    receiver: Receiver<WorkerEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<WorkerEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Keep only events for which `predicate` returns true. Replaces any
    /// earlier predicate.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&WorkerEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &WorkerEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Waits for the next accepted event.
    pub async fn recv(&mut self) -> Result<WorkerEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Next accepted event already buffered, or `None` when the buffer holds
    /// no accepted event.
    pub fn try_recv(&mut self) -> Option<Result<WorkerEvent, RecvError>> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.accepts(&event) {
                return Some(Ok(event));
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
