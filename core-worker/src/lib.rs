//! # Offline Worker Core
//!
//! An offline-caching proxy for a small static site: every request is
//! answered from a versioned cache when possible while a background fetch
//! keeps that cache fresh.
//!
//! ## Components
//!
//! - [`GenerationManager`] - creates, seeds and retires cache generations
//! - [`RequestInterceptor`] - stale-while-revalidate with cache priority
//! - [`OfflineFallback`] - substitute responses keyed on `Accept`
//! - [`OfflineWorker`] - lifecycle state machine over the three, with a
//!   channel-driven [`WorkerHandle`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::WorkerConfig;
//! use core_worker::OfflineWorker;
//!
//! let config = WorkerConfig::builder()
//!     .http_client(http)
//!     .cache_storage(storage)
//!     .host_runtime(host)
//!     .build()?;
//!
//! let worker = OfflineWorker::new(config).spawn();
//! worker.install().await?;
//! worker.activate().await?;
//!
//! let interception = worker.fetch(HttpRequest::get("/calculator/")).await?;
//! ```

pub mod error;
pub mod fallback;
pub mod generation;
pub mod interceptor;
pub mod worker;

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub mod desktop;

pub use core_runtime::events::ResponseSource;
pub use error::{Result, WorkerError};
pub use fallback::{FallbackKind, OfflineFallback};
pub use generation::{CleanupReport, GenerationManager, OptionalPrecache};
pub use interceptor::{Interception, RefreshHandle, RefreshOutcome, RequestInterceptor};
pub use worker::{OfflineWorker, WorkerCommand, WorkerHandle, WorkerState};

use core_runtime::events::{EventBus, WorkerEvent};
use std::sync::Arc;

pub(crate) fn emit(event_bus: &Option<Arc<EventBus>>, event: WorkerEvent) {
    if let Some(bus) = event_bus {
        // No subscribers is fine.
        let _ = bus.emit(event);
    }
}
