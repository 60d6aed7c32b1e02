//! # Host Bridge Traits
//!
//! Capabilities the offline worker needs from whatever runtime hosts it.
//!
//! ## Overview
//!
//! The worker core never talks to a network stack, a storage engine or a page
//! controller directly. Each of those is a trait defined here and implemented
//! per host (`bridge-desktop` for native builds; a browser host maps them onto
//! `fetch`, `caches` and `clients`).
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Network fetch
//! - [`CacheStorage`](storage::CacheStorage) / [`CacheStore`](storage::CacheStore) - Named response stores
//! - [`HostRuntime`](host::HostRuntime) - `skip_waiting` / `claim_clients`
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Shared descriptors
//!
//! [`HttpRequest`], [`HttpResponse`] and [`CacheKey`] are the concrete request,
//! response and cache-key types every component exchanges.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map transport failures to `BridgeError::Network` and backend
//! failures to `BridgeError::Storage` so the core can tell them apart.
//!
//! ## Thread Safety
//!
//! On native targets every trait requires `Send + Sync`; on `wasm32` the bound
//! is dropped (see [`platform`]).

pub mod error;
pub mod host;
pub mod http;
pub mod platform;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use host::HostRuntime;
pub use http::{CacheKey, HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use storage::{CacheStorage, CacheStore};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
