//! # Desktop Bridge Implementations
//!
//! Native implementations of the bridge traits, so the offline worker can run
//! as an in-process caching proxy outside a browser.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `CacheStorage` kept in memory (`parking_lot` locks)
//! - `CacheStorage` persisted in SQLite via `sqlx`
//! - `HostRuntime` that records takeover requests
//!
//! ## Feature Flags
//!
//! - `sqlite-store`: Enable the SQLite-backed cache storage (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{LocalHostRuntime, MemoryCacheStorage, ReqwestHttpClient};
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new()?.with_origin("https://example.org"));
//! let storage = Arc::new(MemoryCacheStorage::new());
//! let host = Arc::new(LocalHostRuntime::new());
//! ```

mod host;
mod http;
mod memory_cache;

#[cfg(feature = "sqlite-store")]
mod sqlite_cache;

pub use host::LocalHostRuntime;
pub use http::ReqwestHttpClient;
pub use memory_cache::{MemoryCacheStorage, MemoryCacheStore};

#[cfg(feature = "sqlite-store")]
pub use sqlite_cache::{SqliteCacheStorage, SqliteCacheStore};
