//! Cache Storage Abstractions
//!
//! Named, persistent key→response stores in the shape of the browser Cache
//! Storage API. The core only ever addresses stores by name; how they persist
//! is up to the host:
//! - Web: `CacheStorage` / `Cache` objects
//! - Desktop: in-memory maps or a SQLite database
//!
//! Implementations must make each individual `match_key`/`put` atomic per key.
//! Concurrent writers to the same key resolve last-write-wins.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::http::{CacheKey, HttpResponse};
use crate::platform::PlatformSendSync;

/// Handle to one named cache store.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::CacheStore;
/// use bridge_traits::http::CacheKey;
///
/// async fn offline_page(store: &dyn CacheStore) -> Result<Option<HttpResponse>> {
///     store.match_key(&CacheKey::get("/offline/")).await
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait CacheStore: PlatformSendSync {
    /// Name this handle was opened with
    fn name(&self) -> &str;

    /// Look up the stored response for a key
    ///
    /// Non-`GET` keys never match.
    async fn match_key(&self, key: &CacheKey) -> Result<Option<HttpResponse>>;

    /// Store a response, replacing any previous value for the key
    ///
    /// # Errors
    ///
    /// Fails for non-`GET` keys and on backend write failures.
    async fn put(&self, key: CacheKey, response: HttpResponse) -> Result<()>;

    /// Store a batch of responses as one unit
    ///
    /// Either every entry is written or none is.
    async fn put_all(&self, entries: Vec<(CacheKey, HttpResponse)>) -> Result<()>;

    /// Remove one entry, returning whether it existed
    async fn delete(&self, key: &CacheKey) -> Result<bool>;

    /// List every stored key
    async fn keys(&self) -> Result<Vec<CacheKey>>;
}

/// Registry of named cache stores.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::CacheStorage;
///
/// async fn drop_all_but(storage: &dyn CacheStorage, keep: &str) -> Result<()> {
///     for name in storage.keys().await? {
///         if name != keep {
///             storage.delete(&name).await?;
///         }
///     }
///     Ok(())
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait CacheStorage: PlatformSendSync {
    /// Open the store with the given name, creating it if absent
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>>;

    /// Check whether a store exists without creating it
    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete a store and everything in it
    ///
    /// Returns `false` when no store had that name.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all stores, in creation order
    async fn keys(&self) -> Result<Vec<String>>;
}
