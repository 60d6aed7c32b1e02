//! In-memory cache storage

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    http::{CacheKey, HttpResponse},
    storage::{CacheStorage, CacheStore},
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Process-local cache storage.
///
/// Stores live for as long as the storage value does. Useful for tests and for
/// hosts that rebuild the cache on every start.
#[derive(Default)]
pub struct MemoryCacheStorage {
    stores: RwLock<Vec<Arc<MemoryCacheStore>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        let mut stores = self.stores.write();
        if let Some(existing) = stores.iter().find(|store| store.name == name) {
            return Ok(existing.clone());
        }

        debug!(store = name, "Creating in-memory cache store");
        let store = Arc::new(MemoryCacheStore::new(name));
        stores.push(store.clone());
        Ok(store)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.stores.read().iter().any(|store| store.name == name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut stores = self.stores.write();
        let before = stores.len();
        stores.retain(|store| store.name != name);
        Ok(stores.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .stores
            .read()
            .iter()
            .map(|store| store.name.clone())
            .collect())
    }
}

/// One named in-memory store.
pub struct MemoryCacheStore {
    name: String,
    entries: RwLock<HashMap<CacheKey, HttpResponse>>,
}

impl MemoryCacheStore {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &CacheKey) -> Result<Option<HttpResponse>> {
        if !key.is_cacheable() {
            return Ok(None);
        }
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: CacheKey, response: HttpResponse) -> Result<()> {
        key.ensure_cacheable()?;
        self.entries.write().insert(key, response);
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(CacheKey, HttpResponse)>) -> Result<()> {
        for (key, _) in &entries {
            key.ensure_cacheable()?;
        }

        let mut stored = self.entries.write();
        stored.extend(entries);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let mut keys: Vec<CacheKey> = self.entries.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::HttpMethod;

    #[tokio::test]
    async fn test_open_creates_and_reuses_store() {
        let storage = MemoryCacheStorage::new();
        let first = storage.open("v1::static").await.unwrap();
        first
            .put(CacheKey::get("/"), HttpResponse::ok("home"))
            .await
            .unwrap();

        let second = storage.open("v1::static").await.unwrap();
        let hit = second.match_key(&CacheKey::get("/")).await.unwrap();

        assert_eq!(hit, Some(HttpResponse::ok("home")));
        assert_eq!(storage.keys().await.unwrap(), vec!["v1::static"]);
    }

    #[tokio::test]
    async fn test_keys_keep_creation_order() {
        let storage = MemoryCacheStorage::new();
        storage.open("v2::static").await.unwrap();
        storage.open("v1::static").await.unwrap();
        storage.open("other").await.unwrap();

        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["v2::static", "v1::static", "other"]
        );
    }

    #[tokio::test]
    async fn test_delete_store() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1::static").await.unwrap();

        assert!(storage.delete("v1::static").await.unwrap());
        assert!(!storage.delete("v1::static").await.unwrap());
        assert!(!storage.has("v1::static").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let storage = MemoryCacheStorage::new();
        let store = storage.open("v1::static").await.unwrap();

        store
            .put(CacheKey::get("/a"), HttpResponse::ok("old"))
            .await
            .unwrap();
        store
            .put(CacheKey::get("/a"), HttpResponse::ok("new"))
            .await
            .unwrap();

        let hit = store.match_key(&CacheKey::get("/a")).await.unwrap().unwrap();
        assert_eq!(hit.text().unwrap(), "new");
    }

    #[tokio::test]
    async fn test_non_get_requests_are_not_cached() {
        let storage = MemoryCacheStorage::new();
        let store = storage.open("v1::static").await.unwrap();
        let key = CacheKey::new(HttpMethod::Post, "/submit");

        assert!(store.put(key.clone(), HttpResponse::ok("x")).await.is_err());
        assert_eq!(store.match_key(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_all_is_all_or_nothing() {
        let storage = MemoryCacheStorage::new();
        let store = storage.open("v1::static").await.unwrap();

        let result = store
            .put_all(vec![
                (CacheKey::get("/"), HttpResponse::ok("home")),
                (CacheKey::new(HttpMethod::Post, "/"), HttpResponse::ok("nope")),
            ])
            .await;

        assert!(result.is_err());
        assert!(store.keys().await.unwrap().is_empty());
    }
}
