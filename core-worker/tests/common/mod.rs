//! Shared fakes for the worker integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::{LocalHostRuntime, MemoryCacheStorage};
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    CacheKey, CacheStorage, HttpClient, HttpRequest, HttpResponse,
};
use core_runtime::config::WorkerConfig;
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
enum Route {
    Respond { response: HttpResponse, delay: Duration },
    Fail { delay: Duration },
}

/// Origin with per-URL scripted answers. Unknown URLs fail like a dropped
/// connection. Every call is recorded.
#[derive(Default)]
pub struct ScriptedOrigin {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, body: &'static str) {
        self.respond_after(url, body, Duration::ZERO);
    }

    pub fn respond_after(&self, url: &str, body: &'static str, delay: Duration) {
        self.routes.lock().insert(
            url.to_string(),
            Route::Respond {
                response: HttpResponse::ok(body),
                delay,
            },
        );
    }

    pub fn fail(&self, url: &str) {
        self.fail_after(url, Duration::ZERO);
    }

    pub fn fail_after(&self, url: &str, delay: Duration) {
        self.routes
            .lock()
            .insert(url.to_string(), Route::Fail { delay });
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|call| *call == url).count()
    }
}

#[async_trait]
impl HttpClient for ScriptedOrigin {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.calls.lock().push(request.url.clone());
        let route = self.routes.lock().get(&request.url).cloned();

        match route {
            Some(Route::Respond { response, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(response)
            }
            Some(Route::Fail { delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(BridgeError::Network(format!("{} unreachable", request.url)))
            }
            None => Err(BridgeError::Network("connection refused".to_string())),
        }
    }
}

pub struct Harness {
    pub origin: Arc<ScriptedOrigin>,
    pub storage: Arc<MemoryCacheStorage>,
    pub host: Arc<LocalHostRuntime>,
    pub event_bus: Arc<EventBus>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            origin: ScriptedOrigin::new(),
            storage: Arc::new(MemoryCacheStorage::new()),
            host: Arc::new(LocalHostRuntime::new()),
            event_bus: Arc::new(EventBus::new(64)),
        }
    }

    /// Configuration for `version` with the default calculator asset lists.
    pub fn config(&self, version: &str) -> WorkerConfig {
        WorkerConfig::builder()
            .version(version)
            .http_client(self.origin.clone())
            .cache_storage(self.storage.clone())
            .host_runtime(self.host.clone())
            .event_bus(self.event_bus.clone())
            .build()
            .expect("valid test configuration")
    }

    /// Serves every default asset including the offline page.
    pub fn serve_site(&self) {
        self.origin.respond("/", "home");
        self.origin.respond("/calculator/", "calculator");
        self.origin.respond("/calculator/manifest.json", "{}");
        self.origin.respond("/offline/", "offline page");
    }

    pub async fn put(&self, store: &str, url: &str, body: &'static str) {
        self.storage
            .open(store)
            .await
            .unwrap()
            .put(CacheKey::get(url), HttpResponse::ok(body))
            .await
            .unwrap();
    }

    pub async fn stored_text(&self, store: &str, url: &str) -> Option<String> {
        self.storage
            .open(store)
            .await
            .unwrap()
            .match_key(&CacheKey::get(url))
            .await
            .unwrap()
            .map(|response| response.text().unwrap())
    }
}
