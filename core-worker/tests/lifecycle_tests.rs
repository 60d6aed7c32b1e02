//! Integration tests for the worker lifecycle
//!
//! These tests verify:
//! - Install atomicity for required assets
//! - Best-effort optional assets
//! - Generation isolation across version upgrades
//! - Takeover requests to the host
//! - Lifecycle events
//! - Persistence of generations in SQLite

mod common;

use bridge_desktop::{LocalHostRuntime, SqliteCacheStorage};
use bridge_traits::{CacheKey, CacheStorage, HttpRequest};
use common::{Harness, ScriptedOrigin};
use core_runtime::config::{AssetManifest, GenerationTag, WorkerConfig};
use core_runtime::events::{CacheEvent, EventStream, LifecycleEvent, WorkerEvent};
use core_worker::{OfflineWorker, ResponseSource, WorkerError, WorkerState};
use std::sync::Arc;

#[tokio::test]
async fn install_then_activate_serves_from_cache_offline() {
    let harness = Harness::new();
    harness.serve_site();

    let worker = OfflineWorker::new(harness.config("v0.018")).spawn();
    let optional = worker.install().await.unwrap();
    assert!(optional.wait().await);
    assert!(harness.host.waiting_skipped());

    worker.activate().await.unwrap();
    assert!(harness.host.clients_claimed());
    assert_eq!(worker.state().await.unwrap(), WorkerState::Activated);

    harness.origin.fail("/calculator/");
    let interception = worker
        .fetch(HttpRequest::get("/calculator/"))
        .await
        .unwrap();

    assert_eq!(interception.source, ResponseSource::Cache);
    assert_eq!(interception.response.unwrap().text().unwrap(), "calculator");
}

#[tokio::test]
async fn failed_required_asset_fails_install() {
    let harness = Harness::new();
    harness.serve_site();
    harness.origin.fail("/calculator/");

    let worker = OfflineWorker::new(harness.config("v0.018"));
    let err = worker.install().await.unwrap_err();

    assert!(err.is_install_failure());
    assert!(matches!(err, WorkerError::InstallFailed { ref url, .. } if url == "/calculator/"));
    assert_eq!(worker.state(), WorkerState::Parsed);
    assert!(!harness.host.waiting_skipped());
    assert!(harness
        .stored_text("v0.018::static", "/")
        .await
        .is_none());

    // Not activated, so requests never touch the cache.
    let interception = worker.fetch(HttpRequest::get("/")).await;
    assert_eq!(interception.source, ResponseSource::Passthrough);
}

#[tokio::test]
async fn failed_optional_asset_does_not_block_install() {
    let harness = Harness::new();
    harness.serve_site();
    harness.origin.fail("/calculator/manifest.json");

    let worker = OfflineWorker::new(harness.config("v0.018"));
    let optional = worker.install().await.unwrap();

    assert!(!optional.wait().await);
    assert_eq!(worker.state(), WorkerState::Installed);
    assert_eq!(
        harness.stored_text("v0.018::static", "/").await.as_deref(),
        Some("home")
    );
    assert!(harness
        .stored_text("v0.018::static", "/calculator/manifest.json")
        .await
        .is_none());
}

#[tokio::test]
async fn upgrade_removes_previous_generation_only() {
    let harness = Harness::new();
    harness.serve_site();

    let first = OfflineWorker::new(harness.config("v0.017"));
    first.install().await.unwrap();
    first.activate().await.unwrap();
    harness.put("unrelated-store", "/x", "x").await;

    let second = OfflineWorker::new(harness.config("v0.018"));
    second.install().await.unwrap();
    first.retire();
    let report = second.activate().await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.removed, vec!["v0.017::static", "unrelated-store"]);
    assert_eq!(
        harness.storage.keys().await.unwrap(),
        vec!["v0.018::static"]
    );
    assert_eq!(first.state(), WorkerState::Redundant);
}

#[tokio::test]
async fn distinct_generations_never_collide() {
    let harness = Harness::new();
    let versions = ["v1", "v1.1", "v11", "v1-rc", "2"];

    for current in versions {
        for other in versions.iter().filter(|other| **other != current) {
            harness.storage.open(&format!("{}::static", other)).await.unwrap();
        }
        harness
            .storage
            .open(&format!("{}::static", current))
            .await
            .unwrap();

        let tag = GenerationTag::new(current).unwrap();
        let config = WorkerConfig::builder()
            .manifest(AssetManifest {
                version: current.to_string(),
                required: Vec::new(),
                optional: Vec::new(),
                ..AssetManifest::default()
            })
            .http_client(harness.origin.clone())
            .cache_storage(harness.storage.clone())
            .host_runtime(harness.host.clone())
            .build()
            .unwrap();

        let worker = OfflineWorker::new(config);
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let remaining = harness.storage.keys().await.unwrap();
        assert_eq!(remaining, vec![tag.store_name("static")]);
    }
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let harness = Harness::new();
    harness.serve_site();
    harness.storage.open("v0.017::static").await.unwrap();

    let mut events = EventStream::new(harness.event_bus.subscribe())
        .filter(|event| !matches!(event, WorkerEvent::Fetch(_)));

    let worker = OfflineWorker::new(harness.config("v0.018"));
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    let mut lifecycle = Vec::new();
    let mut deleted = Vec::new();
    while let Some(Ok(event)) = events.try_recv() {
        match event {
            WorkerEvent::Lifecycle(event) => lifecycle.push(event),
            WorkerEvent::Cache(CacheEvent::GenerationDeleted { name }) => deleted.push(name),
            _ => {}
        }
    }

    assert_eq!(
        lifecycle,
        vec![
            LifecycleEvent::Installing {
                generation: "v0.018::static".to_string()
            },
            LifecycleEvent::Installed {
                generation: "v0.018::static".to_string()
            },
            LifecycleEvent::Activating {
                generation: "v0.018::static".to_string()
            },
            LifecycleEvent::Activated {
                generation: "v0.018::static".to_string(),
                removed: vec!["v0.017::static".to_string()],
            },
        ]
    );
    assert_eq!(deleted, vec!["v0.017::static"]);
}

#[tokio::test]
async fn install_failure_is_published() {
    let harness = Harness::new();
    let mut events = EventStream::new(harness.event_bus.subscribe())
        .filter(|event| matches!(event, WorkerEvent::Lifecycle(_)));

    let worker = OfflineWorker::new(harness.config("v0.018"));
    assert!(worker.install().await.is_err());

    let mut saw_failure = false;
    while let Some(Ok(event)) = events.try_recv() {
        if let WorkerEvent::Lifecycle(LifecycleEvent::InstallFailed { generation, message }) = event
        {
            assert_eq!(generation, "v0.018::static");
            assert!(!message.is_empty());
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn generations_persist_in_sqlite() {
    let origin = ScriptedOrigin::new();
    origin.respond("/", "home");
    origin.respond("/calculator/", "calculator");
    origin.respond("/calculator/manifest.json", "{}");

    let storage = Arc::new(SqliteCacheStorage::in_memory().await.unwrap());
    storage.open("v0.017::static").await.unwrap();

    let config = WorkerConfig::builder()
        .http_client(origin.clone())
        .cache_storage(storage.clone())
        .host_runtime(Arc::new(LocalHostRuntime::new()))
        .build()
        .unwrap();

    let worker = OfflineWorker::new(config);
    assert!(worker.install().await.unwrap().wait().await);
    worker.activate().await.unwrap();

    assert_eq!(storage.keys().await.unwrap(), vec!["v0.018::static"]);

    origin.fail("/");
    let interception = worker.fetch(HttpRequest::get("/")).await;
    assert_eq!(interception.response.unwrap().text().unwrap(), "home");

    let store = storage.open("v0.018::static").await.unwrap();
    assert!(store
        .match_key(&CacheKey::get("/calculator/manifest.json"))
        .await
        .unwrap()
        .is_some());
}
