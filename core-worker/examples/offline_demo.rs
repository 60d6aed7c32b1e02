//! Offline worker demonstration
//!
//! Installs a generation for a site served at `origin`, activates it and
//! fetches a few pages, printing where each response came from. Lifecycle and
//! cache events are printed as they happen. Stop the origin after the first
//! round to watch the cache and fallbacks take over.
//!
//! Run with:
//! ```bash
//! # Default manifest against a local origin
//! cargo run -p core-worker --features desktop-shims --example offline_demo
//!
//! # Custom origin and manifest
//! cargo run -p core-worker --features desktop-shims --example offline_demo -- \
//!     http://127.0.0.1:8080 manifest.json
//! ```

use bridge_traits::time::LogLevel;
use bridge_traits::HttpRequest;
use core_runtime::config::AssetManifest;
use core_runtime::events::{EventBus, EventStream, WorkerEvent};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_worker::desktop::DesktopBridges;
use core_worker::OfflineWorker;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let origin = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "http://127.0.0.1:8000".to_string());

    let manifest = match args.get(2) {
        Some(path) => {
            let raw = std::fs::read_to_string(path).expect("Failed to read manifest");
            AssetManifest::from_json_str(&raw).expect("Failed to parse manifest")
        }
        None => AssetManifest::default(),
    };

    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    )
    .expect("Failed to initialize logging");

    let bus = Arc::new(EventBus::default());
    // Per-request events are already printed by the fetch loop below.
    let mut events = EventStream::new(bus.subscribe())
        .filter(|event| !matches!(event, WorkerEvent::Fetch(_)));
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[{:?}] {}", event.severity(), event.description());
        }
    });

    let config = DesktopBridges::in_memory(&origin)
        .and_then(|bridges| bridges.config(manifest, Some(bus)))
        .expect("Failed to create worker");
    let worker = OfflineWorker::new(config).spawn();

    match worker.install().await {
        Ok(optional) => {
            let stored = optional.wait().await;
            info!(optional_assets_stored = stored, "Generation installed");
        }
        Err(e) => {
            error!(error = %e, "Install failed, requests will pass through");
        }
    }

    if let Err(e) = worker.activate().await {
        error!(error = %e, "Activation failed");
    }

    for round in 1..=2 {
        info!(round, "Fetching pages");
        for (url, accept) in [
            ("/", "text/html"),
            ("/calculator/", "text/html"),
            ("/missing-page/", "text/html"),
            ("/missing.png", "image/png,image/*"),
        ] {
            let interception = worker
                .fetch(HttpRequest::get(url).accept(accept))
                .await
                .expect("Worker stopped");
            let status = interception.response.as_ref().map(|r| r.status);
            println!("{:<16} {:<12} {:?}", url, interception.source.as_str(), status);
            interception.refresh.wait().await;
        }

        if round == 1 {
            println!("Stop the origin now to see offline behaviour...");
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }
}
