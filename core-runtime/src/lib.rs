//! # Core Runtime
//!
//! Shared runtime pieces for the offline worker crates:
//!
//! - [`config`]: asset manifest, generation tags and the `WorkerConfig` builder
//! - [`events`]: the broadcast bus carrying lifecycle, cache and fetch events
//! - [`logging`]: `tracing-subscriber` setup and credential redaction

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AssetManifest, GenerationTag, OfflineImage, WorkerConfig, WorkerConfigBuilder};
pub use error::{Error, Result};
pub use events::{EventBus, EventStream, ResponseSource, WorkerEvent};
