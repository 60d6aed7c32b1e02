//! # Worker Configuration Module
//!
//! Provides configuration management for the offline worker.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `WorkerConfig` holding the current generation, the asset lists, the
//! fallback payloads and the host bridges. `build()` fails fast when a bridge
//! is missing or a value cannot work, so a misconfigured worker never reaches
//! the install step.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - network fetch
//! - `CacheStorage` - named cache stores
//! - `HostRuntime` - takeover control
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{AssetManifest, WorkerConfig};
//! use std::sync::Arc;
//!
//! let manifest = AssetManifest::from_json_str(r#"{
//!     "version": "v0.019",
//!     "required": ["/", "/calculator/"],
//!     "optional": ["/calculator/manifest.json"]
//! }"#)?;
//!
//! let config = WorkerConfig::builder()
//!     .manifest(manifest)
//!     .http_client(Arc::new(MyHttpClient))
//!     .cache_storage(Arc::new(MyCacheStorage))
//!     .host_runtime(Arc::new(MyHost))
//!     .build()?;
//!
//! assert_eq!(config.store_name(), "v0.019::static");
//! ```

use crate::error::{Error, Result};
use crate::events::EventBus;
use bridge_traits::{CacheStorage, HostRuntime, HttpClient};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Separator between the generation version and the store namespace.
pub const GENERATION_SEPARATOR: &str = "::";

/// Version shipped with the default manifest.
pub const DEFAULT_VERSION: &str = "v0.018";

/// Namespace appended to the generation prefix to form the store name.
pub const DEFAULT_NAMESPACE: &str = "static";

/// Cache key under which the offline page is precached.
pub const DEFAULT_OFFLINE_PAGE: &str = "/offline/";

/// Placeholder served to image requests when nothing else is available.
pub const OFFLINE_SVG: &str = r##"<svg role="img" aria-labelledby="offline-title" viewBox="0 0 400 300" xmlns="http://www.w3.org/2000/svg"><title id="offline-title">Offline</title><g fill="none" fill-rule="evenodd"><path fill="#D8D8D8" d="M0 0h400v300H0z"/><text fill="#9B9B9B" font-family="Helvetica Neue,Arial,Helvetica,sans-serif" font-size="72" font-weight="bold"><tspan x="93" y="172">offline</tspan></text></g></svg>"##;

/// Identifies one cache generation.
///
/// Every store the worker creates is named `"{version}::{namespace}"`, and a
/// store belongs to this generation exactly when its name starts with
/// `"{version}::"`. Versions may not contain the separator themselves, which
/// keeps two distinct versions from ever claiming each other's stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationTag {
    version: String,
}

impl GenerationTag {
    pub fn new(version: impl Into<String>) -> Result<Self> {
        let version = version.into();

        if version.trim().is_empty() {
            return Err(Error::Config(
                "Generation version cannot be empty".to_string(),
            ));
        }
        if version.contains(GENERATION_SEPARATOR) {
            return Err(Error::Config(format!(
                "Generation version '{}' must not contain '{}'",
                version, GENERATION_SEPARATOR
            )));
        }

        Ok(Self { version })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Prefix shared by every store of this generation
    pub fn prefix(&self) -> String {
        format!("{}{}", self.version, GENERATION_SEPARATOR)
    }

    /// Name of the store for `namespace` in this generation
    pub fn store_name(&self, namespace: &str) -> String {
        format!("{}{}", self.prefix(), namespace)
    }

    /// Whether `store_name` was created by this generation
    pub fn owns(&self, store_name: &str) -> bool {
        store_name.starts_with(&self.prefix())
    }
}

impl fmt::Display for GenerationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

/// Static image returned to image requests that cannot be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineImage {
    pub body: Bytes,
    pub content_type: String,
}

impl OfflineImage {
    pub fn new(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
        }
    }
}

impl Default for OfflineImage {
    fn default() -> Self {
        Self::new(OFFLINE_SVG, "image/svg+xml")
    }
}

/// Declarative description of what a generation precaches.
///
/// Missing fields fall back to the defaults, so a manifest may only name the
/// parts it changes.
///
/// ```rust
/// use core_runtime::config::AssetManifest;
///
/// let manifest = AssetManifest::from_json_str(r#"{ "version": "v2" }"#).unwrap();
/// assert_eq!(manifest.version, "v2");
/// assert_eq!(manifest.offline_page, "/offline/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetManifest {
    /// Generation version (e.g. `v0.018`)
    pub version: String,
    /// Store namespace appended to the generation prefix
    pub namespace: String,
    /// Assets that must be cached before install succeeds
    pub required: Vec<String>,
    /// Assets cached on a best-effort basis
    pub optional: Vec<String>,
    /// Cache key of the offline page
    pub offline_page: String,
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            required: vec!["/".to_string(), "/calculator/".to_string()],
            optional: vec!["/calculator/manifest.json".to_string()],
            offline_page: DEFAULT_OFFLINE_PAGE.to_string(),
        }
    }
}

impl AssetManifest {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Configuration for one worker generation.
///
/// Use [`WorkerConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Current generation
    pub generation: GenerationTag,

    /// Store namespace within the generation
    pub namespace: String,

    /// Assets whose caching gates installation (ordered, de-duplicated)
    pub required_assets: Vec<String>,

    /// Assets cached without blocking installation (ordered, de-duplicated)
    pub optional_assets: Vec<String>,

    /// Cache key holding the offline page
    pub offline_page: String,

    /// Placeholder for image requests
    pub offline_image: OfflineImage,

    /// Network fetch (required)
    pub http_client: Arc<dyn HttpClient>,

    /// Named cache stores (required)
    pub cache_storage: Arc<dyn CacheStorage>,

    /// Hosting runtime control (required)
    pub host_runtime: Arc<dyn HostRuntime>,

    /// Event bus for lifecycle and cache events (optional)
    pub event_bus: Option<Arc<EventBus>>,
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("generation", &self.generation)
            .field("namespace", &self.namespace)
            .field("required_assets", &self.required_assets)
            .field("optional_assets", &self.optional_assets)
            .field("offline_page", &self.offline_page)
            .field("offline_image", &self.offline_image.content_type)
            .field("http_client", &"HttpClient { ... }")
            .field("cache_storage", &"CacheStorage { ... }")
            .field("host_runtime", &"HostRuntime { ... }")
            .field("event_bus", &self.event_bus.as_ref().map(|_| "EventBus { ... }"))
            .finish()
    }
}

impl WorkerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Name of the current generation's cache store
    pub fn store_name(&self) -> String {
        self.generation.store_name(&self.namespace)
    }

    /// Validates values that can be changed after `build()`.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::Config("Store namespace cannot be empty".to_string()));
        }

        if self.offline_page.trim().is_empty() {
            return Err(Error::Config(
                "Offline page key cannot be empty".to_string(),
            ));
        }

        for url in self.required_assets.iter().chain(&self.optional_assets) {
            validate_asset_url(url)?;
        }

        if self.offline_image.content_type.trim().is_empty() {
            return Err(Error::Config(
                "Offline image content type cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_asset_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::Config("Asset URL cannot be empty".to_string()));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(Error::Config(format!(
            "Asset URL '{}' contains whitespace",
            url
        )));
    }
    Ok(())
}

/// Keeps the first occurrence of every URL.
fn dedupe(urls: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

/// Builder for [`WorkerConfig`].
#[derive(Default)]
pub struct WorkerConfigBuilder {
    manifest: AssetManifest,
    offline_image: Option<OfflineImage>,
    http_client: Option<Arc<dyn HttpClient>>,
    cache_storage: Option<Arc<dyn CacheStorage>>,
    host_runtime: Option<Arc<dyn HostRuntime>>,
    event_bus: Option<Arc<EventBus>>,
}

impl WorkerConfigBuilder {
    /// Replaces version, namespace, asset lists and offline page at once.
    pub fn manifest(mut self, manifest: AssetManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.manifest.version = version.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.manifest.namespace = namespace.into();
        self
    }

    pub fn required_assets<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manifest.required = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn optional_assets<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manifest.optional = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn offline_page(mut self, key: impl Into<String>) -> Self {
        self.manifest.offline_page = key.into();
        self
    }

    pub fn offline_image(mut self, image: OfflineImage) -> Self {
        self.offline_image = Some(image);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn cache_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.cache_storage = Some(storage);
        self
    }

    pub fn host_runtime(mut self, host: Arc<dyn HostRuntime>) -> Self {
        self.host_runtime = Some(host);
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Builds the configuration, failing fast on missing bridges or invalid values.
    pub fn build(self) -> Result<WorkerConfig> {
        let http_client = self.http_client.ok_or_else(|| {
            capability_missing(
                "HttpClient",
                "No network fetch implementation provided. \
                 Desktop: use bridge_desktop::ReqwestHttpClient.",
            )
        })?;
        let cache_storage = self.cache_storage.ok_or_else(|| {
            capability_missing(
                "CacheStorage",
                "No cache storage provided. \
                 Desktop: use bridge_desktop::MemoryCacheStorage or SqliteCacheStorage.",
            )
        })?;
        let host_runtime = self.host_runtime.ok_or_else(|| {
            capability_missing(
                "HostRuntime",
                "No host runtime provided. \
                 Desktop: use bridge_desktop::LocalHostRuntime.",
            )
        })?;

        let manifest = self.manifest;
        let config = WorkerConfig {
            generation: GenerationTag::new(manifest.version)?,
            namespace: manifest.namespace,
            required_assets: dedupe(manifest.required),
            optional_assets: dedupe(manifest.optional),
            offline_page: manifest.offline_page,
            offline_image: self.offline_image.unwrap_or_default(),
            http_client,
            cache_storage,
            host_runtime,
            event_bus: self.event_bus,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{
        error::{BridgeError, Result as BridgeResult},
        CacheStore, HttpRequest, HttpResponse,
    };

    struct NoopHttpClient;

    #[async_trait]
    impl HttpClient for NoopHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(BridgeError::NotAvailable("http".to_string()))
        }
    }

    struct NoopCacheStorage;

    #[async_trait]
    impl CacheStorage for NoopCacheStorage {
        async fn open(&self, _name: &str) -> BridgeResult<Arc<dyn CacheStore>> {
            Err(BridgeError::NotAvailable("cache".to_string()))
        }

        async fn has(&self, _name: &str) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn delete(&self, _name: &str) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct NoopHost;

    #[async_trait]
    impl HostRuntime for NoopHost {
        async fn skip_waiting(&self) -> BridgeResult<()> {
            Ok(())
        }

        async fn claim_clients(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn complete_builder() -> WorkerConfigBuilder {
        WorkerConfig::builder()
            .http_client(Arc::new(NoopHttpClient))
            .cache_storage(Arc::new(NoopCacheStorage))
            .host_runtime(Arc::new(NoopHost))
    }

    #[test]
    fn test_build_with_defaults() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.generation.version(), DEFAULT_VERSION);
        assert_eq!(config.store_name(), "v0.018::static");
        assert_eq!(config.required_assets, vec!["/", "/calculator/"]);
        assert_eq!(config.optional_assets, vec!["/calculator/manifest.json"]);
        assert_eq!(config.offline_page, "/offline/");
        assert_eq!(config.offline_image.content_type, "image/svg+xml");
        assert!(config.event_bus.is_none());
    }

    #[test]
    fn test_builder_requires_http_client() {
        let result = WorkerConfig::builder()
            .cache_storage(Arc::new(NoopCacheStorage))
            .host_runtime(Arc::new(NoopHost))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "HttpClient")
            }
            other => panic!("expected missing HttpClient, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_requires_cache_storage() {
        let result = WorkerConfig::builder()
            .http_client(Arc::new(NoopHttpClient))
            .host_runtime(Arc::new(NoopHost))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "CacheStorage"
        ));
    }

    #[test]
    fn test_builder_requires_host_runtime() {
        let result = WorkerConfig::builder()
            .http_client(Arc::new(NoopHttpClient))
            .cache_storage(Arc::new(NoopCacheStorage))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "HostRuntime"
        ));
    }

    #[test]
    fn test_assets_are_deduplicated_in_order() {
        let config = complete_builder()
            .required_assets(["/", "/calculator/", "/"])
            .optional_assets(["/b", "/a", "/b"])
            .build()
            .unwrap();

        assert_eq!(config.required_assets, vec!["/", "/calculator/"]);
        assert_eq!(config.optional_assets, vec!["/b", "/a"]);
    }

    #[test]
    fn test_empty_required_assets_allowed() {
        let config = complete_builder()
            .required_assets(Vec::<String>::new())
            .build()
            .unwrap();
        assert!(config.required_assets.is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(complete_builder().version("").build().is_err());
        assert!(complete_builder().version("v1::beta").build().is_err());
        assert!(complete_builder().namespace(" ").build().is_err());
        assert!(complete_builder().offline_page("").build().is_err());
        assert!(complete_builder().required_assets([""]).build().is_err());
        assert!(complete_builder()
            .optional_assets(["/has space"])
            .build()
            .is_err());
    }

    #[test]
    fn test_manifest_from_json() {
        let manifest = AssetManifest::from_json_str(
            r#"{
                "version": "v0.019",
                "required": ["/", "/calculator/", "/offline/"],
                "optional": []
            }"#,
        )
        .unwrap();

        let config = complete_builder().manifest(manifest).build().unwrap();
        assert_eq!(config.store_name(), "v0.019::static");
        assert_eq!(config.required_assets.len(), 3);
        assert!(config.optional_assets.is_empty());
        assert_eq!(config.offline_page, DEFAULT_OFFLINE_PAGE);
    }

    #[test]
    fn test_manifest_rejects_malformed_json() {
        let err = AssetManifest::from_json_str("{ version: v1 }").unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }

    #[test]
    fn test_generation_tag_naming() {
        let tag = GenerationTag::new("v0.018").unwrap();

        assert_eq!(tag.prefix(), "v0.018::");
        assert_eq!(tag.store_name("static"), "v0.018::static");
        assert!(tag.owns("v0.018::static"));
        assert!(tag.owns("v0.018::images"));
        assert!(!tag.owns("v0.017::static"));
        // Prefix match, not substring anywhere.
        assert!(!tag.owns("legacy-v0.018::static"));
        assert!(!tag.owns("v0.0181::static"));
    }

    #[test]
    fn test_distinct_tags_never_share_store_names() {
        let versions = ["v1", "v1.0", "v10", "v1-beta", "1v"];
        for a in versions {
            for b in versions {
                let ta = GenerationTag::new(a).unwrap();
                let tb = GenerationTag::new(b).unwrap();
                if a != b {
                    assert_ne!(ta.store_name("static"), tb.store_name("static"));
                    assert!(!tb.owns(&ta.store_name("static")));
                }
            }
        }
    }

    #[test]
    fn test_config_debug_hides_bridges() {
        let config = complete_builder().build().unwrap();
        let debug = format!("{:?}", config);

        assert!(debug.contains("HttpClient { ... }"));
        assert!(debug.contains("v0.018"));
    }
}
