//! Offline fallback responses
//!
//! Consulted only when a request missed the cache and the network fetch
//! failed. The choice is driven by the requester's `Accept` header alone.

use bridge_traits::{CacheKey, CacheStore, HttpResponse};
use core_runtime::config::{OfflineImage, WorkerConfig};
use tracing::{debug, warn};

/// What kind of substitute an `Accept` header asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    /// The static offline image
    Image,
    /// The cached offline page
    Page,
    /// No substitute applies
    None,
}

impl FallbackKind {
    /// Classifies an `Accept` header. Image wins over HTML when both appear.
    pub fn from_accept(accept: Option<&str>) -> Self {
        match accept {
            Some(accept) if accept.contains("image") => FallbackKind::Image,
            Some(accept) if accept.contains("text/html") => FallbackKind::Page,
            _ => FallbackKind::None,
        }
    }
}

/// Produces substitute responses for requests nothing else could answer.
#[derive(Debug, Clone)]
pub struct OfflineFallback {
    offline_page: CacheKey,
    offline_image: OfflineImage,
}

impl OfflineFallback {
    pub fn new(offline_page: &str, offline_image: OfflineImage) -> Self {
        Self {
            offline_page: CacheKey::get(offline_page),
            offline_image,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(&config.offline_page, config.offline_image.clone())
    }

    /// Cache key the offline page is looked up under
    pub fn offline_page_key(&self) -> &CacheKey {
        &self.offline_page
    }

    /// The placeholder image as a `200` response.
    pub fn image_response(&self) -> HttpResponse {
        HttpResponse::ok(self.offline_image.body.clone())
            .with_header("Content-Type", self.offline_image.content_type.clone())
    }

    /// Resolves the fallback for `accept` against the current store.
    ///
    /// Returns `None` when no substitute applies, when the offline page was
    /// never cached, or when no store is available to look it up in.
    pub async fn resolve(
        &self,
        accept: Option<&str>,
        store: Option<&dyn CacheStore>,
    ) -> Option<HttpResponse> {
        match FallbackKind::from_accept(accept) {
            FallbackKind::Image => Some(self.image_response()),
            FallbackKind::Page => {
                let store = store?;
                match store.match_key(&self.offline_page).await {
                    Ok(page) => {
                        if page.is_none() {
                            debug!(key = %self.offline_page, "Offline page is not cached");
                        }
                        page
                    }
                    Err(e) => {
                        warn!(key = %self.offline_page, error = %e, "Offline page lookup failed");
                        None
                    }
                }
            }
            FallbackKind::None => None,
        }
    }
}
