//! HTTP Client Abstraction
//!
//! Request and response descriptors shared by every component, plus the
//! network fetch capability the host must provide.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};
use crate::platform::PlatformSendSync;

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(BridgeError::OperationFailed(format!(
                "Unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

/// Looks a header up ignoring ASCII case, the way HTTP header names compare.
fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// An intercepted request as seen by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Shorthand for a `GET` request, which is what navigations and asset loads are.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the `Accept` header.
    pub fn accept(self, value: impl Into<String>) -> Self {
        self.header("Accept", value)
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns a header value, matching the name case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// The requester's declared acceptable content types.
    pub fn accept_header(&self) -> Option<&str> {
        self.header_value("accept")
    }

    /// Normalized descriptor used to address cache entries.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.method, &self.url)
    }
}

/// Full response snapshot, storable as a cache value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// A `200 OK` response carrying `body`.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header_value("content-type")
    }

    /// Get response body as UTF-8 string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Normalized request descriptor used as the cache key.
///
/// Only the method and the URL (minus any fragment) take part in matching;
/// request headers are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub method: HttpMethod,
    pub url: String,
}

impl CacheKey {
    pub fn new(method: HttpMethod, url: &str) -> Self {
        let url = match url.split_once('#') {
            Some((base, _fragment)) => base,
            None => url,
        };
        Self {
            method,
            url: url.to_string(),
        }
    }

    /// `GET` key for a URL, as used for precached assets and the offline page.
    pub fn get(url: &str) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Cache stores only hold `GET` exchanges.
    pub fn is_cacheable(&self) -> bool {
        self.method == HttpMethod::Get
    }

    /// Rejects keys a store must not write, like the browser `Cache.put`
    /// refusing non-`GET` requests.
    pub fn ensure_cacheable(&self) -> Result<()> {
        if self.is_cacheable() {
            Ok(())
        } else {
            Err(BridgeError::OperationFailed(format!(
                "Request method '{}' is unsupported by the cache",
                self.method
            )))
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

impl From<&HttpRequest> for CacheKey {
    fn from(request: &HttpRequest) -> Self {
        request.cache_key()
    }
}

/// Network fetch capability.
///
/// A returned `Ok` means the exchange completed at the transport level,
/// whatever the status code. `Err` is reserved for failures where no response
/// exists at all (offline, DNS, TLS, connection reset).
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn load(client: &dyn HttpClient) -> Result<String> {
///     let response = client.execute(HttpRequest::get("/calculator/")).await?;
///     response.text()
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait HttpClient: PlatformSendSync {
    /// Execute an HTTP request
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Network` if no response could be obtained.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::get("/calculator/")
            .accept("text/html,application/xhtml+xml")
            .header("User-Agent", "test");

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "/calculator/");
        assert_eq!(
            request.accept_header(),
            Some("text/html,application/xhtml+xml")
        );
        assert_eq!(request.header_value("user-agent"), Some("test"));
    }

    #[test]
    fn test_accept_header_missing() {
        let request = HttpRequest::get("/");
        assert_eq!(request.accept_header(), None);
    }

    #[test]
    fn test_cache_key_ignores_fragment_and_headers() {
        let a = HttpRequest::get("/calculator/#memory").accept("text/html");
        let b = HttpRequest::get("/calculator/").accept("*/*");

        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key().to_string(), "GET /calculator/");
    }

    #[test]
    fn test_cache_key_distinguishes_method() {
        let get = CacheKey::get("/a");
        let post = CacheKey::new(HttpMethod::Post, "/a");

        assert_ne!(get, post);
        assert!(get.is_cacheable());
        assert!(!post.is_cacheable());
    }

    #[test]
    fn test_ensure_cacheable_rejects_non_get() {
        assert!(CacheKey::get("/a").ensure_cacheable().is_ok());

        let err = CacheKey::new(HttpMethod::Put, "/a")
            .ensure_cacheable()
            .unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(ref msg) if msg.contains("PUT")));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("OPTIONS".parse::<HttpMethod>().unwrap(), HttpMethod::Options);
        assert!("BREW".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_http_response_helpers() {
        let response = HttpResponse::ok("<svg/>").with_header("Content-Type", "image/svg+xml");

        assert!(response.is_success());
        assert_eq!(response.content_type(), Some("image/svg+xml"));
        assert_eq!(response.text().unwrap(), "<svg/>");
        assert!(!HttpResponse::new(503, "").is_success());
    }

    #[test]
    fn test_response_snapshot_serializes() {
        let response = HttpResponse::ok("body").with_header("ETag", "\"1\"");
        let json = serde_json::to_string(&response).unwrap();
        let restored: HttpResponse = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, response);
    }
}
