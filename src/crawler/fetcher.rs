//! HTTP transport
//!
//! This module handles every HTTP request the engine makes, including:
//! - Building a pooled keep-alive client with a shared DNS cache
//! - Conditional requests from remembered ETag/Last-Modified metadata
//! - Streaming bodies under a hard byte ceiling
//! - A whole-request timeout enforced by cancellation
//! - Error classification into stable codes

use crate::config::TransportConfig;
use crate::crawler::dns::{CachingResolver, DnsCache, DnsStats};
use lru::LruCache;
use reqwest::header::{
    HeaderMap, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use reqwest::{redirect::Policy, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised by the transport
///
/// All of them are recoverable at the per-URL level.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timeout: {url} did not complete within {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("response_too_large: {url} exceeded {limit} bytes")]
    ResponseTooLarge { url: String, limit: usize },

    #[error("invalid_url: {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("network: {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::ResponseTooLarge { .. } => "response_too_large",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::Network { .. } => "network",
        }
    }

    fn from_reqwest(url: &Url, source: reqwest::Error, after: Duration) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                after,
            }
        } else if source.is_builder() {
            Self::InvalidUrl {
                url: url.to_string(),
                reason: source.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Per-request options
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Send `If-None-Match`/`If-Modified-Since` when metadata is remembered
    pub conditional: bool,

    /// Override of the transport's byte ceiling
    pub max_bytes: Option<usize>,
}

impl FetchOptions {
    pub fn conditional() -> Self {
        Self {
            conditional: true,
            max_bytes: None,
        }
    }
}

/// Validators remembered for a URL from its last 2xx response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl ResourceMetadata {
    fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            etag: header_string(headers, ETAG.as_str()),
            last_modified: header_string(headers, LAST_MODIFIED.as_str()),
        }
    }

    fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Outcome of a completed request
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    /// True for a `304`; the body is then empty
    pub not_modified: bool,
    /// Body bytes; only read for 2xx responses
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<String> {
        header_string(&self.headers, CONTENT_TYPE.as_str())
    }

    pub fn etag(&self) -> Option<String> {
        header_string(&self.headers, ETAG.as_str())
    }

    pub fn last_modified(&self) -> Option<String> {
        header_string(&self.headers, LAST_MODIFIED.as_str())
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Counters exposed for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStats {
    pub requests: u64,
    pub responses: u64,
    pub not_modified: u64,
    pub network_errors: u64,
    pub oversized: u64,
    pub dns: DnsStats,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    responses: AtomicU64,
    not_modified: AtomicU64,
    network_errors: AtomicU64,
    oversized: AtomicU64,
}

/// Pooled, DNS-cached HTTP client shared by every job
pub struct HttpTransport {
    client: Client,
    dns: Arc<DnsCache>,
    metadata: Mutex<LruCache<String, ResourceMetadata>>,
    timeout: Duration,
    max_bytes: usize,
    counters: Counters,
}

impl HttpTransport {
    /// Builds the transport and its underlying client
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sumi_harvest::config::TransportConfig;
    /// use sumi_harvest::crawler::HttpTransport;
    ///
    /// let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
    /// ```
    pub fn new(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        let dns = Arc::new(DnsCache::new(
            config.dns_cache_size,
            Duration::from_secs(config.dns_ttl_secs),
        ));
        let timeout = Duration::from_secs(config.timeout_secs);

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(Policy::limited(config.max_redirects))
            .dns_resolver(Arc::new(CachingResolver::new(Arc::clone(&dns))))
            .gzip(true)
            .brotli(true)
            .build()?;

        let metadata_capacity =
            NonZeroUsize::new(config.metadata_cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            client,
            dns,
            metadata: Mutex::new(LruCache::new(metadata_capacity)),
            timeout,
            max_bytes: config.max_bytes,
            counters: Counters::default(),
        })
    }

    fn metadata(&self) -> MutexGuard<'_, LruCache<String, ResourceMetadata>> {
        self.metadata.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remembers validators for `url`, as if a 2xx response had carried them
    pub fn remember(&self, url: &Url, metadata: ResourceMetadata) {
        if metadata.is_empty() {
            self.metadata().pop(url.as_str());
        } else {
            self.metadata().put(url.to_string(), metadata);
        }
    }

    /// Returns the validators remembered for `url`
    pub fn metadata_for(&self, url: &Url) -> Option<ResourceMetadata> {
        self.metadata().get(url.as_str()).cloned()
    }

    pub fn dns_stats(&self) -> DnsStats {
        self.dns.stats()
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            responses: self.counters.responses.load(Ordering::Relaxed),
            not_modified: self.counters.not_modified.load(Ordering::Relaxed),
            network_errors: self.counters.network_errors.load(Ordering::Relaxed),
            oversized: self.counters.oversized.load(Ordering::Relaxed),
            dns: self.dns.stats(),
        }
    }

    /// Fetches `url`
    ///
    /// # Request Flow
    ///
    /// 1. Attach conditional headers when requested and metadata is known
    /// 2. Send the GET (redirects followed by the client, bounded)
    /// 3. `304` → `not_modified: true`, no body
    /// 4. Non-2xx → status and headers only
    /// 5. 2xx → stream the body, aborting once the byte ceiling is exceeded
    /// 6. Remember fresh validators from the 2xx response
    ///
    /// The whole flow runs under the request timeout; on expiry the in-flight
    /// request is dropped, which cancels it.
    pub async fn fetch(
        &self,
        url: &Url,
        options: FetchOptions,
    ) -> Result<FetchResponse, TransportError> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let limit = options.max_bytes.unwrap_or(self.max_bytes);

        match tokio::time::timeout(self.timeout, self.fetch_inner(url, options.conditional, limit))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                self.counters.network_errors.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::Timeout {
                    url: url.to_string(),
                    after: self.timeout,
                })
            }
        }
    }

    async fn fetch_inner(
        &self,
        url: &Url,
        conditional: bool,
        limit: usize,
    ) -> Result<FetchResponse, TransportError> {
        let mut request = self.client.get(url.clone());

        if conditional {
            if let Some(metadata) = self.metadata_for(url) {
                if let Some(etag) = &metadata.etag {
                    request = request.header(IF_NONE_MATCH, etag.as_str());
                }
                if let Some(last_modified) = &metadata.last_modified {
                    request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
                }
            }
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| self.network_error(url, e))?;
        self.counters.responses.fetch_add(1, Ordering::Relaxed);

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();

        if status == StatusCode::NOT_MODIFIED {
            self.counters.not_modified.fetch_add(1, Ordering::Relaxed);
            return Ok(FetchResponse {
                url: final_url,
                status: status.as_u16(),
                headers,
                not_modified: true,
                body: Vec::new(),
            });
        }

        if !status.is_success() {
            return Ok(FetchResponse {
                url: final_url,
                status: status.as_u16(),
                headers,
                not_modified: false,
                body: Vec::new(),
            });
        }

        if let Some(declared) = response.content_length() {
            if declared > limit as u64 {
                return Err(self.too_large(url, limit));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.network_error(url, e))?
        {
            if body.len() + chunk.len() > limit {
                // Dropping the response here cancels the rest of the stream
                return Err(self.too_large(url, limit));
            }
            body.extend_from_slice(&chunk);
        }

        self.remember(url, ResourceMetadata::from_headers(&headers));

        Ok(FetchResponse {
            url: final_url,
            status: status.as_u16(),
            headers,
            not_modified: false,
            body,
        })
    }

    fn network_error(&self, url: &Url, source: reqwest::Error) -> TransportError {
        self.counters.network_errors.fetch_add(1, Ordering::Relaxed);
        TransportError::from_reqwest(url, source, self.timeout)
    }

    fn too_large(&self, url: &Url, limit: usize) -> TransportError {
        self.counters.oversized.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Response from {} exceeded {} bytes", url, limit);
        TransportError::ResponseTooLarge {
            url: url.to_string(),
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_with(max_bytes: usize, timeout_secs: u64) -> HttpTransport {
        let config = TransportConfig {
            max_bytes,
            timeout_secs,
            ..TransportConfig::default()
        };
        HttpTransport::new(&config).unwrap()
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn test_build_transport() {
        let transport = HttpTransport::new(&TransportConfig::default());
        assert!(transport.is_ok());
    }

    #[test]
    fn test_error_codes() {
        let err = TransportError::ResponseTooLarge {
            url: "https://example.com/".to_string(),
            limit: 10,
        };
        assert_eq!(err.code(), "response_too_large");
        assert!(err.to_string().starts_with("response_too_large"));

        let err = TransportError::Timeout {
            url: "https://example.com/".to_string(),
            after: Duration::from_secs(1),
        };
        assert_eq!(err.code(), "timeout");
    }

    #[tokio::test]
    async fn test_success_remembers_validators() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("hello", "text/plain")
                    .insert_header("etag", "\"v1\"")
                    .insert_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
            )
            .mount(&server)
            .await;

        let transport = transport_with(1024, 5);
        let target = url(&server, "/page");
        let response = transport.fetch(&target, FetchOptions::default()).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(!response.not_modified);
        assert_eq!(response.body, b"hello");
        assert_eq!(response.content_type().as_deref(), Some("text/plain"));

        let remembered = transport.metadata_for(&target).unwrap();
        assert_eq!(remembered.etag.as_deref(), Some("\"v1\""));
        assert_eq!(
            remembered.last_modified.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
    }

    #[tokio::test]
    async fn test_redirected_html_reports_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/docs/"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docs/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"<a href="intro">intro</a>"#, "text/html"),
            )
            .mount(&server)
            .await;

        let transport = transport_with(1024, 5);
        let response = transport
            .fetch(&url(&server, "/docs"), FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.url, url(&server, "/docs/"));
        assert_eq!(response.content_type().as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_conditional_fetch_returns_not_modified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cached"))
            .and(header("if-none-match", "\"abc\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_with(1024, 5);
        let target = url(&server, "/cached");
        transport.remember(
            &target,
            ResourceMetadata {
                etag: Some("\"abc\"".to_string()),
                last_modified: None,
            },
        );

        let response = transport
            .fetch(&target, FetchOptions::conditional())
            .await
            .unwrap();

        assert!(response.not_modified);
        assert!(response.body.is_empty());
        assert_eq!(transport.stats().not_modified, 1);
    }

    #[tokio::test]
    async fn test_unconditional_fetch_skips_validators() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cached"))
            .and(header("if-none-match", "\"abc\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cached"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
            .mount(&server)
            .await;

        let transport = transport_with(1024, 5);
        let target = url(&server, "/cached");
        transport.remember(
            &target,
            ResourceMetadata {
                etag: Some("\"abc\"".to_string()),
                last_modified: None,
            },
        );

        let response = transport.fetch(&target, FetchOptions::default()).await.unwrap();
        assert!(!response.not_modified);
        assert_eq!(response.body, b"fresh");
    }

    #[tokio::test]
    async fn test_oversized_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 4096]))
            .mount(&server)
            .await;

        let transport = transport_with(1024, 5);
        let result = transport.fetch(&url(&server, "/big"), FetchOptions::default()).await;

        let err = result.unwrap_err();
        assert_eq!(err.code(), "response_too_large");
        assert_eq!(transport.stats().oversized, 1);
    }

    #[tokio::test]
    async fn test_per_request_byte_override() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/medium"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 512]))
            .mount(&server)
            .await;

        let transport = transport_with(1024, 5);
        let options = FetchOptions {
            conditional: false,
            max_bytes: Some(100),
        };
        let result = transport.fetch(&url(&server, "/medium"), options).await;
        assert!(matches!(
            result,
            Err(TransportError::ResponseTooLarge { limit: 100, .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let transport = transport_with(1024, 1);
        let result = transport.fetch(&url(&server, "/slow"), FetchOptions::default()).await;

        assert_eq!(result.unwrap_err().code(), "timeout");
    }

    #[tokio::test]
    async fn test_error_status_has_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
            .mount(&server)
            .await;

        let transport = transport_with(1024, 5);
        let target = url(&server, "/missing");
        let response = transport.fetch(&target, FetchOptions::default()).await.unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert!(response.body.is_empty());
        assert!(transport.metadata_for(&target).is_none());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let transport = transport_with(1024, 5);
        let target = Url::parse("http://127.0.0.1:9/").unwrap();
        let result = transport.fetch(&target, FetchOptions::default()).await;

        assert_eq!(result.unwrap_err().code(), "network");
        assert_eq!(transport.stats().network_errors, 1);
    }
}
