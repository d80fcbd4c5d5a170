//! Execution layer port definitions.
//!
//! Ports define the interfaces for the two external collaborators of the
//! pipeline: the HTTP transport and the clock. Adapters implement these
//! ports (`ReqwestTransport` in the connectors crate, stubs for tests).

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Transport Port
// =============================================================================

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Upper-case method name, as it appears in signed strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully-built request, ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method
    pub method: HttpMethod,
    /// Absolute URL including query string
    pub url: String,
    /// Headers, in insertion order
    pub headers: Vec<(String, String)>,
    /// Raw body
    pub body: Option<String>,
}

impl HttpRequest {
    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response: status and body, untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Body as text
    pub body: String,
}

impl HttpResponse {
    /// 200 response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure (no HTTP response available).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Connection or protocol failure
    #[error("HTTP request failed: {0}")]
    Request(String),
}

/// Port for sending HTTP requests.
///
/// Implementations:
/// - `ReqwestTransport` - real HTTPS client
/// - `StubTransport` - scripted responses for tests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the raw status and body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

// =============================================================================
// Clock Port
// =============================================================================

/// Port for wall-clock time and delays.
///
/// Implementations:
/// - `SystemClock` - chrono + tokio timers
/// - `ManualClock` - deterministic, sleeps return immediately
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current Unix time in milliseconds.
    fn now_millis(&self) -> i64;

    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::Post.to_string(), "POST");
        assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "https://x/y".into(),
            headers: vec![("X-MBX-APIKEY".into(), "k".into())],
            body: None,
        };
        assert_eq!(req.header("x-mbx-apikey"), Some("k"));
        assert_eq!(req.header("missing"), None);
    }

    #[tokio::test]
    async fn test_system_clock_is_unix_millis() {
        let now = SystemClock.now_millis();
        // After 2020-01-01
        assert!(now > 1_577_836_800_000);
    }
}
