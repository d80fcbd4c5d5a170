//! Stub implementations for testing.
//!
//! These implementations script venue responses and control time without
//! making real API calls or sleeping.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use crate::ports::{Clock, HttpRequest, HttpResponse, Transport, TransportError};

// =============================================================================
// Stub Transport
// =============================================================================

/// Scripted reply for one path.
#[derive(Debug, Clone)]
enum Reply {
    Response(HttpResponse),
    Error(TransportError),
}

/// Stub transport for testing.
///
/// Replies are queued per URL path (query excluded). Each request pops the
/// next reply for its path; the last reply repeats once the queue runs dry.
/// Requests without any scripted reply get a 404 with an empty body.
#[derive(Default)]
pub struct StubTransport {
    replies: RwLock<HashMap<String, VecDeque<Reply>>>,
    requests: RwLock<Vec<HttpRequest>>,
}

impl StubTransport {
    /// Create an empty stub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `path`.
    pub fn respond(&self, path: &str, response: HttpResponse) {
        self.push(path, Reply::Response(response));
    }

    /// Queue a 200 response with `body` for `path`.
    pub fn respond_ok(&self, path: &str, body: impl Into<String>) {
        self.respond(path, HttpResponse::ok(body));
    }

    /// Queue a transport failure for `path`.
    pub fn fail(&self, path: &str, error: TransportError) {
        self.push(path, Reply::Error(error));
    }

    /// Every request sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.read().unwrap().clone()
    }

    /// Requests sent to `path`.
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests
            .read()
            .unwrap()
            .iter()
            .filter(|r| path_of(&r.url) == path)
            .cloned()
            .collect()
    }

    /// Most recent request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.read().unwrap().last().cloned()
    }

    /// Total requests sent.
    pub fn request_count(&self) -> usize {
        self.requests.read().unwrap().len()
    }

    /// Requests sent to `path`.
    pub fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    fn push(&self, path: &str, reply: Reply) {
        self.replies
            .write()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    fn next_reply(&self, path: &str) -> Option<Reply> {
        let mut replies = self.replies.write().unwrap();
        let queue = replies.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

/// Path component of an absolute URL, without query string.
fn path_of(url: &str) -> &str {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let path = without_scheme.find('/').map(|i| &without_scheme[i..]).unwrap_or("/");
    path.split('?').next().unwrap_or(path)
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let path = path_of(&request.url).to_string();
        tracing::debug!(%path, method = %request.method, "Stub: request");
        self.requests.write().unwrap().push(request);

        match self.next_reply(&path) {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Error(error)) => Err(error),
            None => Ok(HttpResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

// =============================================================================
// Manual Clock
// =============================================================================

/// Deterministic clock for testing.
///
/// `sleep` returns immediately, records the duration and advances time.
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
    sleeps: RwLock<Vec<Duration>>,
}

impl ManualClock {
    /// Clock frozen at `now_ms`.
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
            sleeps: RwLock::new(Vec::new()),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        self.now_ms.fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
    }

    /// Every sleep requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.read().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.write().unwrap().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Tests
// =============================================================================
