//! Production HTTP transport backed by `reqwest`.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::timeout;

use gateway_exec::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};

/// Default request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// `reqwest` transport with a per-request timeout.
///
/// Each gateway client owns its own instance (and connection pool).
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the given request timeout.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout: request_timeout,
        }
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = timeout(self.timeout, builder.send())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let body = timeout(self.timeout, response.text())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        assert_eq!(ReqwestTransport::default().timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let transport = ReqwestTransport::new(Duration::from_secs(2));
        let result = transport
            .send(HttpRequest {
                method: HttpMethod::Get,
                url: "http://127.0.0.1:9/unreachable".to_string(),
                headers: Vec::new(),
                body: None,
            })
            .await;

        assert!(result.is_err());
    }
}
