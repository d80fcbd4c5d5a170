//! Request pipeline: sign → send → unwrap → deserialize.
//!
//! The pipeline is venue-agnostic. Venue behaviour arrives through the
//! [`RequestSigner`] and [`ResponseUnwrapper`] passed to each call.
//!
//! # Flow
//!
//! ```text
//! RequestDescriptor → Signer → Transport → Unwrapper → serde → T
//! ```

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use gateway_domain::{ApiCredentials, Venue};

use crate::error::{GatewayError, GatewayResult};
use crate::ports::{Clock, HttpRequest, Transport};
use crate::request::{Auth, RequestBody, RequestDescriptor};
use crate::signing::{RequestSigner, ResponseUnwrapper};

/// Executes single calls against one venue with one set of credentials.
pub struct RequestPipeline {
    venue: Venue,
    base_url: String,
    credentials: Arc<ApiCredentials>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl RequestPipeline {
    /// Create a pipeline.
    pub fn new(
        venue: Venue,
        base_url: impl Into<String>,
        credentials: Arc<ApiCredentials>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            venue,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            transport,
            clock,
        }
    }

    /// Venue served by this pipeline.
    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Clock used for timestamps.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Fail fast when the credentials cannot sign for this venue.
    pub fn ensure_credentials(&self) -> GatewayResult<()> {
        match self.credentials.missing_field(self.venue) {
            Some(field) => Err(GatewayError::MissingCredential { venue: self.venue, field }),
            None => Ok(()),
        }
    }

    /// Execute one call and deserialize the unwrapped payload into `T`.
    ///
    /// # Errors
    ///
    /// - `MissingCredential` / `Signing` before anything is sent
    /// - `Connection` when the transport gives no response
    /// - `RequestFailed` for a non-2xx without a venue error envelope
    /// - `Venue` / `AccountStatus` for an embedded venue error (any status)
    /// - `Deserialization` when the payload does not fit `T`
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestDescriptor,
        signer: &dyn RequestSigner,
        unwrapper: &dyn ResponseUnwrapper,
        auth: Auth,
    ) -> GatewayResult<T> {
        let endpoint = request.endpoint();

        let request = match auth {
            Auth::Signed => {
                self.ensure_credentials()?;
                signer.sign(request, &self.credentials, self.clock.now_millis())?
            },
            Auth::Public => request,
        };

        debug!(venue = %self.venue, %endpoint, "Sending request");

        let response = self.transport.send(self.to_http(request)).await.map_err(|e| {
            warn!(venue = %self.venue, %endpoint, error = %e, "Transport failure");
            GatewayError::Connection {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            }
        })?;

        if !response.is_success() {
            if response.body.trim().is_empty() {
                return Err(GatewayError::RequestFailed {
                    endpoint,
                    status_code: response.status,
                    raw_body: response.body,
                });
            }

            let err = match unwrapper.unwrap_payload(&endpoint, response.status, &response.body) {
                Err(err @ (GatewayError::Venue { .. } | GatewayError::AccountStatus { .. })) => err,
                _ => GatewayError::RequestFailed {
                    endpoint,
                    status_code: response.status,
                    raw_body: response.body,
                },
            };
            warn!(venue = %self.venue, error = %err, "Request rejected");
            return Err(err);
        }

        let payload = unwrapper
            .unwrap_payload(&endpoint, response.status, &response.body)
            .map_err(|err| {
                warn!(venue = %self.venue, error = %err, "Venue reported error");
                err
            })?;

        serde_json::from_value(payload).map_err(|e| GatewayError::Deserialization {
            endpoint,
            message: e.to_string(),
            raw_body: response.body,
        })
    }

    fn to_http(&self, request: RequestDescriptor) -> HttpRequest {
        let url = format!("{}{}", self.base_url, request.request_path());
        let mut headers = request.headers;

        let body = match request.body {
            RequestBody::Empty => None,
            RequestBody::Json(raw) => {
                if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("Content-Type")) {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                Some(raw)
            },
        };

        HttpRequest {
            method: request.method,
            url,
            headers,
            body,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VenueErrorKind;
    use crate::ports::{HttpResponse, TransportError};
    use crate::signing::{code_text, parse_json, ErrorTable};
    use crate::stub::{ManualClock, StubTransport};
    use serde::Deserialize;
    use serde_json::Value;

    /// Signer that stamps the timestamp into a header.
    struct HeaderSigner;

    impl RequestSigner for HeaderSigner {
        fn sign(
            &self,
            mut request: RequestDescriptor,
            credentials: &ApiCredentials,
            timestamp_ms: i64,
        ) -> GatewayResult<RequestDescriptor> {
            request.push_header("X-KEY", credentials.api_key.clone());
            request.push_header("X-TS", timestamp_ms.to_string());
            Ok(request)
        }
    }

    static TABLE: ErrorTable =
        ErrorTable::new(Venue::Bybit, &[("10003", VenueErrorKind::Authentication)]);

    /// `{retCode, retMsg, result}` envelope.
    struct RetCodeUnwrapper;

    impl ResponseUnwrapper for RetCodeUnwrapper {
        fn unwrap_payload(&self, endpoint: &str, _status: u16, body: &str) -> GatewayResult<Value> {
            let mut value = parse_json(endpoint, body)?;
            let code = value.get("retCode").map(code_text).unwrap_or_default();
            if code != "0" {
                let msg = value.get("retMsg").and_then(Value::as_str).unwrap_or_default();
                return Err(TABLE.error(endpoint, code, msg));
            }
            Ok(value.get_mut("result").map(Value::take).unwrap_or(Value::Null))
        }
    }

    #[derive(Debug, Deserialize)]
    struct Payload {
        id: String,
    }

    fn pipeline(transport: Arc<StubTransport>) -> RequestPipeline {
        RequestPipeline::new(
            Venue::Bybit,
            "https://api.test/",
            Arc::new(ApiCredentials::new("key", "secret")),
            transport,
            Arc::new(ManualClock::new(1_700_000_000_000)),
        )
    }

    #[tokio::test]
    async fn test_execute_signed_success() {
        let transport = Arc::new(StubTransport::new());
        transport.respond("/v5/x", HttpResponse::ok(r#"{"retCode":0,"retMsg":"OK","result":{"id":"42"}}"#));

        let payload: Payload = pipeline(transport.clone())
            .execute(
                RequestDescriptor::get("/v5/x").param("a", "1"),
                &HeaderSigner,
                &RetCodeUnwrapper,
                Auth::Signed,
            )
            .await
            .unwrap();

        assert_eq!(payload.id, "42");

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.url, "https://api.test/v5/x?a=1");
        assert_eq!(sent.header("X-KEY"), Some("key"));
        assert_eq!(sent.header("X-TS"), Some("1700000000000"));
    }

    #[tokio::test]
    async fn test_public_call_is_not_signed() {
        let transport = Arc::new(StubTransport::new());
        transport.respond("/v5/x", HttpResponse::ok(r#"{"retCode":0,"retMsg":"OK","result":{"id":"1"}}"#));

        let _: Payload = pipeline(transport.clone())
            .execute(RequestDescriptor::get("/v5/x"), &HeaderSigner, &RetCodeUnwrapper, Auth::Public)
            .await
            .unwrap();

        assert_eq!(transport.last_request().unwrap().header("X-KEY"), None);
    }

    #[tokio::test]
    async fn test_embedded_error_on_http_200_is_venue_error() {
        let transport = Arc::new(StubTransport::new());
        transport.respond("/v5/x", HttpResponse::ok(r#"{"retCode":10003,"retMsg":"API key is invalid.","result":{}}"#));

        let err = pipeline(transport)
            .execute::<Payload>(RequestDescriptor::get("/v5/x"), &HeaderSigner, &RetCodeUnwrapper, Auth::Signed)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Venue { kind: VenueErrorKind::Authentication, ref code, .. } if code == "10003"
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_is_connection_error() {
        let transport = Arc::new(StubTransport::new());
        transport.fail("/v5/x", TransportError::Timeout);

        let err = pipeline(transport)
            .execute::<Payload>(RequestDescriptor::get("/v5/x"), &HeaderSigner, &RetCodeUnwrapper, Auth::Signed)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Connection { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_non_success_with_empty_body_is_request_failed() {
        let transport = Arc::new(StubTransport::new());
        transport.respond("/v5/x", HttpResponse { status: 503, body: String::new() });

        let err = pipeline(transport)
            .execute::<Payload>(RequestDescriptor::get("/v5/x"), &HeaderSigner, &RetCodeUnwrapper, Auth::Signed)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::RequestFailed { status_code: 503, .. }));
    }

    #[tokio::test]
    async fn test_non_success_with_html_body_keeps_raw_body() {
        let transport = Arc::new(StubTransport::new());
        transport.respond("/v5/x", HttpResponse { status: 403, body: "<html>forbidden</html>".into() });

        let err = pipeline(transport)
            .execute::<Payload>(RequestDescriptor::get("/v5/x"), &HeaderSigner, &RetCodeUnwrapper, Auth::Signed)
            .await
            .unwrap_err();

        match err {
            GatewayError::RequestFailed { endpoint, status_code, raw_body } => {
                assert_eq!(endpoint, "GET /v5/x");
                assert_eq!(status_code, 403);
                assert_eq!(raw_body, "<html>forbidden</html>");
            },
            other => panic!("Expected RequestFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_deserialization_error() {
        let transport = Arc::new(StubTransport::new());
        transport.respond("/v5/x", HttpResponse::ok(r#"{"retCode":0,"retMsg":"OK","result":{"other":1}}"#));

        let err = pipeline(transport)
            .execute::<Payload>(RequestDescriptor::get("/v5/x"), &HeaderSigner, &RetCodeUnwrapper, Auth::Signed)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Deserialization { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_passphrase_fails_before_send() {
        let transport = Arc::new(StubTransport::new());
        let pipeline = RequestPipeline::new(
            Venue::Okx,
            "https://api.test",
            Arc::new(ApiCredentials::new("key", "secret")),
            transport.clone(),
            Arc::new(ManualClock::new(0)),
        );

        let err = pipeline
            .execute::<Payload>(RequestDescriptor::get("/v5/x"), &HeaderSigner, &RetCodeUnwrapper, Auth::Signed)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::MissingCredential { venue: Venue::Okx, field: "passphrase" }
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_json_body_gets_content_type() {
        let transport = Arc::new(StubTransport::new());
        transport.respond("/v5/x", HttpResponse::ok(r#"{"retCode":0,"retMsg":"OK","result":{"id":"9"}}"#));

        let _: Payload = pipeline(transport.clone())
            .execute(
                RequestDescriptor::post("/v5/x").raw_json(r#"{"a":1}"#),
                &HeaderSigner,
                &RetCodeUnwrapper,
                Auth::Signed,
            )
            .await
            .unwrap();

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.header("content-type"), Some("application/json"));
        assert_eq!(sent.body.as_deref(), Some(r#"{"a":1}"#));
    }
}
