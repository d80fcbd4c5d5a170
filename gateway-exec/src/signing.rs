//! Capability traits injected into the request pipeline, plus the hashing
//! primitives venue signers are built from.
//!
//! Each venue supplies:
//! - a [`RequestSigner`] computing its authentication headers/params
//! - a [`ResponseUnwrapper`] extracting the payload from its envelope
//! - an [`ErrorTable`] classifying its error codes
//!
//! Secrets are never logged or included in error messages.

use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};

use gateway_domain::{ApiCredentials, Venue};

use crate::error::{GatewayError, GatewayResult, VenueErrorKind};
use crate::request::RequestDescriptor;

/// Receive window injected when the caller does not set one.
pub const DEFAULT_RECV_WINDOW_MS: u64 = 5000;

// =============================================================================
// Capability Traits
// =============================================================================

/// Per-venue authentication protocol.
///
/// Pure given `timestamp_ms`; signing the same descriptor twice with the same
/// timestamp yields the same result.
pub trait RequestSigner: Send + Sync {
    /// Return `request` with the venue's authentication applied.
    fn sign(
        &self,
        request: RequestDescriptor,
        credentials: &ApiCredentials,
        timestamp_ms: i64,
    ) -> GatewayResult<RequestDescriptor>;
}

/// Per-venue success/error envelope.
pub trait ResponseUnwrapper: Send + Sync {
    /// Extract the payload from `body`, or raise the venue's embedded error.
    ///
    /// Called for every response with a body, including non-2xx ones; the
    /// pipeline keeps venue/account errors and turns anything else on a
    /// non-2xx into `RequestFailed`.
    fn unwrap_payload(&self, endpoint: &str, status: u16, body: &str) -> GatewayResult<Value>;
}

// =============================================================================
// Error Tables
// =============================================================================

/// Static code → kind table for one venue.
///
/// Codes missing from the table are [`VenueErrorKind::Rejected`].
#[derive(Debug, Clone, Copy)]
pub struct ErrorTable {
    venue: Venue,
    entries: &'static [(&'static str, VenueErrorKind)],
}

impl ErrorTable {
    /// Build a table.
    pub const fn new(venue: Venue, entries: &'static [(&'static str, VenueErrorKind)]) -> Self {
        Self { venue, entries }
    }

    /// Venue this table belongs to.
    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Classify a code.
    pub fn kind(&self, code: &str) -> VenueErrorKind {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, kind)| *kind)
            .unwrap_or(VenueErrorKind::Rejected)
    }

    /// Canonical error for a venue-reported code.
    pub fn error(
        &self,
        endpoint: &str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> GatewayError {
        let code = code.into();
        let message = message.into();
        match self.kind(&code) {
            VenueErrorKind::AccountRestricted => GatewayError::AccountStatus {
                venue: self.venue,
                code,
                message,
            },
            kind => GatewayError::Venue {
                venue: self.venue,
                endpoint: endpoint.to_string(),
                code,
                message,
                kind,
            },
        }
    }
}

/// Parse a body as JSON, mapping failure to `Deserialization`.
pub fn parse_json(endpoint: &str, body: &str) -> GatewayResult<Value> {
    serde_json::from_str(body).map_err(|e| GatewayError::Deserialization {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
        raw_body: body.to_string(),
    })
}

/// Render a JSON scalar code (`0`, `"200000"`) as text.
pub fn code_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Hash Primitives
// =============================================================================

fn hmac_sha256(secret: &str, payload: &str) -> GatewayResult<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Signing(format!("HMAC error: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// HMAC-SHA256, lower-case hex.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> GatewayResult<String> {
    hmac_sha256(secret, payload).map(hex::encode)
}

/// HMAC-SHA256, standard base64.
pub fn hmac_sha256_base64(secret: &str, payload: &str) -> GatewayResult<String> {
    hmac_sha256(secret, payload).map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// HMAC-SHA512, lower-case hex.
pub fn hmac_sha512_hex(secret: &str, payload: &str) -> GatewayResult<String> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Signing(format!("HMAC error: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Plain SHA-512, lower-case hex.
pub fn sha512_hex(payload: &str) -> String {
    hex::encode(Sha512::digest(payload.as_bytes()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    static TABLE: ErrorTable = ErrorTable::new(
        Venue::Binance,
        &[
            ("-2015", VenueErrorKind::Authentication),
            ("-1013", VenueErrorKind::Filter),
            ("LOCKED", VenueErrorKind::AccountRestricted),
        ],
    );

    #[test]
    fn test_error_table_lookup() {
        assert_eq!(TABLE.kind("-2015"), VenueErrorKind::Authentication);
        assert_eq!(TABLE.kind("-1013"), VenueErrorKind::Filter);
        assert_eq!(TABLE.kind("-9999"), VenueErrorKind::Rejected);
    }

    #[test]
    fn test_error_table_builds_account_status() {
        let err = TABLE.error("GET /x", "LOCKED", "frozen");
        assert!(matches!(err, GatewayError::AccountStatus { venue: Venue::Binance, .. }));

        let err = TABLE.error("GET /x", "-1013", "Filter failure: LOT_SIZE");
        assert!(matches!(
            err,
            GatewayError::Venue { kind: VenueErrorKind::Filter, ref code, .. } if code == "-1013"
        ));
    }

    #[test]
    fn test_hmac_sha256_known_vector() {
        // Binance API documentation example
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";

        assert_eq!(
            hmac_sha256_hex(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_sha512_of_empty_body() {
        assert_eq!(
            sha512_hex(""),
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        );
    }

    #[test]
    fn test_base64_output_shape() {
        let sig = hmac_sha256_base64("secret", "payload").unwrap();
        // 32 bytes -> 44 base64 chars with padding
        assert_eq!(sig.len(), 44);
        assert!(sig.ends_with('='));
    }

    #[test]
    fn test_parse_json_maps_errors() {
        assert!(parse_json("GET /x", r#"{"a":1}"#).is_ok());
        assert!(matches!(
            parse_json("GET /x", "<html>"),
            Err(GatewayError::Deserialization { .. })
        ));
    }

    #[test]
    fn test_code_text() {
        assert_eq!(code_text(&serde_json::json!(-1121)), "-1121");
        assert_eq!(code_text(&serde_json::json!("200000")), "200000");
    }
}
