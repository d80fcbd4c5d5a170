//! Canonical gateway error types.
//!
//! Every venue-specific failure shape normalizes into [`GatewayError`].

use gateway_domain::{DomainError, Venue};
use thiserror::Error;

/// Classification of a venue-reported error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueErrorKind {
    /// Bad key, bad signature, missing permission. Never retried.
    Authentication,
    /// Request timestamp outside the venue's receive window
    Timestamp,
    /// Quantity/price violates a lot-size or precision filter
    Filter,
    /// Account frozen, restricted, or otherwise abnormal
    AccountRestricted,
    /// Any other well-formed rejection
    Rejected,
}

/// Errors that can occur during gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No response from the venue (DNS, TLS, timeout, reset)
    #[error("Connection error on {endpoint}: {message}")]
    Connection {
        /// Method and path of the call
        endpoint: String,
        /// Transport error description
        message: String,
    },

    /// Venue reports the account as restricted or abnormal
    #[error("Account status error on {venue}: {code} - {message}")]
    AccountStatus {
        /// Venue that reported it
        venue: Venue,
        /// Venue code or status string
        code: String,
        /// Venue message
        message: String,
    },

    /// Non-success HTTP status without a recognizable error envelope
    #[error("Request to {endpoint} failed with HTTP {status_code}: {raw_body}")]
    RequestFailed {
        /// Method and path of the call
        endpoint: String,
        /// HTTP status
        status_code: u16,
        /// Body as received
        raw_body: String,
    },

    /// Well-formed venue error envelope
    #[error("{venue} error on {endpoint}: {code} - {message}")]
    Venue {
        /// Venue that reported it
        venue: Venue,
        /// Method and path of the call
        endpoint: String,
        /// Venue error code, as text
        code: String,
        /// Venue message
        message: String,
        /// Classification from the venue's error table
        kind: VenueErrorKind,
    },

    /// Payload did not match the expected shape
    #[error("Failed to deserialize response from {endpoint}: {message}")]
    Deserialization {
        /// Method and path of the call
        endpoint: String,
        /// serde error
        message: String,
        /// Body as received
        raw_body: String,
    },

    /// Settlement reached a terminal negative status
    #[error("Settlement {id} failed: {reason}")]
    SettlementFailed {
        /// Withdrawal id or deposit tx hash
        id: String,
        /// Venue status / reason
        reason: String,
    },

    /// Settlement did not resolve within the attempt budget
    #[error("Settlement {id} timed out after {attempts} polls")]
    SettlementTimeout {
        /// Withdrawal id or deposit tx hash
        id: String,
        /// Number of history polls performed
        attempts: u32,
    },

    /// Caller cancelled the wait
    #[error("Settlement {id} cancelled")]
    Cancelled {
        /// Withdrawal id or deposit tx hash
        id: String,
    },

    /// Credentials are incomplete for the venue's signing protocol
    #[error("Missing credential field `{field}` for {venue}")]
    MissingCredential {
        /// Venue being configured
        venue: Venue,
        /// Name of the missing field
        field: &'static str,
    },

    /// Signature could not be computed
    #[error("Signing error: {0}")]
    Signing(String),

    /// Request body could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Venue has no implementation of the operation
    #[error("{operation} is not supported on {venue}")]
    Unsupported {
        /// Venue asked
        venue: Venue,
        /// Operation name
        operation: &'static str,
    },

    /// Domain error (invalid amount, step size, symbol)
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl GatewayError {
    /// Create an unsupported-operation error.
    pub fn unsupported(venue: Venue, operation: &'static str) -> Self {
        Self::Unsupported { venue, operation }
    }

    /// Whether the failure is plausibly temporary (network blip, 5xx, 429).
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Connection { .. } => true,
            GatewayError::RequestFailed { status_code, .. } => {
                *status_code >= 500 || *status_code == 429
            },
            _ => false,
        }
    }

    /// Venue error classification, if this is a venue error.
    pub fn venue_kind(&self) -> Option<VenueErrorKind> {
        match self {
            GatewayError::Venue { kind, .. } => Some(*kind),
            GatewayError::AccountStatus { .. } => Some(VenueErrorKind::AccountRestricted),
            _ => None,
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let conn = GatewayError::Connection {
            endpoint: "GET /x".into(),
            message: "reset".into(),
        };
        assert!(conn.is_transient());

        let bad_gateway = GatewayError::RequestFailed {
            endpoint: "GET /x".into(),
            status_code: 502,
            raw_body: String::new(),
        };
        assert!(bad_gateway.is_transient());

        let not_found = GatewayError::RequestFailed {
            endpoint: "GET /x".into(),
            status_code: 404,
            raw_body: String::new(),
        };
        assert!(!not_found.is_transient());

        let auth = GatewayError::Venue {
            venue: Venue::Binance,
            endpoint: "GET /x".into(),
            code: "-2015".into(),
            message: "Invalid API-key".into(),
            kind: VenueErrorKind::Authentication,
        };
        assert!(!auth.is_transient());
        assert_eq!(auth.venue_kind(), Some(VenueErrorKind::Authentication));
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = GatewayError::RequestFailed {
            endpoint: "POST /api/v1/withdrawals".into(),
            status_code: 503,
            raw_body: "<html>down</html>".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/api/v1/withdrawals"));
        assert!(msg.contains("503"));
        assert!(msg.contains("down"));
    }
}
