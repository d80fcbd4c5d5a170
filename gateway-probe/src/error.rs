//! Probe error types.

use gateway_exec::GatewayError;
use thiserror::Error;

/// Probe-level errors.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Gateway error (configuration, transport, venue)
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// No venue has credentials configured
    #[error("No venues configured: set GATEWAY_<VENUE>_API_KEY and GATEWAY_<VENUE>_API_SECRET")]
    NoVenues,

    /// Report could not be rendered
    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),
}

/// Result type for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;
