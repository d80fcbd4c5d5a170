//! Gateway Probe Library
//!
//! Connectivity check for every configured venue: verifies credentials and
//! account state, then reads one balance.
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway_connectors::GatewayConfig;
//! use gateway_probe::run;
//!
//! let reports = run(GatewayConfig::from_env()?).await?;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod probe;

// Re-exports for convenience
pub use error::{ProbeError, ProbeResult};
pub use probe::{probe_venue, run, VenueReport};
