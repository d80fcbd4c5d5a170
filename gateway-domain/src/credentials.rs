//! Venue Credentials Domain Types
//!
//! # Security Model
//!
//! - Credentials live in memory only; they are never serialized
//! - Secret and passphrase are zeroized when dropped
//! - `Debug` output redacts everything but the public API key
//! - Each gateway client owns exactly one set of credentials

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, Zeroizing};

use crate::value_objects::DomainError;

// =============================================================================
// Venue
// =============================================================================

/// Supported venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    /// Binance spot + capital API
    Binance,
    /// Commex (Binance-compatible dialect)
    Commex,
    /// Bybit v5 unified API
    Bybit,
    /// OKX v5 API
    Okx,
    /// KuCoin spot API
    Kucoin,
    /// Gate.io v4 API
    GateIo,
}

impl Venue {
    /// All venues, in a stable order.
    pub const ALL: [Venue; 6] = [
        Venue::Binance,
        Venue::Commex,
        Venue::Bybit,
        Venue::Okx,
        Venue::Kucoin,
        Venue::GateIo,
    ];

    /// Get the venue name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Commex => "commex",
            Venue::Bybit => "bybit",
            Venue::Okx => "okx",
            Venue::Kucoin => "kucoin",
            Venue::GateIo => "gateio",
        }
    }

    /// Get the production base URL for REST calls.
    pub fn base_url(&self) -> &'static str {
        match self {
            Venue::Binance => "https://api.binance.com",
            Venue::Commex => "https://api.commex.com",
            Venue::Bybit => "https://api.bybit.com",
            Venue::Okx => "https://www.okx.com",
            Venue::Kucoin => "https://api.kucoin.com",
            Venue::GateIo => "https://api.gateio.ws",
        }
    }

    /// Whether the venue's signing protocol needs a passphrase.
    pub fn requires_passphrase(&self) -> bool {
        matches!(self, Venue::Okx | Venue::Kucoin)
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binance" => Ok(Venue::Binance),
            "commex" => Ok(Venue::Commex),
            "bybit" => Ok(Venue::Bybit),
            "okx" => Ok(Venue::Okx),
            "kucoin" => Ok(Venue::Kucoin),
            "gateio" | "gate" | "gate.io" => Ok(Venue::GateIo),
            other => Err(DomainError::UnknownVenue(other.to_string())),
        }
    }
}

// =============================================================================
// API Credentials
// =============================================================================

/// Decrypted API credentials (in-memory only, never persisted).
///
/// This struct contains the plaintext credentials and should:
/// - Never be logged
/// - Never be serialized to disk
/// - Be zeroized when dropped
pub struct ApiCredentials {
    /// API Key (public identifier)
    pub api_key: String,
    /// API Secret (secret key)
    pub api_secret: Zeroizing<String>,
    /// Passphrase chosen when the key was created (OKX, KuCoin)
    pub passphrase: Option<Zeroizing<String>>,
}

impl ApiCredentials {
    /// Create new API credentials without a passphrase.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: Zeroizing::new(api_secret.into()),
            passphrase: None,
        }
    }

    /// Attach a passphrase.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    /// Passphrase as a plain `&str`, if one was configured and is non-empty.
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase
            .as_deref()
            .map(|p| p.as_str())
            .filter(|p| !p.is_empty())
    }

    /// Name of the first required field that is missing for `venue`.
    ///
    /// Returns `None` when the credentials are complete.
    pub fn missing_field(&self, venue: Venue) -> Option<&'static str> {
        if self.api_key.is_empty() {
            return Some("api_key");
        }
        if self.api_secret.is_empty() {
            return Some("api_secret");
        }
        if venue.requires_passphrase() && self.passphrase().is_none() {
            return Some("passphrase");
        }
        None
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Zeroize for ApiCredentials {
    fn zeroize(&mut self) {
        self.api_key.zeroize();
        self.api_secret.zeroize();
        if let Some(passphrase) = self.passphrase.as_mut() {
            passphrase.zeroize();
        }
    }
}

impl Drop for ApiCredentials {
    fn drop(&mut self) {
        self.zeroize();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_round_trip_names() {
        for venue in Venue::ALL {
            assert_eq!(venue.as_str().parse::<Venue>().unwrap(), venue);
        }
        assert_eq!("Gate.io".parse::<Venue>().unwrap(), Venue::GateIo);
        assert!("kraken".parse::<Venue>().is_err());
    }

    #[test]
    fn test_venue_base_url() {
        assert_eq!(Venue::Binance.base_url(), "https://api.binance.com");
        assert_eq!(Venue::GateIo.base_url(), "https://api.gateio.ws");
    }

    #[test]
    fn test_missing_passphrase_detected_for_okx_and_kucoin() {
        let creds = ApiCredentials::new("key", "secret");
        assert_eq!(creds.missing_field(Venue::Okx), Some("passphrase"));
        assert_eq!(creds.missing_field(Venue::Kucoin), Some("passphrase"));
        assert_eq!(creds.missing_field(Venue::Binance), None);

        let creds = ApiCredentials::new("key", "secret").with_passphrase("");
        assert_eq!(creds.missing_field(Venue::Okx), Some("passphrase"));
    }

    #[test]
    fn test_missing_key_or_secret() {
        assert_eq!(ApiCredentials::new("", "s").missing_field(Venue::Bybit), Some("api_key"));
        assert_eq!(ApiCredentials::new("k", "").missing_field(Venue::Bybit), Some("api_secret"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = ApiCredentials::new("public_key", "very_secret").with_passphrase("pass123");
        let debug = format!("{:?}", creds);

        assert!(debug.contains("public_key"));
        assert!(!debug.contains("very_secret"));
        assert!(!debug.contains("pass123"));
    }

    #[test]
    fn test_api_credentials_zeroize() {
        let mut creds = ApiCredentials::new("test_key", "test_secret").with_passphrase("pw");

        assert_eq!(*creds.api_secret, "test_secret");

        creds.zeroize();

        assert!(creds.api_key.is_empty());
        assert!(creds.api_secret.is_empty());
        assert_eq!(creds.passphrase(), None);
    }
}
