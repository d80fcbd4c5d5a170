//! Gateway configuration.
//!
//! Loads per-venue credentials and polling settings from environment
//! variables with sensible defaults.
//!
//! # Environment Variables
//!
//! - `GATEWAY_<VENUE>_API_KEY`, `GATEWAY_<VENUE>_API_SECRET`: credentials;
//!   a venue is configured when both are set
//! - `GATEWAY_<VENUE>_PASSPHRASE`: passphrase (OKX, KuCoin)
//! - `GATEWAY_<VENUE>_BASE_URL`: REST base URL override
//! - `GATEWAY_KUCOIN_KEY_VERSION`: KuCoin key version (default: 2)
//! - `GATEWAY_REQUEST_TIMEOUT_SECS`: per-request timeout (default: 10)
//! - `GATEWAY_WITHDRAW_POLL_SECS`: withdrawal poll interval (default: 10)
//! - `GATEWAY_DEPOSIT_POLL_SECS`: deposit poll interval (default: 5)
//! - `GATEWAY_MAX_POLL_ATTEMPTS`: polls before timing out (default: 500)
//! - `GATEWAY_PROBE_CURRENCY`: currency the probe queries (default: USDT)

use std::env;
use std::str::FromStr;
use std::time::Duration;

use gateway_domain::{ApiCredentials, Venue};
use gateway_exec::{GatewayError, GatewayResult, PollPolicy, DEFAULT_MAX_ATTEMPTS};

use crate::kucoin::KucoinKeyVersion;
use crate::transport::REQUEST_TIMEOUT_SECS;

/// Default withdrawal poll interval in seconds.
pub const WITHDRAW_POLL_SECS: u64 = 10;

/// Default deposit poll interval in seconds.
pub const DEPOSIT_POLL_SECS: u64 = 5;

// =============================================================================
// Configuration
// =============================================================================

/// Gateway configuration.
#[derive(Debug)]
pub struct GatewayConfig {
    /// Venues with credentials, in [`Venue::ALL`] order
    pub venues: Vec<VenueSettings>,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Settlement polling
    pub polling: PollingConfig,

    /// Currency queried by the probe
    pub probe_currency: String,
}

/// One venue's connection settings.
#[derive(Debug)]
pub struct VenueSettings {
    /// Venue
    pub venue: Venue,
    /// Credentials (never logged)
    pub credentials: ApiCredentials,
    /// REST base URL
    pub base_url: String,
    /// KuCoin key version; ignored elsewhere
    pub kucoin_key_version: KucoinKeyVersion,
}

impl VenueSettings {
    /// Settings against the venue's production URL.
    pub fn new(venue: Venue, credentials: ApiCredentials) -> Self {
        Self {
            venue,
            credentials,
            base_url: venue.base_url().to_string(),
            kucoin_key_version: KucoinKeyVersion::default(),
        }
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the KuCoin key version.
    pub fn with_key_version(mut self, version: KucoinKeyVersion) -> Self {
        self.kucoin_key_version = version;
        self
    }
}

/// Settlement polling configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    /// Wait between withdrawal history polls
    pub withdraw_interval: Duration,
    /// Wait between deposit history polls
    pub deposit_interval: Duration,
    /// Polls before `SettlementTimeout`
    pub max_attempts: u32,
}

impl PollingConfig {
    /// Policy for withdrawal polling.
    pub fn withdrawal_policy(&self) -> PollPolicy {
        PollPolicy::withdrawal()
            .with_interval(self.withdraw_interval)
            .with_max_attempts(self.max_attempts)
    }

    /// Policy for deposit polling.
    pub fn deposit_policy(&self) -> PollPolicy {
        PollPolicy::deposit()
            .with_interval(self.deposit_interval)
            .with_max_attempts(self.max_attempts)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            withdraw_interval: Duration::from_secs(WITHDRAW_POLL_SECS),
            deposit_interval: Duration::from_secs(DEPOSIT_POLL_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> GatewayResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let venues = Self::load_venues()?;
        let request_timeout =
            Duration::from_secs(Self::load_u64_env("GATEWAY_REQUEST_TIMEOUT_SECS", REQUEST_TIMEOUT_SECS)?);
        let polling = Self::load_polling_config()?;
        let probe_currency = env::var("GATEWAY_PROBE_CURRENCY").unwrap_or_else(|_| "USDT".to_string());

        Ok(Self {
            venues,
            request_timeout,
            polling,
            probe_currency,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            venues: Vec::new(),
            request_timeout: Duration::from_secs(1),
            polling: PollingConfig {
                withdraw_interval: Duration::from_millis(10),
                deposit_interval: Duration::from_millis(10),
                max_attempts: 5,
            },
            probe_currency: "USDT".to_string(),
        }
    }

    /// Settings for `venue`, if configured.
    pub fn venue(&self, venue: Venue) -> Option<&VenueSettings> {
        self.venues.iter().find(|s| s.venue == venue)
    }

    fn load_venues() -> GatewayResult<Vec<VenueSettings>> {
        let mut venues = Vec::new();
        for venue in Venue::ALL {
            if let Some(settings) = Self::load_venue(venue)? {
                venues.push(settings);
            }
        }
        Ok(venues)
    }

    fn load_venue(venue: Venue) -> GatewayResult<Option<VenueSettings>> {
        let prefix = format!("GATEWAY_{}", venue.as_str().to_uppercase());

        let (api_key, api_secret) = match (
            env::var(format!("{}_API_KEY", prefix)),
            env::var(format!("{}_API_SECRET", prefix)),
        ) {
            (Ok(key), Ok(secret)) => (key, secret),
            _ => return Ok(None),
        };

        let mut credentials = ApiCredentials::new(api_key, api_secret);
        if let Ok(passphrase) = env::var(format!("{}_PASSPHRASE", prefix)) {
            credentials = credentials.with_passphrase(passphrase);
        }

        let mut settings = VenueSettings::new(venue, credentials);
        if let Ok(base_url) = env::var(format!("{}_BASE_URL", prefix)) {
            settings = settings.with_base_url(base_url);
        }
        if venue == Venue::Kucoin {
            if let Ok(version) = env::var("GATEWAY_KUCOIN_KEY_VERSION") {
                settings = settings.with_key_version(KucoinKeyVersion::from_str(&version)?);
            }
        }

        Ok(Some(settings))
    }

    fn load_polling_config() -> GatewayResult<PollingConfig> {
        let withdraw_secs = Self::load_u64_env("GATEWAY_WITHDRAW_POLL_SECS", WITHDRAW_POLL_SECS)?;
        let deposit_secs = Self::load_u64_env("GATEWAY_DEPOSIT_POLL_SECS", DEPOSIT_POLL_SECS)?;
        let max_attempts = Self::load_u64_env("GATEWAY_MAX_POLL_ATTEMPTS", DEFAULT_MAX_ATTEMPTS as u64)?;

        let max_attempts = u32::try_from(max_attempts)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                GatewayError::Config(format!("Invalid GATEWAY_MAX_POLL_ATTEMPTS value: {}", max_attempts))
            })?;

        Ok(PollingConfig {
            withdraw_interval: Duration::from_secs(withdraw_secs),
            deposit_interval: Duration::from_secs(deposit_secs),
            max_attempts,
        })
    }

    fn load_u64_env(key: &str, default: u64) -> GatewayResult<u64> {
        match env::var(key) {
            Ok(val) => val
                .trim()
                .parse::<u64>()
                .map_err(|_| GatewayError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            venues: Vec::new(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            polling: PollingConfig::default(),
            probe_currency: "USDT".to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
