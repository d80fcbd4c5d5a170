//! Per-venue connectivity probe.

use serde::Serialize;
use tracing::{info, warn};

use gateway_connectors::{GatewayClient, GatewayConfig};
use gateway_domain::{Balance, Venue};

use crate::error::{ProbeError, ProbeResult};

/// Outcome of probing one venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VenueReport {
    /// Venue probed
    pub venue: Venue,
    /// Credentials accepted and account in good standing
    pub account_ok: bool,
    /// Balance of the probe currency, when it could be read
    pub balance: Option<Balance>,
    /// First error encountered
    pub error: Option<String>,
}

impl VenueReport {
    /// Whether every step succeeded.
    pub fn is_healthy(&self) -> bool {
        self.account_ok && self.error.is_none()
    }
}

/// Check the account, then read the balance of `currency`.
pub async fn probe_venue(client: &GatewayClient, currency: &str) -> VenueReport {
    let venue = client.venue();

    if let Err(err) = client.check_account().await {
        warn!(%venue, error = %err, "Account check failed");
        return VenueReport {
            venue,
            account_ok: false,
            balance: None,
            error: Some(err.to_string()),
        };
    }

    match client.get_balance(currency).await {
        Ok(balance) => {
            info!(
                %venue,
                currency = %balance.currency,
                free = %balance.free,
                locked = %balance.locked,
                "Balance read"
            );
            VenueReport {
                venue,
                account_ok: true,
                balance: Some(balance),
                error: None,
            }
        },
        Err(err) => {
            warn!(%venue, currency, error = %err, "Balance query failed");
            VenueReport {
                venue,
                account_ok: true,
                balance: None,
                error: Some(err.to_string()),
            }
        },
    }
}

/// Probe every configured venue, one after another.
///
/// # Errors
///
/// `ProbeError::NoVenues` when no venue has credentials. Venue failures are
/// reported, not returned.
pub async fn run(mut config: GatewayConfig) -> ProbeResult<Vec<VenueReport>> {
    let venues = std::mem::take(&mut config.venues);
    if venues.is_empty() {
        return Err(ProbeError::NoVenues);
    }

    let mut reports = Vec::with_capacity(venues.len());
    for settings in venues {
        info!(venue = %settings.venue, base_url = %settings.base_url, "Probing venue");
        let client = GatewayClient::from_config(settings, &config);
        reports.push(probe_venue(&client, &config.probe_currency).await);
    }

    Ok(reports)
}

// =============================================================================
// Tests
// =============================================================================
