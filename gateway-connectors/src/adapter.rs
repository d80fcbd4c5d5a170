//! Venue adapter capability trait.
//!
//! A [`VenueAdapter`] bundles everything venue-specific that the generic
//! client needs: endpoints, wire shapes, and the status classifiers. Signing
//! and envelope unwrapping live on the adapter's own signer/unwrapper and are
//! applied through the shared [`RequestPipeline`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::error;

use gateway_domain::{
    Balance, DepositAddress, HistoryEntry, OrderAck, OrderSide, SettlementStatus, StepSize,
    Symbol, Venue, WithdrawalRequest, WithdrawalTerms,
};
use gateway_exec::{GatewayError, GatewayResult, RequestPipeline};

// =============================================================================
// Adapter Trait
// =============================================================================

/// Venue-specific operations behind the gateway client.
///
/// Operations a venue does not offer keep the default `Unsupported` body.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue served.
    fn venue(&self) -> Venue;

    /// Balance of one currency.
    async fn balance(&self, pipeline: &RequestPipeline, currency: &str) -> GatewayResult<Balance>;

    /// Verify the credentials and account state.
    ///
    /// Defaults to an authenticated balance call.
    async fn check_account(&self, pipeline: &RequestPipeline) -> GatewayResult<()> {
        self.balance(pipeline, "USDT").await.map(|_| ())
    }

    /// Whether the venue accepts withdrawals through this gateway.
    fn supports_withdrawal(&self) -> bool {
        true
    }

    /// Submit a withdrawal of `amount` (already flattened); returns the venue id.
    async fn submit_withdrawal(
        &self,
        _pipeline: &RequestPipeline,
        _request: &WithdrawalRequest,
        _amount: Decimal,
    ) -> GatewayResult<String> {
        Err(GatewayError::unsupported(self.venue(), "withdraw"))
    }

    /// Recent withdrawal history for `currency`, narrowed to `id` where the
    /// venue supports filtering.
    async fn withdrawal_history(
        &self,
        _pipeline: &RequestPipeline,
        _currency: &str,
        _id: &str,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        Err(GatewayError::unsupported(self.venue(), "withdrawal_history"))
    }

    /// Map a withdrawal history row to a settlement status.
    fn classify_withdrawal(&self, entry: &HistoryEntry) -> SettlementStatus;

    /// Recent deposit history for `currency`.
    async fn deposit_history(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
    ) -> GatewayResult<Vec<HistoryEntry>>;

    /// Map a deposit history row to a settlement status.
    fn classify_deposit(&self, entry: &HistoryEntry) -> SettlementStatus;

    /// Deposit address for `currency` on `network`.
    async fn deposit_address(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<DepositAddress>;

    /// Withdrawal step, minimum and fee for `currency` on `network`.
    async fn withdrawal_terms(
        &self,
        _pipeline: &RequestPipeline,
        _currency: &str,
        _network: &str,
    ) -> GatewayResult<WithdrawalTerms> {
        Err(GatewayError::unsupported(self.venue(), "query_withdrawal_terms"))
    }

    /// Withdrawal amount step.
    async fn withdrawal_step(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<StepSize> {
        self.withdrawal_terms(pipeline, currency, network).await.map(|t| t.step)
    }

    /// Minimum withdrawal amount.
    async fn withdrawal_min_amount(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<Decimal> {
        self.withdrawal_terms(pipeline, currency, network).await.map(|t| t.min_amount)
    }

    /// Withdrawal fee.
    async fn withdrawal_fee(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<Decimal> {
        self.withdrawal_terms(pipeline, currency, network).await.map(|t| t.fee)
    }

    /// Lot step for market orders on `symbol`.
    async fn lot_step(&self, pipeline: &RequestPipeline, symbol: &Symbol) -> GatewayResult<StepSize>;

    /// Place a market order for `quantity` (already flattened).
    async fn market_order(
        &self,
        pipeline: &RequestPipeline,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
    ) -> GatewayResult<OrderAck>;
}

// =============================================================================
// Raw Status Vocabularies
// =============================================================================

/// A venue's raw settlement status vocabulary.
///
/// `settlement` is an exhaustive `match` in every implementation.
pub(crate) trait RawStatus: Sized {
    /// Label used in logs (`"binance withdrawal"`).
    const LABEL: &'static str;

    /// Recognize a raw status value.
    fn parse(raw: &str) -> Option<Self>;

    /// Classify a recognized status for `entry`.
    fn settlement(&self, entry: &HistoryEntry) -> SettlementStatus;
}

/// Classify `entry` with vocabulary `S`; unrecognized values stay pending.
pub(crate) fn classify<S: RawStatus>(venue: Venue, entry: &HistoryEntry) -> SettlementStatus {
    match S::parse(&entry.status) {
        Some(status) => status.settlement(entry),
        None => {
            error!(
                %venue,
                vocabulary = S::LABEL,
                status = %entry.status,
                id = %entry.id,
                "Unrecognized settlement status, treating as pending"
            );
            SettlementStatus::Pending
        },
    }
}

/// Success carrying the entry's transaction hash.
pub(crate) fn success(entry: &HistoryEntry) -> SettlementStatus {
    SettlementStatus::Success {
        tx_hash: entry.tx_hash.clone(),
    }
}

/// Failure naming the raw status.
pub(crate) fn failure(entry: &HistoryEntry, description: &str) -> SettlementStatus {
    SettlementStatus::Failure {
        reason: format!("{} ({})", description, entry.status),
    }
}

// =============================================================================
// Wire Helpers
// =============================================================================

/// Parse a decimal the venue sent as text.
pub(crate) fn parse_decimal(endpoint: &str, field: &str, raw: &str) -> GatewayResult<Decimal> {
    Decimal::from_str(raw.trim()).map_err(|e| GatewayError::Deserialization {
        endpoint: endpoint.to_string(),
        message: format!("field `{}`: {}", field, e),
        raw_body: raw.to_string(),
    })
}

/// Step size from a decimal-place count the venue sent.
pub(crate) fn precision_step(endpoint: &str, field: &str, digits: u32) -> GatewayResult<StepSize> {
    StepSize::try_from_precision(digits).map_err(|e| GatewayError::Deserialization {
        endpoint: endpoint.to_string(),
        message: format!("field `{}`: {}", field, e),
        raw_body: digits.to_string(),
    })
}

/// Parse an optional decimal; empty strings count as absent.
pub(crate) fn parse_decimal_opt(raw: Option<&str>) -> Option<Decimal> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| Decimal::from_str(s).ok())
}

/// Empty strings count as absent.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Error for a lookup that found nothing (unknown coin, network or symbol).
pub(crate) fn not_found(venue: Venue, endpoint: &str, what: String) -> GatewayError {
    GatewayError::Venue {
        venue,
        endpoint: endpoint.to_string(),
        code: "NOT_FOUND".to_string(),
        message: what,
        kind: gateway_exec::VenueErrorKind::Rejected,
    }
}

// =============================================================================
// Tests
// =============================================================================
