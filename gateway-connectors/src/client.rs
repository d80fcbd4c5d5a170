//! Venue-agnostic gateway client.
//!
//! [`GatewayClient`] composes one venue's adapter with the shared request
//! pipeline, settlement poller and event bus. Derived operations
//! (withdraw-and-wait, deposit approval, market orders with lot-size retry)
//! are written once here against the [`VenueAdapter`] capabilities.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gateway_domain::{
    ApiCredentials, Balance, DepositAddress, DepositRecord, DomainError, OrderAck, OrderSide,
    SettlementDirection, StepSize, Symbol, Venue, WithdrawalRecord, WithdrawalRequest,
};
use gateway_exec::{
    Clock, EventBus, EventReceiver, GatewayError, GatewayEvent, GatewayResult, PollPolicy,
    RequestPipeline, SettlementPoller, SystemClock, Transport, VenueErrorKind,
};

use crate::adapter::VenueAdapter;
use crate::binance::BinanceAdapter;
use crate::bybit::BybitAdapter;
use crate::config::{GatewayConfig, PollingConfig, VenueSettings};
use crate::gateio::GateIoAdapter;
use crate::kucoin::{KucoinAdapter, KucoinKeyVersion};
use crate::okx::OkxAdapter;
use crate::transport::ReqwestTransport;

/// Market order submissions before a filter rejection is surfaced.
pub const MAX_ORDER_ATTEMPTS: u32 = 3;

/// Adapter for `venue`.
pub fn adapter_for(venue: Venue, kucoin_key_version: KucoinKeyVersion) -> Arc<dyn VenueAdapter> {
    match venue {
        Venue::Binance => Arc::new(BinanceAdapter::binance()),
        Venue::Commex => Arc::new(BinanceAdapter::commex()),
        Venue::Bybit => Arc::new(BybitAdapter),
        Venue::Okx => Arc::new(OkxAdapter),
        Venue::Kucoin => Arc::new(KucoinAdapter::new(kucoin_key_version)),
        Venue::GateIo => Arc::new(GateIoAdapter),
    }
}

// =============================================================================
// Gateway Client
// =============================================================================

/// One venue, one set of credentials.
pub struct GatewayClient {
    adapter: Arc<dyn VenueAdapter>,
    pipeline: RequestPipeline,
    poller: SettlementPoller,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    withdraw_policy: PollPolicy,
    deposit_policy: PollPolicy,
}

impl GatewayClient {
    /// Create a client over an explicit transport and clock.
    pub fn new(settings: VenueSettings, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let VenueSettings {
            venue,
            credentials,
            base_url,
            kucoin_key_version,
        } = settings;

        Self::with_adapter(
            adapter_for(venue, kucoin_key_version),
            base_url,
            credentials,
            transport,
            clock,
        )
    }

    /// Create a client around a custom adapter.
    pub fn with_adapter(
        adapter: Arc<dyn VenueAdapter>,
        base_url: impl Into<String>,
        credentials: ApiCredentials,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let venue = adapter.venue();
        let events = Arc::new(EventBus::default());

        Self {
            pipeline: RequestPipeline::new(
                venue,
                base_url,
                Arc::new(credentials),
                transport,
                Arc::clone(&clock),
            ),
            poller: SettlementPoller::new(venue, Arc::clone(&clock), Arc::clone(&events)),
            adapter,
            events,
            clock,
            withdraw_policy: PollPolicy::withdrawal(),
            deposit_policy: PollPolicy::deposit(),
        }
    }

    /// Production client: `reqwest` transport, system clock, configured polling.
    pub fn from_config(settings: VenueSettings, config: &GatewayConfig) -> Self {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout));
        Self::new(settings, transport, Arc::new(SystemClock)).with_polling(&config.polling)
    }

    /// Publish events on a shared bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.poller = SettlementPoller::new(self.venue(), Arc::clone(&self.clock), Arc::clone(&events));
        self.events = events;
        self
    }

    /// Apply polling intervals and attempt budget.
    pub fn with_polling(mut self, polling: &PollingConfig) -> Self {
        self.withdraw_policy = polling.withdrawal_policy();
        self.deposit_policy = polling.deposit_policy();
        self
    }

    /// Override the withdrawal poll policy.
    pub fn with_withdraw_policy(mut self, policy: PollPolicy) -> Self {
        self.withdraw_policy = policy;
        self
    }

    /// Override the deposit poll policy.
    pub fn with_deposit_policy(mut self, policy: PollPolicy) -> Self {
        self.deposit_policy = policy;
        self
    }

    /// Venue served.
    pub fn venue(&self) -> Venue {
        self.adapter.venue()
    }

    /// Event bus this client publishes on.
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Subscribe to this client's events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    // =========================================================================
    // Account
    // =========================================================================

    /// Verify credentials and account state (TryLogin).
    pub async fn check_account(&self) -> GatewayResult<()> {
        self.pipeline.ensure_credentials()?;
        self.adapter.check_account(&self.pipeline).await?;
        info!(venue = %self.venue(), "Account check passed");
        Ok(())
    }

    /// Balance of `currency`.
    pub async fn get_balance(&self, currency: &str) -> GatewayResult<Balance> {
        self.adapter.balance(&self.pipeline, currency).await
    }

    /// Deposit address for `currency` on `network`.
    pub async fn get_deposit_address(&self, currency: &str, network: &str) -> GatewayResult<DepositAddress> {
        self.adapter.deposit_address(&self.pipeline, currency, network).await
    }

    // =========================================================================
    // Withdrawal Terms
    // =========================================================================

    /// Withdrawal amount step for `currency` on `network`.
    pub async fn query_withdrawal_precision(&self, currency: &str, network: &str) -> GatewayResult<StepSize> {
        self.adapter.withdrawal_step(&self.pipeline, currency, network).await
    }

    /// Minimum withdrawal amount.
    pub async fn query_withdrawal_min_amount(&self, currency: &str, network: &str) -> GatewayResult<Decimal> {
        self.adapter.withdrawal_min_amount(&self.pipeline, currency, network).await
    }

    /// Withdrawal fee.
    pub async fn query_withdrawal_fee(&self, currency: &str, network: &str) -> GatewayResult<Decimal> {
        self.adapter.withdrawal_fee(&self.pipeline, currency, network).await
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Withdraw `request.amount` flattened to the venue's withdrawal step.
    ///
    /// With `wait_for_approval`, polls withdrawal history until the
    /// withdrawal succeeds, fails or the attempt budget runs out.
    ///
    /// # Errors
    ///
    /// - `Unsupported` when the venue does not offer withdrawals
    /// - `Domain(InvalidQuantity)` when the amount flattens to zero
    /// - `SettlementFailed`, `SettlementTimeout`, `Cancelled` while waiting
    pub async fn withdraw(
        &self,
        request: &WithdrawalRequest,
        wait_for_approval: bool,
        cancel: &CancellationToken,
    ) -> GatewayResult<WithdrawalRecord> {
        let venue = self.venue();
        if !self.adapter.supports_withdrawal() {
            return Err(GatewayError::unsupported(venue, "withdraw"));
        }
        self.pipeline.ensure_credentials()?;

        let step = self
            .adapter
            .withdrawal_step(&self.pipeline, &request.currency, &request.network)
            .await?;
        let amount = step.flatten(request.amount, 0)?;
        if amount.is_zero() {
            return Err(DomainError::InvalidQuantity(format!(
                "{} flattens to zero with step {}",
                request.amount,
                step.step()
            ))
            .into());
        }

        let id = self.adapter.submit_withdrawal(&self.pipeline, request, amount).await?;

        info!(
            %venue,
            id = %id,
            currency = %request.currency,
            network = %request.network,
            %amount,
            "Withdrawal submitted"
        );
        self.events.send(GatewayEvent::WithdrawalSubmitted {
            venue,
            id: id.clone(),
            currency: request.currency.clone(),
            amount,
            timestamp: self.now(),
        });

        if !wait_for_approval {
            return Ok(WithdrawalRecord {
                id,
                tx_hash: None,
                requested_amount: amount,
                waited_for_approval: false,
            });
        }

        let adapter = &self.adapter;
        let pipeline = &self.pipeline;
        let outcome = self
            .poller
            .await_settlement(
                SettlementDirection::Withdrawal,
                &id,
                &self.withdraw_policy,
                || adapter.withdrawal_history(pipeline, &request.currency, &id),
                |entry| adapter.classify_withdrawal(entry),
                |entry| Some(entry.id.as_str()),
                cancel,
            )
            .await?;

        Ok(WithdrawalRecord {
            id,
            tx_hash: outcome.tx_hash,
            requested_amount: amount,
            waited_for_approval: true,
        })
    }

    /// Wait until the deposit with `tx_hash` is credited.
    ///
    /// # Errors
    ///
    /// - `SettlementFailed` when the venue rejects the deposit
    /// - `SettlementTimeout` when it never shows up as credited
    /// - `Cancelled` when `cancel` fires
    pub async fn approve_receiving(
        &self,
        currency: &str,
        tx_hash: &str,
        cancel: &CancellationToken,
    ) -> GatewayResult<DepositRecord> {
        self.pipeline.ensure_credentials()?;

        let adapter = &self.adapter;
        let pipeline = &self.pipeline;
        let outcome = self
            .poller
            .await_settlement(
                SettlementDirection::Deposit,
                tx_hash,
                &self.deposit_policy,
                || adapter.deposit_history(pipeline, currency),
                |entry| adapter.classify_deposit(entry),
                |entry| entry.tx_hash.as_deref(),
                cancel,
            )
            .await?;

        info!(venue = %self.venue(), currency, tx_hash, attempts = outcome.attempts, "Deposit credited");

        Ok(DepositRecord {
            currency: currency.to_string(),
            tx_hash: tx_hash.to_string(),
            amount: outcome.entry.amount,
        })
    }

    // =========================================================================
    // Trading
    // =========================================================================

    /// Market order for `amount` of the base asset, flattened to the lot step.
    ///
    /// A lot-size (`Filter`) rejection is retried one step smaller, up to
    /// [`MAX_ORDER_ATTEMPTS`] submissions. Other errors surface immediately.
    pub async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
    ) -> GatewayResult<OrderAck> {
        let venue = self.venue();
        let step = self.adapter.lot_step(&self.pipeline, symbol).await?;

        let mut attempt: u32 = 0;
        loop {
            let quantity = step.flatten(amount, attempt)?;
            if quantity.is_zero() {
                return Err(DomainError::InvalidQuantity(format!(
                    "{} flattens to zero with lot step {}",
                    amount,
                    step.step()
                ))
                .into());
            }

            if attempt > 0 {
                info!(%venue, %symbol, attempt = attempt + 1, %quantity, "Retrying market order one step down");
                self.events.send(GatewayEvent::OrderRetried {
                    venue,
                    symbol: symbol.to_string(),
                    attempt: attempt + 1,
                    quantity,
                });
            }

            match self.adapter.market_order(&self.pipeline, symbol, side, quantity).await {
                Ok(ack) => {
                    info!(%venue, %symbol, %side, order_id = %ack.order_id, %quantity, "Market order placed");
                    return Ok(ack);
                },
                Err(err)
                    if err.venue_kind() == Some(VenueErrorKind::Filter)
                        && attempt + 1 < MAX_ORDER_ATTEMPTS =>
                {
                    warn!(%venue, %symbol, %quantity, error = %err, "Market order hit lot-size filter");
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_millis()).unwrap_or_else(Utc::now)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_for_every_venue() {
        for venue in Venue::ALL {
            assert_eq!(adapter_for(venue, KucoinKeyVersion::V2).venue(), venue);
        }
    }

    #[test]
    fn test_only_gateio_lacks_withdrawals() {
        for venue in Venue::ALL {
            let adapter = adapter_for(venue, KucoinKeyVersion::V2);
            assert_eq!(adapter.supports_withdrawal(), venue != Venue::GateIo);
        }
    }
}
