//! Gate.io v4 REST dialect.
//!
//! # Authentication
//!
//! Signed requests carry `KEY`, `SIGN` and `Timestamp` (seconds). The
//! signature is hex HMAC-SHA512 over
//!
//! ```text
//! METHOD \n path \n query \n hex(SHA512(body)) \n timestamp_secs
//! ```
//!
//! # Envelope
//!
//! Success bodies are the raw payload. Errors are `{label, message}`, usually
//! with a 4xx status.
//!
//! Withdrawals are not offered through this gateway on Gate.io.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use gateway_domain::{
    to_wire, ApiCredentials, Balance, DepositAddress, HistoryEntry, OrderAck, OrderSide,
    SettlementStatus, StepSize, Symbol, Venue,
};
use gateway_exec::signing::{hmac_sha512_hex, parse_json, sha512_hex};
use gateway_exec::{
    Auth, ErrorTable, GatewayError, GatewayResult, RequestDescriptor, RequestPipeline,
    RequestSigner, ResponseUnwrapper, VenueErrorKind,
};

use crate::adapter::{
    classify, failure, non_empty, not_found, parse_decimal, parse_decimal_opt, precision_step,
    success, RawStatus, VenueAdapter,
};

// =============================================================================
// Constants
// =============================================================================

const SPOT_ACCOUNTS: &str = "/api/v4/spot/accounts";
const DEPOSIT_ADDRESS: &str = "/api/v4/wallet/deposit_address";
const DEPOSITS: &str = "/api/v4/wallet/deposits";
const WITHDRAW_STATUS: &str = "/api/v4/wallet/withdraw_status";
const CURRENCY_PAIRS: &str = "/api/v4/spot/currency_pairs";
const ORDERS: &str = "/api/v4/spot/orders";

static ERRORS: ErrorTable = ErrorTable::new(
    Venue::GateIo,
    &[
        ("INVALID_KEY", VenueErrorKind::Authentication),
        ("INVALID_SIGNATURE", VenueErrorKind::Authentication),
        ("FORBIDDEN", VenueErrorKind::Authentication),
        ("REQUEST_EXPIRED", VenueErrorKind::Timestamp),
        ("ACCOUNT_LOCKED", VenueErrorKind::AccountRestricted),
        ("INVALID_PRECISION", VenueErrorKind::Filter),
    ],
);

// =============================================================================
// Signing
// =============================================================================

/// Hex HMAC-SHA512 signer over a newline-joined prehash.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateIoSigner;

impl RequestSigner for GateIoSigner {
    fn sign(
        &self,
        mut request: RequestDescriptor,
        credentials: &ApiCredentials,
        timestamp_ms: i64,
    ) -> GatewayResult<RequestDescriptor> {
        let timestamp_secs = timestamp_ms / 1000;
        let prehash = format!(
            "{}\n{}\n{}\n{}\n{}",
            request.method,
            request.path,
            request.query_string(),
            sha512_hex(request.body_str()),
            timestamp_secs
        );
        let signature = hmac_sha512_hex(&credentials.api_secret, &prehash)?;

        request.push_header("KEY", credentials.api_key.clone());
        request.push_header("SIGN", signature);
        request.push_header("Timestamp", timestamp_secs.to_string());

        Ok(request)
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Raw payload, or `{label, message}` on error.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateIoUnwrapper;

impl ResponseUnwrapper for GateIoUnwrapper {
    fn unwrap_payload(&self, endpoint: &str, _status: u16, body: &str) -> GatewayResult<Value> {
        let value = parse_json(endpoint, body)?;

        if let Some(label) = value.get("label").and_then(Value::as_str) {
            let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
            return Err(ERRORS.error(endpoint, label, message));
        }

        Ok(value)
    }
}

// =============================================================================
// Status Vocabulary
// =============================================================================

/// Record `status` strings, shared by deposits and withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRecordStatus {
    /// `DONE`
    Done,
    /// `CANCEL`
    Cancel,
    /// `FAIL`
    Fail,
    /// `INVALID`
    Invalid,
    /// `REQUEST`, `MANUAL`, `BCODE`, `EXTPEND`, `VERIFY`, `PROCES`, `PEND`,
    /// `DMOVE`, `REVIEW`
    InProgress,
}

impl RawStatus for GateRecordStatus {
    const LABEL: &'static str = "gateio record";

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "DONE" => Some(Self::Done),
            "CANCEL" => Some(Self::Cancel),
            "FAIL" => Some(Self::Fail),
            "INVALID" => Some(Self::Invalid),
            "REQUEST" | "MANUAL" | "BCODE" | "EXTPEND" | "VERIFY" | "PROCES" | "PEND" | "DMOVE"
            | "REVIEW" => Some(Self::InProgress),
            _ => None,
        }
    }

    fn settlement(&self, entry: &HistoryEntry) -> SettlementStatus {
        match self {
            Self::Done => success(entry),
            Self::Cancel => failure(entry, "cancelled"),
            Self::Fail => failure(entry, "failed"),
            Self::Invalid => failure(entry, "invalid"),
            Self::InProgress => SettlementStatus::Pending,
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Gate.io venue adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateIoAdapter;

impl GateIoAdapter {
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        pipeline: &RequestPipeline,
        request: RequestDescriptor,
        auth: Auth,
    ) -> GatewayResult<T> {
        pipeline.execute(request, &GateIoSigner, &GateIoUnwrapper, auth).await
    }

    async fn withdraw_status(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
    ) -> GatewayResult<WithdrawStatusRow> {
        let rows: Vec<WithdrawStatusRow> = self
            .call(pipeline, RequestDescriptor::get(WITHDRAW_STATUS).param("currency", currency), Auth::Signed)
            .await?;

        let endpoint = format!("GET {}", WITHDRAW_STATUS);
        rows.into_iter()
            .find(|r| r.currency.eq_ignore_ascii_case(currency))
            .ok_or_else(|| not_found(Venue::GateIo, &endpoint, format!("unknown currency {}", currency)))
    }
}

#[async_trait]
impl VenueAdapter for GateIoAdapter {
    fn venue(&self) -> Venue {
        Venue::GateIo
    }

    async fn balance(&self, pipeline: &RequestPipeline, currency: &str) -> GatewayResult<Balance> {
        let rows: Vec<AccountRow> = self
            .call(pipeline, RequestDescriptor::get(SPOT_ACCOUNTS).param("currency", currency), Auth::Signed)
            .await?;

        Ok(rows
            .into_iter()
            .find(|r| r.currency.eq_ignore_ascii_case(currency))
            .map(|r| Balance {
                free: parse_decimal_opt(r.available.as_deref()).unwrap_or_default(),
                locked: parse_decimal_opt(r.locked.as_deref()).unwrap_or_default(),
                currency: r.currency,
            })
            .unwrap_or_else(|| Balance::empty(currency)))
    }

    fn supports_withdrawal(&self) -> bool {
        false
    }

    fn classify_withdrawal(&self, entry: &HistoryEntry) -> SettlementStatus {
        classify::<GateRecordStatus>(Venue::GateIo, entry)
    }

    async fn deposit_history(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        let rows: Vec<DepositRow> = self
            .call(pipeline, RequestDescriptor::get(DEPOSITS).param("currency", currency), Auth::Signed)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| HistoryEntry {
                id: row.id,
                tx_hash: non_empty(row.txid),
                status: row.status,
                amount: parse_decimal_opt(row.amount.as_deref()),
            })
            .collect())
    }

    fn classify_deposit(&self, entry: &HistoryEntry) -> SettlementStatus {
        classify::<GateRecordStatus>(Venue::GateIo, entry)
    }

    async fn deposit_address(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<DepositAddress> {
        let info: DepositAddressInfo = self
            .call(pipeline, RequestDescriptor::get(DEPOSIT_ADDRESS).param("currency", currency), Auth::Signed)
            .await?;

        let endpoint = format!("GET {}", DEPOSIT_ADDRESS);
        let chain = info
            .multichain_addresses
            .into_iter()
            .find(|c| c.chain.eq_ignore_ascii_case(network))
            .ok_or_else(|| not_found(Venue::GateIo, &endpoint, format!("no {} address on {}", currency, network)))?;

        Ok(DepositAddress {
            currency: info.currency,
            network: chain.chain,
            address: chain.address,
            tag: non_empty(chain.payment_id),
        })
    }

    async fn withdrawal_step(
        &self,
        _pipeline: &RequestPipeline,
        _currency: &str,
        _network: &str,
    ) -> GatewayResult<StepSize> {
        Err(GatewayError::unsupported(Venue::GateIo, "query_withdrawal_precision"))
    }

    async fn withdrawal_min_amount(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        _network: &str,
    ) -> GatewayResult<Decimal> {
        let row = self.withdraw_status(pipeline, currency).await?;
        let endpoint = format!("GET {}", WITHDRAW_STATUS);
        parse_decimal(&endpoint, "withdraw_amount_mini", &row.withdraw_amount_mini)
    }

    async fn withdrawal_fee(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<Decimal> {
        let row = self.withdraw_status(pipeline, currency).await?;
        let endpoint = format!("GET {}", WITHDRAW_STATUS);

        // Per-chain fee when listed, flat fee otherwise
        let chain_fee = row
            .withdraw_fix_on_chains
            .iter()
            .find(|(chain, _)| chain.eq_ignore_ascii_case(network))
            .map(|(_, fee)| fee.as_str());

        match chain_fee.or(row.withdraw_fix.as_deref()) {
            Some(raw) => parse_decimal(&endpoint, "withdraw_fix", raw),
            None => Ok(Decimal::ZERO),
        }
    }

    async fn lot_step(&self, pipeline: &RequestPipeline, symbol: &Symbol) -> GatewayResult<StepSize> {
        let path = format!("{}/{}", CURRENCY_PAIRS, symbol.joined("_"));
        let endpoint = format!("GET {}", path);
        let pair: CurrencyPair = self.call(pipeline, RequestDescriptor::get(path), Auth::Public).await?;
        precision_step(&endpoint, "amount_precision", pair.amount_precision)
    }

    async fn market_order(
        &self,
        pipeline: &RequestPipeline,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
    ) -> GatewayResult<OrderAck> {
        // Custom order text: `t-` plus at most 28 characters
        let id = Uuid::now_v7().simple().to_string();
        let text = format!("t-{}", &id[..28]);
        let body = OrderBody {
            text: &text,
            currency_pair: symbol.joined("_"),
            side: match side {
                OrderSide::Buy => "buy",
                OrderSide::Sell => "sell",
            },
            order_type: "market",
            amount: to_wire(quantity),
            time_in_force: "ioc",
        };

        let ack: OrderAckRow = self
            .call(pipeline, RequestDescriptor::post(ORDERS).json(&body)?, Auth::Signed)
            .await?;

        Ok(OrderAck {
            order_id: ack.id,
            quantity,
        })
    }
}

// =============================================================================
// Gate.io Types
// =============================================================================

#[derive(Debug, Serialize)]
struct OrderBody<'a> {
    text: &'a str,
    currency_pair: String,
    side: &'static str,
    #[serde(rename = "type")]
    order_type: &'static str,
    amount: String,
    time_in_force: &'static str,
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    currency: String,
    #[serde(default)]
    available: Option<String>,
    #[serde(default)]
    locked: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepositRow {
    id: String,
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct DepositAddressInfo {
    currency: String,
    #[serde(default)]
    multichain_addresses: Vec<ChainAddress>,
}

#[derive(Debug, Deserialize)]
struct ChainAddress {
    chain: String,
    address: String,
    #[serde(default)]
    payment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WithdrawStatusRow {
    currency: String,
    withdraw_amount_mini: String,
    #[serde(default)]
    withdraw_fix: Option<String>,
    #[serde(default)]
    withdraw_fix_on_chains: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CurrencyPair {
    amount_precision: u32,
}

#[derive(Debug, Deserialize)]
struct OrderAckRow {
    id: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TS: i64 = 1_700_000_000_000;

    fn creds() -> ApiCredentials {
        ApiCredentials::new("gate-key", "gate-secret")
    }

    #[test]
    fn test_get_signature_vector() {
        let request = RequestDescriptor::get(SPOT_ACCOUNTS).param("currency", "USDT");

        let signed = GateIoSigner.sign(request, &creds(), TS).unwrap();

        assert_eq!(
            signed.header("SIGN"),
            Some("ca10413cf84b3c0cee0ad4f12f99bb88c453b9b8eae438a7113b228a03decde564775d9454a3260434d605547524e46ef6d2def1f23e30db179e339087eafc14")
        );
        assert_eq!(signed.header("Timestamp"), Some("1700000000"));
        assert_eq!(signed.header("KEY"), Some("gate-key"));
    }

    #[test]
    fn test_post_signature_vector() {
        let body = r#"{"currency_pair":"BTC_USDT","side":"buy","type":"market","amount":"10","time_in_force":"ioc"}"#;
        let request = RequestDescriptor::post(ORDERS).raw_json(body);

        let signed = GateIoSigner.sign(request, &creds(), TS).unwrap();

        assert_eq!(
            signed.header("SIGN"),
            Some("c25d4cab6af33a5668ecaf67a78cef5aa620aa50ec16189c3da5a6f17c6706679dd2d97ac2fbf270fc3a5b993170a74c2032805edbc2a9c362111552b77aade9")
        );
    }

    #[test]
    fn test_unwrapper_label_envelope() {
        let err = GateIoUnwrapper
            .unwrap_payload("GET /api/v4/spot/accounts", 401, r#"{"label":"INVALID_SIGNATURE","message":"Signature mismatch"}"#)
            .unwrap_err();
        assert_eq!(err.venue_kind(), Some(VenueErrorKind::Authentication));

        let err = GateIoUnwrapper
            .unwrap_payload("POST /api/v4/spot/orders", 200, r#"{"label":"INVALID_PRECISION","message":"Invalid amount precision"}"#)
            .unwrap_err();
        assert_eq!(err.venue_kind(), Some(VenueErrorKind::Filter));
    }

    #[test]
    fn test_unwrapper_raw_payload() {
        let value = GateIoUnwrapper
            .unwrap_payload("GET /api/v4/spot/accounts", 200, r#"[{"currency":"USDT","available":"1","locked":"0"}]"#)
            .unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn test_withdrawal_not_supported() {
        assert!(!GateIoAdapter.supports_withdrawal());
    }

    #[test]
    fn test_record_status_classification() {
        let entry = |s: &str| HistoryEntry {
            id: "d1".into(),
            tx_hash: Some("0xabc".into()),
            status: s.into(),
            amount: None,
        };
        assert_eq!(GateIoAdapter.classify_deposit(&entry("PEND")), SettlementStatus::Pending);
        assert_eq!(GateIoAdapter.classify_deposit(&entry("DMOVE")), SettlementStatus::Pending);
        assert!(matches!(GateIoAdapter.classify_deposit(&entry("DONE")), SettlementStatus::Success { .. }));
        assert!(matches!(GateIoAdapter.classify_withdrawal(&entry("CANCEL")), SettlementStatus::Failure { .. }));
    }
}
