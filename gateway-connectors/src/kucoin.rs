//! KuCoin spot REST dialect.
//!
//! # Authentication
//!
//! Signed requests carry `KC-API-KEY`, `KC-API-SIGN`, `KC-API-TIMESTAMP`,
//! `KC-API-PASSPHRASE` and `KC-API-KEY-VERSION`. The signature is base64
//! HMAC-SHA256 over
//!
//! ```text
//! timestamp_ms + METHOD + path[?query] + body
//! ```
//!
//! Version 2 keys send the passphrase itself HMAC-signed with the secret;
//! version 1 keys send it in the clear.
//!
//! # Envelope
//!
//! `{code, data, msg}` with `code == "200000"` on success.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use gateway_domain::{
    to_wire, ApiCredentials, Balance, DepositAddress, HistoryEntry, OrderAck, OrderSide,
    SettlementStatus, StepSize, Symbol, Venue, WithdrawalRequest, WithdrawalTerms,
};
use gateway_exec::signing::{code_text, hmac_sha256_base64, parse_json};
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

const ACCOUNTS: &str = "/api/v1/accounts";
const WITHDRAWALS: &str = "/api/v1/withdrawals";
const WITHDRAWAL_QUOTAS: &str = "/api/v1/withdrawals/quotas";
const DEPOSITS: &str = "/api/v1/deposits";
const DEPOSIT_ADDRESSES: &str = "/api/v2/deposit-addresses";
const SYMBOLS: &str = "/api/v2/symbols";
const ORDERS: &str = "/api/v1/orders";

const SUCCESS_CODE: &str = "200000";
const HISTORY_PAGE_SIZE: &str = "100";

static ERRORS: ErrorTable = ErrorTable::new(
    Venue::Kucoin,
    &[
        ("400001", VenueErrorKind::Authentication),
        ("400002", VenueErrorKind::Timestamp),
        ("400003", VenueErrorKind::Authentication),
        ("400004", VenueErrorKind::Authentication),
        ("400005", VenueErrorKind::Authentication),
        ("400006", VenueErrorKind::Authentication),
        ("400007", VenueErrorKind::Authentication),
        ("411100", VenueErrorKind::AccountRestricted),
        ("200004", VenueErrorKind::Rejected),
    ],
);

// =============================================================================
// Key Version
// =============================================================================

/// API key version, chosen per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KucoinKeyVersion {
    /// Passphrase sent in the clear
    V1,
    /// Passphrase HMAC-signed with the secret
    #[default]
    V2,
}

impl KucoinKeyVersion {
    /// Header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            KucoinKeyVersion::V1 => "1",
            KucoinKeyVersion::V2 => "2",
        }
    }
}

impl fmt::Display for KucoinKeyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KucoinKeyVersion {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "v1" => Ok(KucoinKeyVersion::V1),
            "2" | "v2" => Ok(KucoinKeyVersion::V2),
            other => Err(GatewayError::Config(format!("Unknown KuCoin key version: {}", other))),
        }
    }
}

// =============================================================================
// Signing
// =============================================================================

/// Base64 HMAC signer with versioned passphrase.
#[derive(Debug, Clone, Copy, Default)]
pub struct KucoinSigner {
    key_version: KucoinKeyVersion,
}

impl KucoinSigner {
    /// Signer for keys of `key_version`.
    pub fn new(key_version: KucoinKeyVersion) -> Self {
        Self { key_version }
    }
}

impl RequestSigner for KucoinSigner {
    fn sign(
        &self,
        mut request: RequestDescriptor,
        credentials: &ApiCredentials,
        timestamp_ms: i64,
    ) -> GatewayResult<RequestDescriptor> {
        let passphrase = credentials.passphrase().ok_or(GatewayError::MissingCredential {
            venue: Venue::Kucoin,
            field: "passphrase",
        })?;

        let prehash = format!(
            "{}{}{}{}",
            timestamp_ms,
            request.method,
            request.request_path(),
            request.body_str()
        );
        let signature = hmac_sha256_base64(&credentials.api_secret, &prehash)?;

        let passphrase = match self.key_version {
            KucoinKeyVersion::V1 => passphrase.to_string(),
            KucoinKeyVersion::V2 => hmac_sha256_base64(&credentials.api_secret, passphrase)?,
        };

        request.push_header("KC-API-KEY", credentials.api_key.clone());
        request.push_header("KC-API-SIGN", signature);
        request.push_header("KC-API-TIMESTAMP", timestamp_ms.to_string());
        request.push_header("KC-API-PASSPHRASE", passphrase);
        request.push_header("KC-API-KEY-VERSION", self.key_version.as_str());

        Ok(request)
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// `{code, data, msg}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KucoinUnwrapper;

impl ResponseUnwrapper for KucoinUnwrapper {
    fn unwrap_payload(&self, endpoint: &str, _status: u16, body: &str) -> GatewayResult<Value> {
        let mut value = parse_json(endpoint, body)?;

        let code = value.get("code").map(code_text).unwrap_or_default();
        if code != SUCCESS_CODE {
            let msg = value.get("msg").and_then(Value::as_str).unwrap_or_default();
            return Err(ERRORS.error(endpoint, code, msg));
        }

        Ok(value.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }
}

/// `walletTxId` values look like `hash@index`; keep the hash.
fn strip_tx_index(raw: &str) -> &str {
    raw.split('@').next().unwrap_or(raw)
}

// =============================================================================
// Status Vocabularies
// =============================================================================

/// Withdrawal and deposit `status` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KucoinStatus {
    /// `PROCESSING`
    Processing,
    /// `WALLET_PROCESSING`
    WalletProcessing,
    /// `REVIEW`
    Review,
    /// `SUCCESS`
    Success,
    /// `FAILURE`
    Failure,
}

impl RawStatus for KucoinStatus {
    const LABEL: &'static str = "kucoin";

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PROCESSING" => Some(Self::Processing),
            "WALLET_PROCESSING" => Some(Self::WalletProcessing),
            "REVIEW" => Some(Self::Review),
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            _ => None,
        }
    }

    fn settlement(&self, entry: &HistoryEntry) -> SettlementStatus {
        match self {
            Self::Processing | Self::WalletProcessing | Self::Review => SettlementStatus::Pending,
            Self::Success => success(entry),
            Self::Failure => failure(entry, "settlement failed"),
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// KuCoin venue adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct KucoinAdapter {
    signer: KucoinSigner,
}

impl KucoinAdapter {
    /// Adapter for keys of `key_version`.
    pub fn new(key_version: KucoinKeyVersion) -> Self {
        Self {
            signer: KucoinSigner::new(key_version),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        pipeline: &RequestPipeline,
        request: RequestDescriptor,
        auth: Auth,
    ) -> GatewayResult<T> {
        pipeline.execute(request, &self.signer, &KucoinUnwrapper, auth).await
    }
}

#[async_trait]
impl VenueAdapter for KucoinAdapter {
    fn venue(&self) -> Venue {
        Venue::Kucoin
    }

    async fn balance(&self, pipeline: &RequestPipeline, currency: &str) -> GatewayResult<Balance> {
        let descriptor = RequestDescriptor::get(ACCOUNTS)
            .param("currency", currency)
            .param("type", "trade");

        let accounts: Vec<AccountRow> = self.call(pipeline, descriptor, Auth::Signed).await?;

        Ok(accounts
            .into_iter()
            .find(|a| a.currency.eq_ignore_ascii_case(currency))
            .map(|a| Balance {
                free: parse_decimal_opt(a.available.as_deref()).unwrap_or_default(),
                locked: parse_decimal_opt(a.holds.as_deref()).unwrap_or_default(),
                currency: a.currency,
            })
            .unwrap_or_else(|| Balance::empty(currency)))
    }

    async fn submit_withdrawal(
        &self,
        pipeline: &RequestPipeline,
        request: &WithdrawalRequest,
        amount: Decimal,
    ) -> GatewayResult<String> {
        let body = WithdrawalBody {
            currency: &request.currency,
            address: &request.address,
            amount: to_wire(amount),
            chain: &request.network,
            memo: request.address_tag.as_deref(),
        };

        let ack: WithdrawalAck = self
            .call(pipeline, RequestDescriptor::post(WITHDRAWALS).json(&body)?, Auth::Signed)
            .await?;
        Ok(ack.withdrawal_id)
    }

    async fn withdrawal_history(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        _id: &str,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        // No id filter on this endpoint. Records come newest first, so a
        // freshly submitted withdrawal sits on the first page.
        let descriptor = RequestDescriptor::get(WITHDRAWALS)
            .param("currency", currency)
            .param("currentPage", "1")
            .param("pageSize", HISTORY_PAGE_SIZE);
        let page: Page<WithdrawalRow> = self.call(pipeline, descriptor, Auth::Signed).await?;

        Ok(page
            .items
            .into_iter()
            .map(|row| HistoryEntry {
                id: row.id,
                tx_hash: non_empty(row.wallet_tx_id.map(|tx| strip_tx_index(&tx).to_string())),
                status: row.status,
                amount: parse_decimal_opt(row.amount.as_deref()),
            })
            .collect())
    }

    fn classify_withdrawal(&self, entry: &HistoryEntry) -> SettlementStatus {
        classify::<KucoinStatus>(Venue::Kucoin, entry)
    }

    async fn deposit_history(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        let descriptor = RequestDescriptor::get(DEPOSITS)
            .param("currency", currency)
            .param("currentPage", "1")
            .param("pageSize", HISTORY_PAGE_SIZE);
        let page: Page<DepositRow> = self.call(pipeline, descriptor, Auth::Signed).await?;

        Ok(page
            .items
            .into_iter()
            .map(|row| {
                let tx_hash = non_empty(row.wallet_tx_id.map(|tx| strip_tx_index(&tx).to_string()));
                HistoryEntry {
                    // Deposits have no separate id
                    id: tx_hash.clone().unwrap_or_default(),
                    tx_hash,
                    status: row.status,
                    amount: parse_decimal_opt(row.amount.as_deref()),
                }
            })
            .collect())
    }

    fn classify_deposit(&self, entry: &HistoryEntry) -> SettlementStatus {
        classify::<KucoinStatus>(Venue::Kucoin, entry)
    }

    async fn deposit_address(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<DepositAddress> {
        let rows: Vec<DepositAddressRow> = self
            .call(pipeline, RequestDescriptor::get(DEPOSIT_ADDRESSES).param("currency", currency), Auth::Signed)
            .await?;

        let endpoint = format!("GET {}", DEPOSIT_ADDRESSES);
        let row = rows
            .into_iter()
            .find(|r| r.chain.eq_ignore_ascii_case(network))
            .ok_or_else(|| not_found(Venue::Kucoin, &endpoint, format!("no {} address on {}", currency, network)))?;

        Ok(DepositAddress {
            currency: currency.to_string(),
            network: row.chain,
            address: row.address,
            tag: non_empty(row.memo),
        })
    }

    async fn withdrawal_terms(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<WithdrawalTerms> {
        let descriptor = RequestDescriptor::get(WITHDRAWAL_QUOTAS)
            .param("currency", currency)
            .param("chain", network);
        let endpoint = format!("GET {}", WITHDRAWAL_QUOTAS);

        let quota: QuotaRow = self.call(pipeline, descriptor, Auth::Signed).await?;

        Ok(WithdrawalTerms {
            step: precision_step(&endpoint, "precision", quota.precision)?,
            min_amount: parse_decimal(&endpoint, "withdrawMinSize", &quota.withdraw_min_size)?,
            fee: parse_decimal_opt(quota.withdraw_min_fee.as_deref()).unwrap_or_default(),
        })
    }

    async fn lot_step(&self, pipeline: &RequestPipeline, symbol: &Symbol) -> GatewayResult<StepSize> {
        let path = format!("{}/{}", SYMBOLS, symbol.joined("-"));
        let endpoint = format!("GET {}", path);

        let info: SymbolRow = self.call(pipeline, RequestDescriptor::get(path), Auth::Public).await?;

        Ok(StepSize::new(parse_decimal(&endpoint, "baseIncrement", &info.base_increment)?)?)
    }

    async fn market_order(
        &self,
        pipeline: &RequestPipeline,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
    ) -> GatewayResult<OrderAck> {
        let client_oid = Uuid::now_v7().to_string();
        let body = OrderBody {
            client_oid: &client_oid,
            side: match side {
                OrderSide::Buy => "buy",
                OrderSide::Sell => "sell",
            },
            symbol: symbol.joined("-"),
            order_type: "market",
            size: to_wire(quantity),
        };

        let ack: OrderAckRow = self
            .call(pipeline, RequestDescriptor::post(ORDERS).json(&body)?, Auth::Signed)
            .await?;

        Ok(OrderAck {
            order_id: ack.order_id,
            quantity,
        })
    }
}

// =============================================================================
// KuCoin Types
// =============================================================================

#[derive(Debug, Serialize)]
struct WithdrawalBody<'a> {
    currency: &'a str,
    address: &'a str,
    amount: String,
    chain: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderBody<'a> {
    client_oid: &'a str,
    side: &'static str,
    symbol: String,
    #[serde(rename = "type")]
    order_type: &'static str,
    size: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    currency: String,
    #[serde(default)]
    available: Option<String>,
    #[serde(default)]
    holds: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalAck {
    withdrawal_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalRow {
    id: String,
    #[serde(default)]
    wallet_tx_id: Option<String>,
    status: String,
    #[serde(default)]
    amount: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositRow {
    #[serde(default)]
    wallet_tx_id: Option<String>,
    status: String,
    #[serde(default)]
    amount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepositAddressRow {
    address: String,
    #[serde(default)]
    memo: Option<String>,
    chain: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaRow {
    withdraw_min_size: String,
    #[serde(default)]
    withdraw_min_fee: Option<String>,
    precision: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolRow {
    base_increment: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAckRow {
    order_id: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TS: i64 = 1_700_000_000_000;

    fn creds() -> ApiCredentials {
        ApiCredentials::new("kucoin-key", "kucoin-secret").with_passphrase("kucoin-pass")
    }

    #[test]
    fn test_get_signature_vector() {
        let request = RequestDescriptor::get(ACCOUNTS)
            .param("currency", "USDT")
            .param("type", "trade");

        let signed = KucoinSigner::default().sign(request, &creds(), TS).unwrap();

        assert_eq!(signed.header("KC-API-SIGN"), Some("1vxvTTC2/xnh/iwIhctRjiJkZd9hWa9pEOEJcMwjsq8="));
        assert_eq!(signed.header("KC-API-TIMESTAMP"), Some("1700000000000"));
        assert_eq!(signed.header("KC-API-KEY-VERSION"), Some("2"));
        assert_eq!(
            signed.header("KC-API-PASSPHRASE"),
            Some("OplStk3M/IYYslJlMpTMb7auKQZQhD1g+JEQkER3KkA=")
        );
    }

    #[test]
    fn test_post_signature_vector() {
        let body = r#"{"currency":"USDT","address":"0xdef","amount":"25","chain":"trx"}"#;
        let request = RequestDescriptor::post(WITHDRAWALS).raw_json(body);

        let signed = KucoinSigner::default().sign(request, &creds(), TS).unwrap();

        assert_eq!(signed.header("KC-API-SIGN"), Some("U39L39VmIlb0oJI64ixbE50u7xylVqpem6tohluPZh0="));
    }

    #[test]
    fn test_v1_passphrase_sent_plain() {
        let signed = KucoinSigner::new(KucoinKeyVersion::V1)
            .sign(RequestDescriptor::get(ACCOUNTS), &creds(), TS)
            .unwrap();

        assert_eq!(signed.header("KC-API-PASSPHRASE"), Some("kucoin-pass"));
        assert_eq!(signed.header("KC-API-KEY-VERSION"), Some("1"));
    }

    #[test]
    fn test_withdrawal_body_matches_signed_shape() {
        let body = WithdrawalBody {
            currency: "USDT",
            address: "0xdef",
            amount: "25".into(),
            chain: "trx",
            memo: None,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"currency":"USDT","address":"0xdef","amount":"25","chain":"trx"}"#
        );
    }

    #[test]
    fn test_key_version_parse() {
        assert_eq!("1".parse::<KucoinKeyVersion>().unwrap(), KucoinKeyVersion::V1);
        assert_eq!("V2".parse::<KucoinKeyVersion>().unwrap(), KucoinKeyVersion::V2);
        assert!("3".parse::<KucoinKeyVersion>().is_err());
    }

    #[test]
    fn test_unwrapper() {
        let data = KucoinUnwrapper
            .unwrap_payload("POST /api/v1/withdrawals", 200, r#"{"code":"200000","data":{"withdrawalId":"w-1"}}"#)
            .unwrap();
        assert_eq!(data["withdrawalId"], "w-1");

        let err = KucoinUnwrapper
            .unwrap_payload("GET /api/v1/accounts", 200, r#"{"code":"400005","msg":"Invalid KC-API-SIGN"}"#)
            .unwrap_err();
        assert_eq!(err.venue_kind(), Some(VenueErrorKind::Authentication));

        let err = KucoinUnwrapper
            .unwrap_payload("GET /api/v1/accounts", 200, r#"{"code":"411100","msg":"User is frozen"}"#)
            .unwrap_err();
        assert!(matches!(err, GatewayError::AccountStatus { venue: Venue::Kucoin, .. }));
    }

    #[test]
    fn test_strip_tx_index() {
        assert_eq!(strip_tx_index("0xabc@3"), "0xabc");
        assert_eq!(strip_tx_index("0xabc"), "0xabc");
    }

    #[test]
    fn test_status_classification() {
        let entry = |s: &str| HistoryEntry {
            id: "1".into(),
            tx_hash: Some("0xabc".into()),
            status: s.into(),
            amount: None,
        };
        let adapter = KucoinAdapter::default();
        assert_eq!(adapter.classify_withdrawal(&entry("WALLET_PROCESSING")), SettlementStatus::Pending);
        assert!(matches!(adapter.classify_withdrawal(&entry("SUCCESS")), SettlementStatus::Success { .. }));
        assert!(matches!(adapter.classify_deposit(&entry("FAILURE")), SettlementStatus::Failure { .. }));
    }
}
