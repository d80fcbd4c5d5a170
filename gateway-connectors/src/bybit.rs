//! Bybit v5 REST dialect.
//!
//! # Authentication
//!
//! Signed requests carry four headers: `X-BAPI-API-KEY`, `X-BAPI-SIGN`,
//! `X-BAPI-TIMESTAMP`, `X-BAPI-RECV-WINDOW`. The signature is hex
//! HMAC-SHA256 over
//!
//! ```text
//! timestamp + api_key + recv_window + (GET: query string | POST: raw body)
//! ```
//!
//! # Envelope
//!
//! `{retCode, retMsg, result}`; `retCode == 0` is success, on any HTTP status.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gateway_domain::{
    to_wire, ApiCredentials, Balance, DepositAddress, HistoryEntry, OrderAck, OrderSide,
    SettlementStatus, StepSize, Symbol, Venue, WithdrawalRequest, WithdrawalTerms,
};
use gateway_exec::signing::{code_text, hmac_sha256_hex, parse_json};
use gateway_exec::{
    Auth, ErrorTable, GatewayError, GatewayResult, HttpMethod, RequestDescriptor, RequestPipeline,
    RequestSigner, ResponseUnwrapper, VenueErrorKind, DEFAULT_RECV_WINDOW_MS,
};
use uuid::Uuid;

use crate::adapter::{
    classify, failure, non_empty, not_found, parse_decimal, parse_decimal_opt, precision_step,
    success, RawStatus, VenueAdapter,
};

// =============================================================================
// Constants
// =============================================================================

const WALLET_BALANCE: &str = "/v5/account/wallet-balance";
const WITHDRAW: &str = "/v5/asset/withdraw";
const WITHDRAW_RECORDS: &str = "/v5/asset/withdraw/query-record";
const DEPOSIT_RECORDS: &str = "/v5/asset/deposit/query-record";
const DEPOSIT_ADDRESS: &str = "/v5/asset/deposit/query-address";
const COIN_INFO: &str = "/v5/asset/coin/query-info";
const INSTRUMENTS: &str = "/v5/market/instruments-info";
const ORDER_CREATE: &str = "/v5/order/create";

static ERRORS: ErrorTable = ErrorTable::new(
    Venue::Bybit,
    &[
        ("10002", VenueErrorKind::Timestamp),
        ("10003", VenueErrorKind::Authentication),
        ("10004", VenueErrorKind::Authentication),
        ("10005", VenueErrorKind::Authentication),
        ("10010", VenueErrorKind::Authentication),
        ("10024", VenueErrorKind::AccountRestricted),
        ("170137", VenueErrorKind::Filter),
    ],
);

// =============================================================================
// Signing
// =============================================================================

/// Header-based HMAC signer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BybitSigner;

impl RequestSigner for BybitSigner {
    fn sign(
        &self,
        mut request: RequestDescriptor,
        credentials: &ApiCredentials,
        timestamp_ms: i64,
    ) -> GatewayResult<RequestDescriptor> {
        let recv_window = request.recv_window.unwrap_or(DEFAULT_RECV_WINDOW_MS);
        let payload = match request.method {
            HttpMethod::Post => request.body_str().to_string(),
            HttpMethod::Get | HttpMethod::Delete => request.query_string(),
        };

        let prehash = format!("{}{}{}{}", timestamp_ms, credentials.api_key, recv_window, payload);
        let signature = hmac_sha256_hex(&credentials.api_secret, &prehash)?;

        request.push_header("X-BAPI-API-KEY", credentials.api_key.clone());
        request.push_header("X-BAPI-SIGN", signature);
        request.push_header("X-BAPI-TIMESTAMP", timestamp_ms.to_string());
        request.push_header("X-BAPI-RECV-WINDOW", recv_window.to_string());

        Ok(request)
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// `{retCode, retMsg, result}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BybitUnwrapper;

impl ResponseUnwrapper for BybitUnwrapper {
    fn unwrap_payload(&self, endpoint: &str, _status: u16, body: &str) -> GatewayResult<Value> {
        let mut value = parse_json(endpoint, body)?;

        let code = value.get("retCode").map(code_text).unwrap_or_default();
        if code != "0" {
            let msg = value.get("retMsg").and_then(Value::as_str).unwrap_or_default();
            return Err(ERRORS.error(endpoint, code, msg));
        }

        Ok(value.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }
}

// =============================================================================
// Status Vocabularies
// =============================================================================

/// Withdrawal `status` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BybitWithdrawStatus {
    /// `SecurityCheck`
    SecurityCheck,
    /// `Pending`
    Pending,
    /// `success`
    Success,
    /// `CancelByUser`
    CancelByUser,
    /// `Reject`
    Reject,
    /// `Fail`
    Fail,
    /// `BlockchainConfirmed`
    BlockchainConfirmed,
    /// `MoreInformationRequired`
    MoreInformationRequired,
    /// `Unknown`
    Unknown,
}

impl RawStatus for BybitWithdrawStatus {
    const LABEL: &'static str = "bybit withdrawal";

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SecurityCheck" => Some(Self::SecurityCheck),
            "Pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "CancelByUser" => Some(Self::CancelByUser),
            "Reject" => Some(Self::Reject),
            "Fail" => Some(Self::Fail),
            "BlockchainConfirmed" => Some(Self::BlockchainConfirmed),
            "MoreInformationRequired" => Some(Self::MoreInformationRequired),
            "Unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    fn settlement(&self, entry: &HistoryEntry) -> SettlementStatus {
        match self {
            Self::SecurityCheck
            | Self::Pending
            | Self::BlockchainConfirmed
            | Self::MoreInformationRequired
            | Self::Unknown => SettlementStatus::Pending,
            Self::Success => success(entry),
            Self::CancelByUser => failure(entry, "withdrawal cancelled"),
            Self::Reject => failure(entry, "withdrawal rejected"),
            Self::Fail => failure(entry, "withdrawal failed"),
        }
    }
}

/// Deposit `status` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BybitDepositStatus {
    /// 0
    Unknown,
    /// 1
    ToBeConfirmed,
    /// 2
    Processing,
    /// 3
    Success,
    /// 4
    Failed,
    /// 10011: waiting to be credited to the funding pool
    PendingFundingPool,
    /// 10012: credited to the funding pool
    CreditedFundingPool,
}

impl RawStatus for BybitDepositStatus {
    const LABEL: &'static str = "bybit deposit";

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "0" => Some(Self::Unknown),
            "1" => Some(Self::ToBeConfirmed),
            "2" => Some(Self::Processing),
            "3" => Some(Self::Success),
            "4" => Some(Self::Failed),
            "10011" => Some(Self::PendingFundingPool),
            "10012" => Some(Self::CreditedFundingPool),
            _ => None,
        }
    }

    fn settlement(&self, entry: &HistoryEntry) -> SettlementStatus {
        match self {
            Self::Unknown | Self::ToBeConfirmed | Self::Processing | Self::PendingFundingPool => {
                SettlementStatus::Pending
            },
            Self::Success | Self::CreditedFundingPool => success(entry),
            Self::Failed => failure(entry, "deposit failed"),
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Bybit venue adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct BybitAdapter;

impl BybitAdapter {
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        pipeline: &RequestPipeline,
        request: RequestDescriptor,
        auth: Auth,
    ) -> GatewayResult<T> {
        pipeline.execute(request, &BybitSigner, &BybitUnwrapper, auth).await
    }
}

#[async_trait]
impl VenueAdapter for BybitAdapter {
    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    async fn balance(&self, pipeline: &RequestPipeline, currency: &str) -> GatewayResult<Balance> {
        let descriptor = RequestDescriptor::get(WALLET_BALANCE)
            .param("accountType", "UNIFIED")
            .param("coin", currency);

        let wallet: ListResult<WalletAccount> = self.call(pipeline, descriptor, Auth::Signed).await?;

        let coin = wallet
            .list
            .into_iter()
            .flat_map(|account| account.coin)
            .find(|c| c.coin.eq_ignore_ascii_case(currency));

        Ok(match coin {
            Some(c) => {
                let total = parse_decimal_opt(c.wallet_balance.as_deref()).unwrap_or_default();
                let locked = parse_decimal_opt(c.locked.as_deref()).unwrap_or_default();
                Balance {
                    currency: c.coin,
                    free: total - locked,
                    locked,
                }
            },
            None => Balance::empty(currency),
        })
    }

    async fn submit_withdrawal(
        &self,
        pipeline: &RequestPipeline,
        request: &WithdrawalRequest,
        amount: Decimal,
    ) -> GatewayResult<String> {
        let body = WithdrawBody {
            coin: &request.currency,
            chain: &request.network,
            address: &request.address,
            tag: request.address_tag.as_deref(),
            amount: to_wire(amount),
            timestamp: pipeline.clock().now_millis(),
            account_type: "FUND",
        };

        let ack: WithdrawAck = self
            .call(pipeline, RequestDescriptor::post(WITHDRAW).json(&body)?, Auth::Signed)
            .await?;
        Ok(ack.id)
    }

    async fn withdrawal_history(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        id: &str,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        let descriptor = RequestDescriptor::get(WITHDRAW_RECORDS)
            .param("withdrawID", id)
            .param("coin", currency);

        let records: RowsResult<WithdrawRow> = self.call(pipeline, descriptor, Auth::Signed).await?;
        Ok(records
            .rows
            .into_iter()
            .map(|row| HistoryEntry {
                id: row.withdraw_id,
                tx_hash: non_empty(row.tx_id),
                status: row.status,
                amount: parse_decimal_opt(row.amount.as_deref()),
            })
            .collect())
    }

    fn classify_withdrawal(&self, entry: &HistoryEntry) -> SettlementStatus {
        classify::<BybitWithdrawStatus>(Venue::Bybit, entry)
    }

    async fn deposit_history(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        let descriptor = RequestDescriptor::get(DEPOSIT_RECORDS).param("coin", currency);

        let records: RowsResult<DepositRow> = self.call(pipeline, descriptor, Auth::Signed).await?;
        Ok(records
            .rows
            .into_iter()
            .map(|row| {
                let tx_hash = non_empty(row.tx_id);
                HistoryEntry {
                    id: non_empty(row.id).or_else(|| tx_hash.clone()).unwrap_or_default(),
                    tx_hash,
                    status: row.status.to_string(),
                    amount: parse_decimal_opt(row.amount.as_deref()),
                }
            })
            .collect())
    }

    fn classify_deposit(&self, entry: &HistoryEntry) -> SettlementStatus {
        classify::<BybitDepositStatus>(Venue::Bybit, entry)
    }

    async fn deposit_address(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<DepositAddress> {
        let descriptor = RequestDescriptor::get(DEPOSIT_ADDRESS)
            .param("coin", currency)
            .param("chainType", network);

        let raw: DepositAddressResult = self.call(pipeline, descriptor, Auth::Signed).await?;
        let endpoint = format!("GET {}", DEPOSIT_ADDRESS);
        let chain = raw
            .chains
            .into_iter()
            .find(|c| c.chain_type.eq_ignore_ascii_case(network) || c.chain.eq_ignore_ascii_case(network))
            .ok_or_else(|| {
                not_found(Venue::Bybit, &endpoint, format!("no {} address on {}", currency, network))
            })?;

        Ok(DepositAddress {
            currency: raw.coin,
            network: chain.chain,
            address: chain.address_deposit,
            tag: non_empty(chain.tag_deposit),
        })
    }

    async fn withdrawal_terms(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<WithdrawalTerms> {
        let descriptor = RequestDescriptor::get(COIN_INFO).param("coin", currency);
        let endpoint = format!("GET {}", COIN_INFO);

        let info: RowsResult<CoinInfo> = self.call(pipeline, descriptor, Auth::Signed).await?;
        let chain = info
            .rows
            .into_iter()
            .find(|c| c.coin.eq_ignore_ascii_case(currency))
            .and_then(|c| {
                c.chains.into_iter().find(|ch| {
                    ch.chain.eq_ignore_ascii_case(network) || ch.chain_type.eq_ignore_ascii_case(network)
                })
            })
            .ok_or_else(|| {
                not_found(Venue::Bybit, &endpoint, format!("no {} chain {}", currency, network))
            })?;

        let digits: u32 = chain.min_accuracy.trim().parse().map_err(|_| {
            GatewayError::Deserialization {
                endpoint: endpoint.clone(),
                message: "field `minAccuracy` is not an integer".to_string(),
                raw_body: chain.min_accuracy.clone(),
            }
        })?;

        Ok(WithdrawalTerms {
            step: precision_step(&endpoint, "minAccuracy", digits)?,
            min_amount: parse_decimal(&endpoint, "withdrawMin", &chain.withdraw_min)?,
            fee: parse_decimal_opt(chain.withdraw_fee.as_deref()).unwrap_or_default(),
        })
    }

    async fn lot_step(&self, pipeline: &RequestPipeline, symbol: &Symbol) -> GatewayResult<StepSize> {
        let pair = symbol.joined("");
        let descriptor = RequestDescriptor::get(INSTRUMENTS)
            .param("category", "spot")
            .param("symbol", pair.as_str());
        let endpoint = format!("GET {}", INSTRUMENTS);

        let instruments: ListResult<Instrument> = self.call(pipeline, descriptor, Auth::Public).await?;
        let instrument = instruments
            .list
            .into_iter()
            .find(|i| i.symbol == pair)
            .ok_or_else(|| not_found(Venue::Bybit, &endpoint, format!("unknown symbol {}", pair)))?;

        let step = parse_decimal(&endpoint, "basePrecision", &instrument.lot_size_filter.base_precision)?;
        Ok(StepSize::new(step)?)
    }

    async fn market_order(
        &self,
        pipeline: &RequestPipeline,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
    ) -> GatewayResult<OrderAck> {
        let link_id = Uuid::now_v7().simple().to_string();
        let body = OrderBody {
            category: "spot",
            symbol: symbol.joined(""),
            side: match side {
                OrderSide::Buy => "Buy",
                OrderSide::Sell => "Sell",
            },
            order_type: "Market",
            qty: to_wire(quantity),
            market_unit: "baseCoin",
            order_link_id: &link_id,
        };

        let order: OrderResult = self
            .call(pipeline, RequestDescriptor::post(ORDER_CREATE).json(&body)?, Auth::Signed)
            .await?;
        Ok(OrderAck {
            order_id: order.order_id,
            quantity,
        })
    }
}

// =============================================================================
// Bybit Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawBody<'a> {
    coin: &'a str,
    chain: &'a str,
    address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
    amount: String,
    timestamp: i64,
    account_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderBody<'a> {
    category: &'static str,
    symbol: String,
    side: &'static str,
    order_type: &'static str,
    qty: String,
    market_unit: &'static str,
    order_link_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RowsResult<T> {
    rows: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct WalletAccount {
    coin: Vec<WalletCoin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletCoin {
    coin: String,
    #[serde(default)]
    wallet_balance: Option<String>,
    #[serde(default)]
    locked: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WithdrawAck {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawRow {
    withdraw_id: String,
    #[serde(rename = "txID", default)]
    tx_id: Option<String>,
    status: String,
    #[serde(default)]
    amount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepositRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "txID", default)]
    tx_id: Option<String>,
    status: i64,
    #[serde(default)]
    amount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepositAddressResult {
    coin: String,
    chains: Vec<DepositChain>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositChain {
    chain_type: String,
    address_deposit: String,
    #[serde(default)]
    tag_deposit: Option<String>,
    chain: String,
}

#[derive(Debug, Deserialize)]
struct CoinInfo {
    coin: String,
    chains: Vec<CoinChain>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinChain {
    chain: String,
    #[serde(default)]
    chain_type: String,
    #[serde(default)]
    withdraw_fee: Option<String>,
    withdraw_min: String,
    min_accuracy: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instrument {
    symbol: String,
    lot_size_filter: LotSizeFilter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LotSizeFilter {
    base_precision: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResult {
    order_id: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> ApiCredentials {
        ApiCredentials::new("bybit-key", "bybit-secret")
    }

    #[test]
    fn test_get_signature_vector() {
        let request = RequestDescriptor::get(WALLET_BALANCE)
            .param("accountType", "UNIFIED")
            .param("coin", "USDT");

        let signed = BybitSigner.sign(request, &creds(), 1_700_000_000_000).unwrap();

        assert_eq!(
            signed.header("X-BAPI-SIGN"),
            Some("45d0c9ba1c8a3146c9ca8d8d4296503961fe51882ed172f36cc2499177195055")
        );
        assert_eq!(signed.header("X-BAPI-API-KEY"), Some("bybit-key"));
        assert_eq!(signed.header("X-BAPI-TIMESTAMP"), Some("1700000000000"));
        assert_eq!(signed.header("X-BAPI-RECV-WINDOW"), Some("5000"));
        // Query is left untouched
        assert_eq!(signed.query_string(), "accountType=UNIFIED&coin=USDT");
    }

    #[test]
    fn test_post_signature_vector_signs_raw_body() {
        let body = r#"{"coin":"USDT","chain":"TRX","address":"TXYZ","amount":"10.5","timestamp":1700000000000,"accountType":"FUND"}"#;
        let request = RequestDescriptor::post(WITHDRAW).raw_json(body).recv_window(10000);

        let signed = BybitSigner.sign(request, &creds(), 1_700_000_000_000).unwrap();

        assert_eq!(
            signed.header("X-BAPI-SIGN"),
            Some("b635d385f742e242470be01f6def5bc9e8c8b03fdbc9cd880c61edf8f07f6080")
        );
        assert_eq!(signed.header("X-BAPI-RECV-WINDOW"), Some("10000"));
    }

    #[test]
    fn test_withdraw_body_field_order() {
        let body = WithdrawBody {
            coin: "USDT",
            chain: "TRX",
            address: "TXYZ",
            tag: None,
            amount: "10.5".into(),
            timestamp: 1_700_000_000_000,
            account_type: "FUND",
        };

        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"coin":"USDT","chain":"TRX","address":"TXYZ","amount":"10.5","timestamp":1700000000000,"accountType":"FUND"}"#
        );
    }

    #[test]
    fn test_unwrapper_returns_result() {
        let value = BybitUnwrapper
            .unwrap_payload("GET /v5/x", 200, r#"{"retCode":0,"retMsg":"OK","result":{"id":"1"}}"#)
            .unwrap();
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn test_unwrapper_embedded_errors() {
        let err = BybitUnwrapper
            .unwrap_payload("GET /v5/x", 200, r#"{"retCode":10002,"retMsg":"invalid request, please check your server timestamp","result":{}}"#)
            .unwrap_err();
        assert_eq!(err.venue_kind(), Some(VenueErrorKind::Timestamp));

        let err = BybitUnwrapper
            .unwrap_payload("GET /v5/x", 200, r#"{"retCode":10024,"retMsg":"Compliance rules triggered","result":{}}"#)
            .unwrap_err();
        assert!(matches!(err, GatewayError::AccountStatus { venue: Venue::Bybit, .. }));
    }

    fn entry(status: &str) -> HistoryEntry {
        HistoryEntry {
            id: "1".into(),
            tx_hash: None,
            status: status.into(),
            amount: None,
        }
    }

    #[test]
    fn test_status_classification() {
        let adapter = BybitAdapter;
        assert_eq!(adapter.classify_withdrawal(&entry("SecurityCheck")), SettlementStatus::Pending);
        assert_eq!(adapter.classify_withdrawal(&entry("BlockchainConfirmed")), SettlementStatus::Pending);
        assert!(matches!(adapter.classify_withdrawal(&entry("success")), SettlementStatus::Success { .. }));
        assert!(matches!(adapter.classify_withdrawal(&entry("Reject")), SettlementStatus::Failure { .. }));

        assert_eq!(adapter.classify_deposit(&entry("10011")), SettlementStatus::Pending);
        assert!(matches!(adapter.classify_deposit(&entry("3")), SettlementStatus::Success { .. }));
        assert!(matches!(adapter.classify_deposit(&entry("4")), SettlementStatus::Failure { .. }));
    }
}
