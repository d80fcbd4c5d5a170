//! Binance-family REST dialect (Binance, Commex).
//!
//! # Authentication
//!
//! Binance uses API key + secret with HMAC SHA256 signatures.
//! All signed requests carry:
//! - `X-MBX-APIKEY` header
//! - `recvWindow` and `timestamp` query parameters, appended after the
//!   caller's parameters
//! - `signature` query parameter (hex HMAC SHA256 of the query string),
//!   always last
//!
//! Parameters travel in the query string for every method, POST included.
//!
//! # Envelope
//!
//! Successful calls return the payload itself. Errors are `{code, msg}`,
//! usually with a 4xx status.
//!
//! Commex speaks the same dialect with `/api/v1` as its spot prefix.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use gateway_domain::{
    to_wire, ApiCredentials, Balance, DepositAddress, HistoryEntry, OrderAck, OrderSide,
    SettlementStatus, StepSize, Symbol, Venue, WithdrawalRequest, WithdrawalTerms,
};
use gateway_exec::signing::{code_text, hmac_sha256_hex, parse_json};
use gateway_exec::{
    Auth, ErrorTable, GatewayError, GatewayResult, RequestDescriptor, RequestPipeline,
    RequestSigner, ResponseUnwrapper, VenueErrorKind, DEFAULT_RECV_WINDOW_MS,
};

use crate::adapter::{classify, failure, non_empty, not_found, success, RawStatus, VenueAdapter};

// =============================================================================
// Constants
// =============================================================================

const ACCOUNT_STATUS: &str = "/sapi/v1/account/status";
const WITHDRAW_APPLY: &str = "/sapi/v1/capital/withdraw/apply";
const WITHDRAW_HISTORY: &str = "/sapi/v1/capital/withdraw/history";
const DEPOSIT_HISTORY: &str = "/sapi/v1/capital/deposit/hisrec";
const DEPOSIT_ADDRESS: &str = "/sapi/v1/capital/deposit/address";
const COIN_CONFIG: &str = "/sapi/v1/capital/config/getall";

/// Account status reported by a healthy account.
const NORMAL_ACCOUNT: &str = "Normal";

const ERROR_CODES: &[(&str, VenueErrorKind)] = &[
    ("-1002", VenueErrorKind::Authentication),
    ("-1021", VenueErrorKind::Timestamp),
    ("-1022", VenueErrorKind::Authentication),
    ("-2014", VenueErrorKind::Authentication),
    ("-2015", VenueErrorKind::Authentication),
    ("-1013", VenueErrorKind::Filter),
    ("-1111", VenueErrorKind::Filter),
    ("-2010", VenueErrorKind::Rejected),
];

static BINANCE_ERRORS: ErrorTable = ErrorTable::new(Venue::Binance, ERROR_CODES);
static COMMEX_ERRORS: ErrorTable = ErrorTable::new(Venue::Commex, ERROR_CODES);

// =============================================================================
// Signing
// =============================================================================

/// Query-string HMAC signer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceSigner;

impl RequestSigner for BinanceSigner {
    fn sign(
        &self,
        mut request: RequestDescriptor,
        credentials: &ApiCredentials,
        timestamp_ms: i64,
    ) -> GatewayResult<RequestDescriptor> {
        let recv_window = request.recv_window.unwrap_or(DEFAULT_RECV_WINDOW_MS);
        request.push_param("recvWindow", recv_window.to_string());
        request.push_param("timestamp", timestamp_ms.to_string());

        let signature = hmac_sha256_hex(&credentials.api_secret, &request.query_string())?;
        request.push_param("signature", signature);
        request.push_header("X-MBX-APIKEY", credentials.api_key.clone());

        Ok(request)
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Raw payload, or `{code, msg}` on error.
#[derive(Debug, Clone, Copy)]
pub struct BinanceUnwrapper {
    errors: &'static ErrorTable,
}

impl BinanceUnwrapper {
    /// Unwrapper reporting errors as `venue`.
    pub fn for_venue(venue: Venue) -> Self {
        let errors = match venue {
            Venue::Commex => &COMMEX_ERRORS,
            _ => &BINANCE_ERRORS,
        };
        Self { errors }
    }
}

impl ResponseUnwrapper for BinanceUnwrapper {
    fn unwrap_payload(&self, endpoint: &str, _status: u16, body: &str) -> GatewayResult<Value> {
        let value = parse_json(endpoint, body)?;

        if let (Some(code), Some(msg)) = (value.get("code"), value.get("msg")) {
            let code = code_text(code);
            // A few sapi endpoints echo a success code alongside the payload
            if code != "0" && code != "200" {
                let msg = msg.as_str().unwrap_or_default();
                return Err(self.errors.error(endpoint, code, msg));
            }
        }

        Ok(value)
    }
}

// =============================================================================
// Status Vocabularies
// =============================================================================

/// `status` of `/sapi/v1/capital/withdraw/history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceWithdrawStatus {
    /// 0
    EmailSent,
    /// 1
    Cancelled,
    /// 2
    AwaitingApproval,
    /// 3
    Rejected,
    /// 4
    Processing,
    /// 5
    Failure,
    /// 6
    Completed,
}

impl RawStatus for BinanceWithdrawStatus {
    const LABEL: &'static str = "binance withdrawal";

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "0" => Some(Self::EmailSent),
            "1" => Some(Self::Cancelled),
            "2" => Some(Self::AwaitingApproval),
            "3" => Some(Self::Rejected),
            "4" => Some(Self::Processing),
            "5" => Some(Self::Failure),
            "6" => Some(Self::Completed),
            _ => None,
        }
    }

    fn settlement(&self, entry: &HistoryEntry) -> SettlementStatus {
        match self {
            Self::EmailSent | Self::AwaitingApproval | Self::Processing => SettlementStatus::Pending,
            Self::Completed => success(entry),
            Self::Cancelled => failure(entry, "withdrawal cancelled"),
            Self::Rejected => failure(entry, "withdrawal rejected"),
            Self::Failure => failure(entry, "withdrawal failed"),
        }
    }
}

/// `status` of `/sapi/v1/capital/deposit/hisrec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceDepositStatus {
    /// 0
    Pending,
    /// 1
    Success,
    /// 2
    Rejected,
    /// 6: credited, not yet withdrawable
    CreditedCannotWithdraw,
    /// 7
    WrongDeposit,
    /// 8
    WaitingUserConfirm,
}

impl RawStatus for BinanceDepositStatus {
    const LABEL: &'static str = "binance deposit";

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "0" => Some(Self::Pending),
            "1" => Some(Self::Success),
            "2" => Some(Self::Rejected),
            "6" => Some(Self::CreditedCannotWithdraw),
            "7" => Some(Self::WrongDeposit),
            "8" => Some(Self::WaitingUserConfirm),
            _ => None,
        }
    }

    fn settlement(&self, entry: &HistoryEntry) -> SettlementStatus {
        match self {
            Self::Pending | Self::WaitingUserConfirm => SettlementStatus::Pending,
            Self::Success | Self::CreditedCannotWithdraw => success(entry),
            Self::Rejected => failure(entry, "deposit rejected"),
            Self::WrongDeposit => failure(entry, "wrong deposit"),
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Binance-family venue adapter.
pub struct BinanceAdapter {
    venue: Venue,
    spot_prefix: &'static str,
    unwrapper: BinanceUnwrapper,
}

impl BinanceAdapter {
    /// Binance (`/api/v3`).
    pub fn binance() -> Self {
        Self {
            venue: Venue::Binance,
            spot_prefix: "/api/v3",
            unwrapper: BinanceUnwrapper::for_venue(Venue::Binance),
        }
    }

    /// Commex (`/api/v1`).
    pub fn commex() -> Self {
        Self {
            venue: Venue::Commex,
            spot_prefix: "/api/v1",
            unwrapper: BinanceUnwrapper::for_venue(Venue::Commex),
        }
    }

    fn spot(&self, path: &str) -> String {
        format!("{}{}", self.spot_prefix, path)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        pipeline: &RequestPipeline,
        request: RequestDescriptor,
        auth: Auth,
    ) -> GatewayResult<T> {
        pipeline.execute(request, &BinanceSigner, &self.unwrapper, auth).await
    }
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn balance(&self, pipeline: &RequestPipeline, currency: &str) -> GatewayResult<Balance> {
        let account: AccountInfo = self
            .call(pipeline, RequestDescriptor::get(self.spot("/account")), Auth::Signed)
            .await?;

        Ok(account
            .balances
            .into_iter()
            .find(|b| b.asset.eq_ignore_ascii_case(currency))
            .map(|b| Balance {
                currency: b.asset,
                free: b.free,
                locked: b.locked,
            })
            .unwrap_or_else(|| Balance::empty(currency)))
    }

    async fn check_account(&self, pipeline: &RequestPipeline) -> GatewayResult<()> {
        let status: AccountStatusResponse = self
            .call(pipeline, RequestDescriptor::get(ACCOUNT_STATUS), Auth::Signed)
            .await?;

        if status.data != NORMAL_ACCOUNT {
            warn!(venue = %self.venue, status = %status.data, "Account is not in normal state");
            return Err(GatewayError::AccountStatus {
                venue: self.venue,
                code: status.data,
                message: "account status is not Normal".to_string(),
            });
        }

        info!(venue = %self.venue, "Account status normal");
        Ok(())
    }

    async fn submit_withdrawal(
        &self,
        pipeline: &RequestPipeline,
        request: &WithdrawalRequest,
        amount: Decimal,
    ) -> GatewayResult<String> {
        let descriptor = RequestDescriptor::post(WITHDRAW_APPLY)
            .param("coin", request.currency.as_str())
            .param("network", request.network.as_str())
            .param("address", request.address.as_str())
            .param_opt("addressTag", request.address_tag.as_deref())
            .param("amount", to_wire(amount));

        let ack: WithdrawAck = self.call(pipeline, descriptor, Auth::Signed).await?;
        Ok(ack.id)
    }

    async fn withdrawal_history(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        id: &str,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        let descriptor = RequestDescriptor::get(WITHDRAW_HISTORY)
            .param("coin", currency)
            .param("idList", id);

        let rows: Vec<WithdrawRow> = self.call(pipeline, descriptor, Auth::Signed).await?;
        Ok(rows
            .into_iter()
            .map(|row| HistoryEntry {
                id: row.id,
                tx_hash: non_empty(row.tx_id),
                status: row.status.to_string(),
                amount: row.amount,
            })
            .collect())
    }

    fn classify_withdrawal(&self, entry: &HistoryEntry) -> SettlementStatus {
        classify::<BinanceWithdrawStatus>(self.venue, entry)
    }

    async fn deposit_history(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        let descriptor = RequestDescriptor::get(DEPOSIT_HISTORY).param("coin", currency);

        let rows: Vec<DepositRow> = self.call(pipeline, descriptor, Auth::Signed).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let tx_hash = non_empty(row.tx_id);
                HistoryEntry {
                    id: row.id.or_else(|| tx_hash.clone()).unwrap_or_default(),
                    tx_hash,
                    status: row.status.to_string(),
                    amount: row.amount,
                }
            })
            .collect())
    }

    fn classify_deposit(&self, entry: &HistoryEntry) -> SettlementStatus {
        classify::<BinanceDepositStatus>(self.venue, entry)
    }

    async fn deposit_address(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<DepositAddress> {
        let descriptor = RequestDescriptor::get(DEPOSIT_ADDRESS)
            .param("coin", currency)
            .param("network", network);

        let raw: DepositAddressResponse = self.call(pipeline, descriptor, Auth::Signed).await?;
        Ok(DepositAddress {
            currency: raw.coin,
            network: network.to_string(),
            address: raw.address,
            tag: non_empty(raw.tag),
        })
    }

    async fn withdrawal_terms(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<WithdrawalTerms> {
        let coins: Vec<CoinConfig> = self
            .call(pipeline, RequestDescriptor::get(COIN_CONFIG), Auth::Signed)
            .await?;

        let endpoint = format!("GET {}", COIN_CONFIG);
        let net = coins
            .into_iter()
            .find(|c| c.coin.eq_ignore_ascii_case(currency))
            .and_then(|c| {
                c.network_list
                    .into_iter()
                    .find(|n| n.network.eq_ignore_ascii_case(network))
            })
            .ok_or_else(|| {
                not_found(self.venue, &endpoint, format!("no {} network {}", currency, network))
            })?;

        Ok(WithdrawalTerms {
            step: StepSize::new(net.withdraw_integer_multiple)?,
            min_amount: net.withdraw_min,
            fee: net.withdraw_fee,
        })
    }

    async fn lot_step(&self, pipeline: &RequestPipeline, symbol: &Symbol) -> GatewayResult<StepSize> {
        let pair = symbol.joined("");
        let path = self.spot("/exchangeInfo");
        let endpoint = format!("GET {}", path);
        let info: ExchangeInfo = self
            .call(pipeline, RequestDescriptor::get(path).param("symbol", pair.as_str()), Auth::Public)
            .await?;

        let step = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == pair)
            .and_then(|s| {
                s.filters
                    .into_iter()
                    .find(|f| f.filter_type == "LOT_SIZE")
                    .and_then(|f| f.step_size)
            })
            .ok_or_else(|| not_found(self.venue, &endpoint, format!("no LOT_SIZE for {}", pair)))?;

        Ok(StepSize::new(step)?)
    }

    async fn market_order(
        &self,
        pipeline: &RequestPipeline,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
    ) -> GatewayResult<OrderAck> {
        let descriptor = RequestDescriptor::post(self.spot("/order"))
            .param("symbol", symbol.joined(""))
            .param("side", side.to_string())
            .param("type", "MARKET")
            .param("quantity", to_wire(quantity))
            .param("newClientOrderId", Uuid::now_v7().simple().to_string());

        let order: OrderResponse = self.call(pipeline, descriptor, Auth::Signed).await?;
        Ok(OrderAck {
            order_id: order.order_id.to_string(),
            quantity,
        })
    }
}

// =============================================================================
// Binance Types (from API responses)
// =============================================================================

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<RawBalance>,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    asset: String,
    free: Decimal,
    locked: Decimal,
}

#[derive(Debug, Deserialize)]
struct AccountStatusResponse {
    data: String,
}

#[derive(Debug, Deserialize)]
struct WithdrawAck {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawRow {
    id: String,
    amount: Option<Decimal>,
    status: i64,
    #[serde(default)]
    tx_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositRow {
    #[serde(default)]
    id: Option<String>,
    amount: Option<Decimal>,
    status: i64,
    #[serde(default)]
    tx_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepositAddressResponse {
    address: String,
    coin: String,
    #[serde(default)]
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinConfig {
    coin: String,
    network_list: Vec<NetworkConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkConfig {
    network: String,
    withdraw_fee: Decimal,
    withdraw_min: Decimal,
    withdraw_integer_multiple: Decimal,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    #[serde(default)]
    step_size: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DOC_SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";

    fn doc_order() -> RequestDescriptor {
        RequestDescriptor::post("/api/v3/order")
            .param("symbol", "LTCBTC")
            .param("side", "BUY")
            .param("type", "LIMIT")
            .param("timeInForce", "GTC")
            .param("quantity", "1")
            .param("price", "0.1")
    }

    #[test]
    fn test_signature_matches_documented_vector() {
        let creds = ApiCredentials::new("api-key", DOC_SECRET);

        let signed = BinanceSigner.sign(doc_order(), &creds, 1_499_827_319_559).unwrap();

        assert_eq!(
            signed.query_string(),
            "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1\
             &recvWindow=5000&timestamp=1499827319559\
             &signature=c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
        assert_eq!(signed.header("X-MBX-APIKEY"), Some("api-key"));
        assert_eq!(signed.body_str(), "");
    }

    #[test]
    fn test_signing_is_idempotent_for_fixed_timestamp() {
        let creds = ApiCredentials::new("k", "s");
        let a = BinanceSigner.sign(doc_order(), &creds, 1).unwrap();
        let b = BinanceSigner.sign(doc_order(), &creds, 1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_recv_window_is_signed() {
        let creds = ApiCredentials::new("k", "s");
        let signed = BinanceSigner
            .sign(RequestDescriptor::get("/api/v3/account").recv_window(60000), &creds, 7)
            .unwrap();

        assert_eq!(signed.query_value("recvWindow"), Some("60000"));
        assert_eq!(signed.query.last().map(|(k, _)| k.as_str()), Some("signature"));
    }

    #[test]
    fn test_unwrapper_passes_raw_payload() {
        let unwrapper = BinanceUnwrapper::for_venue(Venue::Binance);
        let value = unwrapper.unwrap_payload("GET /x", 200, r#"{"balances":[]}"#).unwrap();
        assert!(value.get("balances").is_some());
    }

    #[test]
    fn test_unwrapper_raises_embedded_error() {
        let unwrapper = BinanceUnwrapper::for_venue(Venue::Commex);
        let err = unwrapper
            .unwrap_payload("POST /api/v1/order", 200, r#"{"code":-1013,"msg":"Filter failure: LOT_SIZE"}"#)
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Venue { venue: Venue::Commex, kind: VenueErrorKind::Filter, ref code, .. } if code == "-1013"
        ));
    }

    #[test]
    fn test_error_table_classification() {
        assert_eq!(BINANCE_ERRORS.kind("-1021"), VenueErrorKind::Timestamp);
        assert_eq!(BINANCE_ERRORS.kind("-2015"), VenueErrorKind::Authentication);
        assert_eq!(BINANCE_ERRORS.kind("-9000"), VenueErrorKind::Rejected);
    }

    fn entry(status: &str) -> HistoryEntry {
        HistoryEntry {
            id: "w".into(),
            tx_hash: Some("0xabc".into()),
            status: status.into(),
            amount: None,
        }
    }

    #[test]
    fn test_withdraw_status_classification() {
        let adapter = BinanceAdapter::binance();
        for pending in ["0", "2", "4"] {
            assert_eq!(adapter.classify_withdrawal(&entry(pending)), SettlementStatus::Pending);
        }
        for failed in ["1", "3", "5"] {
            assert!(matches!(
                adapter.classify_withdrawal(&entry(failed)),
                SettlementStatus::Failure { .. }
            ));
        }
        assert_eq!(
            adapter.classify_withdrawal(&entry("6")),
            SettlementStatus::Success { tx_hash: Some("0xabc".into()) }
        );
        assert_eq!(adapter.classify_withdrawal(&entry("42")), SettlementStatus::Pending);
    }

    #[test]
    fn test_deposit_status_classification() {
        let adapter = BinanceAdapter::commex();
        assert_eq!(adapter.classify_deposit(&entry("0")), SettlementStatus::Pending);
        assert_eq!(adapter.classify_deposit(&entry("8")), SettlementStatus::Pending);
        assert!(adapter.classify_deposit(&entry("1")).is_terminal());
        assert!(adapter.classify_deposit(&entry("6")).is_terminal());
        assert!(matches!(
            adapter.classify_deposit(&entry("7")),
            SettlementStatus::Failure { .. }
        ));
    }

    #[test]
    fn test_spot_prefix_per_venue() {
        assert_eq!(BinanceAdapter::binance().spot("/order"), "/api/v3/order");
        assert_eq!(BinanceAdapter::commex().spot("/order"), "/api/v1/order");
    }
}
