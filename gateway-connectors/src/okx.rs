//! OKX v5 REST dialect.
//!
//! # Authentication
//!
//! Signed requests carry `OK-ACCESS-KEY`, `OK-ACCESS-SIGN`,
//! `OK-ACCESS-TIMESTAMP` and `OK-ACCESS-PASSPHRASE`. The signature is base64
//! HMAC-SHA256 over
//!
//! ```text
//! iso8601_ms_timestamp + METHOD + path[?query] + body
//! ```
//!
//! # Envelope
//!
//! `{code, msg, data: [...]}` with `code == "0"` on success. Write endpoints
//! also report per-item `sCode`/`sMsg`; a non-zero item code is an error even
//! when the top-level code is `"0"`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
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

const BALANCES: &str = "/api/v5/asset/balances";
const WITHDRAWAL: &str = "/api/v5/asset/withdrawal";
const WITHDRAWAL_HISTORY: &str = "/api/v5/asset/withdrawal-history";
const DEPOSIT_HISTORY: &str = "/api/v5/asset/deposit-history";
const DEPOSIT_ADDRESS: &str = "/api/v5/asset/deposit-address";
const CURRENCIES: &str = "/api/v5/asset/currencies";
const INSTRUMENTS: &str = "/api/v5/public/instruments";
const ORDER: &str = "/api/v5/trade/order";

/// `dest` value for an on-chain withdrawal.
const ON_CHAIN: &str = "4";

static ERRORS: ErrorTable = ErrorTable::new(
    Venue::Okx,
    &[
        ("50100", VenueErrorKind::AccountRestricted),
        ("50102", VenueErrorKind::Timestamp),
        ("50105", VenueErrorKind::Authentication),
        ("50111", VenueErrorKind::Authentication),
        ("50113", VenueErrorKind::Authentication),
        ("50114", VenueErrorKind::Authentication),
        ("51121", VenueErrorKind::Filter),
    ],
);

// =============================================================================
// Signing
// =============================================================================

/// OKX timestamp format: ISO-8601 UTC with milliseconds.
pub fn iso_timestamp(timestamp_ms: i64) -> GatewayResult<String> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .ok_or_else(|| GatewayError::Signing(format!("Timestamp out of range: {}", timestamp_ms)))
}

/// Base64 HMAC signer with passphrase header.
#[derive(Debug, Clone, Copy, Default)]
pub struct OkxSigner;

impl RequestSigner for OkxSigner {
    fn sign(
        &self,
        mut request: RequestDescriptor,
        credentials: &ApiCredentials,
        timestamp_ms: i64,
    ) -> GatewayResult<RequestDescriptor> {
        let passphrase = credentials.passphrase().ok_or(GatewayError::MissingCredential {
            venue: Venue::Okx,
            field: "passphrase",
        })?;

        let timestamp = iso_timestamp(timestamp_ms)?;
        let prehash = format!(
            "{}{}{}{}",
            timestamp,
            request.method,
            request.request_path(),
            request.body_str()
        );
        let signature = hmac_sha256_base64(&credentials.api_secret, &prehash)?;

        request.push_header("OK-ACCESS-KEY", credentials.api_key.clone());
        request.push_header("OK-ACCESS-SIGN", signature);
        request.push_header("OK-ACCESS-TIMESTAMP", timestamp);
        request.push_header("OK-ACCESS-PASSPHRASE", passphrase);

        Ok(request)
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// `{code, msg, data}` with per-item `sCode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OkxUnwrapper;

impl OkxUnwrapper {
    /// First item-level error in `data`, if any.
    fn item_error(data: Option<&Value>) -> Option<(String, String)> {
        data?.as_array()?.iter().find_map(|item| {
            let code = item.get("sCode").map(code_text)?;
            if code.is_empty() || code == "0" {
                return None;
            }
            let msg = item.get("sMsg").and_then(Value::as_str).unwrap_or_default();
            Some((code, msg.to_string()))
        })
    }
}

impl ResponseUnwrapper for OkxUnwrapper {
    fn unwrap_payload(&self, endpoint: &str, _status: u16, body: &str) -> GatewayResult<Value> {
        let mut value = parse_json(endpoint, body)?;

        if let Some((code, msg)) = Self::item_error(value.get("data")) {
            return Err(ERRORS.error(endpoint, code, msg));
        }

        let code = value.get("code").map(code_text).unwrap_or_default();
        if code != "0" {
            let msg = value.get("msg").and_then(Value::as_str).unwrap_or_default();
            return Err(ERRORS.error(endpoint, code, msg));
        }

        Ok(value.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }
}

// =============================================================================
// Status Vocabularies
// =============================================================================

/// Withdrawal `state` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkxWithdrawalState {
    /// -3
    Canceling,
    /// -2
    Canceled,
    /// -1
    Failed,
    /// 0
    WaitingWithdrawal,
    /// 1
    Withdrawing,
    /// 2
    Success,
    /// 7
    Approved,
    /// 10
    WaitingTransfer,
    /// 4, 5, 6, 8, 9, 11-14: held for review
    UnderReview,
    /// 15
    PendingValidation,
    /// 16
    DelayedByLocalRules,
}

impl RawStatus for OkxWithdrawalState {
    const LABEL: &'static str = "okx withdrawal";

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "-3" => Some(Self::Canceling),
            "-2" => Some(Self::Canceled),
            "-1" => Some(Self::Failed),
            "0" => Some(Self::WaitingWithdrawal),
            "1" => Some(Self::Withdrawing),
            "2" => Some(Self::Success),
            "7" => Some(Self::Approved),
            "10" => Some(Self::WaitingTransfer),
            "4" | "5" | "6" | "8" | "9" | "11" | "12" | "13" | "14" => Some(Self::UnderReview),
            "15" => Some(Self::PendingValidation),
            "16" => Some(Self::DelayedByLocalRules),
            _ => None,
        }
    }

    fn settlement(&self, entry: &HistoryEntry) -> SettlementStatus {
        match self {
            Self::Canceling
            | Self::WaitingWithdrawal
            | Self::Withdrawing
            | Self::Approved
            | Self::WaitingTransfer
            | Self::UnderReview
            | Self::PendingValidation
            | Self::DelayedByLocalRules => SettlementStatus::Pending,
            Self::Success => success(entry),
            Self::Canceled => failure(entry, "withdrawal canceled"),
            Self::Failed => failure(entry, "withdrawal failed"),
        }
    }
}

/// Deposit `state` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkxDepositState {
    /// 0
    WaitingConfirmation,
    /// 1
    Credited,
    /// 2
    Successful,
    /// 8
    TemporarilySuspended,
    /// 11
    AddressBlacklisted,
    /// 12
    AccountFrozen,
    /// 13
    SubAccountIntercepted,
    /// 14
    KycLimit,
}

impl RawStatus for OkxDepositState {
    const LABEL: &'static str = "okx deposit";

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "0" => Some(Self::WaitingConfirmation),
            "1" => Some(Self::Credited),
            "2" => Some(Self::Successful),
            "8" => Some(Self::TemporarilySuspended),
            "11" => Some(Self::AddressBlacklisted),
            "12" => Some(Self::AccountFrozen),
            "13" => Some(Self::SubAccountIntercepted),
            "14" => Some(Self::KycLimit),
            _ => None,
        }
    }

    fn settlement(&self, entry: &HistoryEntry) -> SettlementStatus {
        match self {
            Self::WaitingConfirmation | Self::TemporarilySuspended => SettlementStatus::Pending,
            Self::Credited | Self::Successful => success(entry),
            Self::AddressBlacklisted => failure(entry, "address blacklisted"),
            Self::AccountFrozen => failure(entry, "account or deposit frozen"),
            Self::SubAccountIntercepted => failure(entry, "sub-account deposit intercepted"),
            Self::KycLimit => failure(entry, "KYC limit"),
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// OKX venue adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct OkxAdapter;

impl OkxAdapter {
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        pipeline: &RequestPipeline,
        request: RequestDescriptor,
        auth: Auth,
    ) -> GatewayResult<T> {
        pipeline.execute(request, &OkxSigner, &OkxUnwrapper, auth).await
    }
}

#[async_trait]
impl VenueAdapter for OkxAdapter {
    fn venue(&self) -> Venue {
        Venue::Okx
    }

    async fn balance(&self, pipeline: &RequestPipeline, currency: &str) -> GatewayResult<Balance> {
        let rows: Vec<BalanceRow> = self
            .call(pipeline, RequestDescriptor::get(BALANCES).param("ccy", currency), Auth::Signed)
            .await?;

        Ok(rows
            .into_iter()
            .find(|r| r.ccy.eq_ignore_ascii_case(currency))
            .map(|r| Balance {
                free: parse_decimal_opt(r.avail_bal.as_deref()).unwrap_or_default(),
                locked: parse_decimal_opt(r.frozen_bal.as_deref()).unwrap_or_default(),
                currency: r.ccy,
            })
            .unwrap_or_else(|| Balance::empty(currency)))
    }

    async fn submit_withdrawal(
        &self,
        pipeline: &RequestPipeline,
        request: &WithdrawalRequest,
        amount: Decimal,
    ) -> GatewayResult<String> {
        // Memo chains take the tag appended to the address
        let to_addr = match &request.address_tag {
            Some(tag) => format!("{}:{}", request.address, tag),
            None => request.address.clone(),
        };
        let body = WithdrawalBody {
            ccy: &request.currency,
            amt: to_wire(amount),
            dest: ON_CHAIN,
            to_addr,
            chain: &request.network,
        };

        let acks: Vec<WithdrawalAck> = self
            .call(pipeline, RequestDescriptor::post(WITHDRAWAL).json(&body)?, Auth::Signed)
            .await?;

        acks.into_iter().next().map(|a| a.wd_id).ok_or_else(|| {
            GatewayError::Deserialization {
                endpoint: format!("POST {}", WITHDRAWAL),
                message: "empty data in withdrawal response".to_string(),
                raw_body: String::new(),
            }
        })
    }

    async fn withdrawal_history(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        id: &str,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        let descriptor = RequestDescriptor::get(WITHDRAWAL_HISTORY)
            .param("ccy", currency)
            .param("wdId", id);

        let rows: Vec<WithdrawalRow> = self.call(pipeline, descriptor, Auth::Signed).await?;
        Ok(rows
            .into_iter()
            .map(|row| HistoryEntry {
                id: row.wd_id,
                tx_hash: non_empty(row.tx_id),
                status: row.state,
                amount: parse_decimal_opt(row.amt.as_deref()),
            })
            .collect())
    }

    fn classify_withdrawal(&self, entry: &HistoryEntry) -> SettlementStatus {
        classify::<OkxWithdrawalState>(Venue::Okx, entry)
    }

    async fn deposit_history(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        let rows: Vec<DepositRow> = self
            .call(pipeline, RequestDescriptor::get(DEPOSIT_HISTORY).param("ccy", currency), Auth::Signed)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| HistoryEntry {
                id: row.dep_id,
                tx_hash: non_empty(row.tx_id),
                status: row.state,
                amount: parse_decimal_opt(row.amt.as_deref()),
            })
            .collect())
    }

    fn classify_deposit(&self, entry: &HistoryEntry) -> SettlementStatus {
        classify::<OkxDepositState>(Venue::Okx, entry)
    }

    async fn deposit_address(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<DepositAddress> {
        let rows: Vec<DepositAddressRow> = self
            .call(pipeline, RequestDescriptor::get(DEPOSIT_ADDRESS).param("ccy", currency), Auth::Signed)
            .await?;

        let endpoint = format!("GET {}", DEPOSIT_ADDRESS);
        let row = rows
            .into_iter()
            .find(|r| r.chain.eq_ignore_ascii_case(network))
            .ok_or_else(|| not_found(Venue::Okx, &endpoint, format!("no {} address on {}", currency, network)))?;

        Ok(DepositAddress {
            currency: row.ccy,
            network: row.chain,
            address: row.addr,
            tag: non_empty(row.tag).or_else(|| non_empty(row.memo)),
        })
    }

    async fn withdrawal_terms(
        &self,
        pipeline: &RequestPipeline,
        currency: &str,
        network: &str,
    ) -> GatewayResult<WithdrawalTerms> {
        let rows: Vec<CurrencyRow> = self
            .call(pipeline, RequestDescriptor::get(CURRENCIES).param("ccy", currency), Auth::Signed)
            .await?;

        let endpoint = format!("GET {}", CURRENCIES);
        let row = rows
            .into_iter()
            .find(|r| r.ccy.eq_ignore_ascii_case(currency) && r.chain.eq_ignore_ascii_case(network))
            .ok_or_else(|| not_found(Venue::Okx, &endpoint, format!("no {} chain {}", currency, network)))?;

        let digits: u32 = row.wd_tick_sz.trim().parse().map_err(|_| GatewayError::Deserialization {
            endpoint: endpoint.clone(),
            message: "field `wdTickSz` is not an integer".to_string(),
            raw_body: row.wd_tick_sz.clone(),
        })?;

        Ok(WithdrawalTerms {
            step: precision_step(&endpoint, "wdTickSz", digits)?,
            min_amount: parse_decimal(&endpoint, "minWd", &row.min_wd)?,
            fee: parse_decimal_opt(row.min_fee.as_deref()).unwrap_or_default(),
        })
    }

    async fn lot_step(&self, pipeline: &RequestPipeline, symbol: &Symbol) -> GatewayResult<StepSize> {
        let inst_id = symbol.joined("-");
        let descriptor = RequestDescriptor::get(INSTRUMENTS)
            .param("instType", "SPOT")
            .param("instId", inst_id.as_str());
        let endpoint = format!("GET {}", INSTRUMENTS);

        let rows: Vec<InstrumentRow> = self.call(pipeline, descriptor, Auth::Public).await?;
        let row = rows
            .into_iter()
            .find(|r| r.inst_id == inst_id)
            .ok_or_else(|| not_found(Venue::Okx, &endpoint, format!("unknown instrument {}", inst_id)))?;

        Ok(StepSize::new(parse_decimal(&endpoint, "lotSz", &row.lot_sz)?)?)
    }

    async fn market_order(
        &self,
        pipeline: &RequestPipeline,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
    ) -> GatewayResult<OrderAck> {
        let client_id = Uuid::now_v7().simple().to_string();
        let body = OrderBody {
            inst_id: symbol.joined("-"),
            td_mode: "cash",
            side: match side {
                OrderSide::Buy => "buy",
                OrderSide::Sell => "sell",
            },
            ord_type: "market",
            sz: to_wire(quantity),
            tgt_ccy: "base_ccy",
            cl_ord_id: &client_id,
        };

        let acks: Vec<OrderAckRow> = self
            .call(pipeline, RequestDescriptor::post(ORDER).json(&body)?, Auth::Signed)
            .await?;

        let ack = acks.into_iter().next().ok_or_else(|| GatewayError::Deserialization {
            endpoint: format!("POST {}", ORDER),
            message: "empty data in order response".to_string(),
            raw_body: String::new(),
        })?;

        Ok(OrderAck {
            order_id: ack.ord_id,
            quantity,
        })
    }
}

// =============================================================================
// OKX Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalBody<'a> {
    ccy: &'a str,
    amt: String,
    dest: &'static str,
    to_addr: String,
    chain: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderBody<'a> {
    inst_id: String,
    td_mode: &'static str,
    side: &'static str,
    ord_type: &'static str,
    sz: String,
    tgt_ccy: &'static str,
    cl_ord_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceRow {
    ccy: String,
    #[serde(default)]
    avail_bal: Option<String>,
    #[serde(default)]
    frozen_bal: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalAck {
    wd_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalRow {
    wd_id: String,
    #[serde(default)]
    tx_id: Option<String>,
    state: String,
    #[serde(default)]
    amt: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositRow {
    dep_id: String,
    #[serde(default)]
    tx_id: Option<String>,
    state: String,
    #[serde(default)]
    amt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepositAddressRow {
    ccy: String,
    chain: String,
    addr: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    memo: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrencyRow {
    ccy: String,
    chain: String,
    min_wd: String,
    wd_tick_sz: String,
    #[serde(default, alias = "fee")]
    min_fee: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentRow {
    inst_id: String,
    lot_sz: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAckRow {
    ord_id: String,
}

// =============================================================================
// Tests
// =============================================================================
