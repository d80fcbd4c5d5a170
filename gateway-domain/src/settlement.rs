//! Settlement types: withdrawals leaving a venue and deposits arriving.
//!
//! A settlement is only observable by polling the venue's history. Each venue
//! maps its own status vocabulary onto [`SettlementStatus`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Settlement Status
// =============================================================================

/// Venue-independent classification of a raw settlement status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
    /// Still moving; poll again
    Pending,
    /// Terminal success
    Success {
        /// On-chain transaction hash, when the venue reports one
        tx_hash: Option<String>,
    },
    /// Terminal failure
    Failure {
        /// Venue's description of the failure
        reason: String,
    },
}

impl SettlementStatus {
    /// Whether no further transition will occur.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SettlementStatus::Pending)
    }

    /// Short label for logs and events.
    pub fn label(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Success { .. } => "success",
            SettlementStatus::Failure { .. } => "failure",
        }
    }
}

/// Which way the funds move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementDirection {
    /// Funds leaving the venue
    Withdrawal,
    /// Funds arriving at the venue
    Deposit,
}

impl fmt::Display for SettlementDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementDirection::Withdrawal => write!(f, "withdrawal"),
            SettlementDirection::Deposit => write!(f, "deposit"),
        }
    }
}

// =============================================================================
// History Entry
// =============================================================================

/// One row of a venue's withdrawal or deposit history, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Venue-assigned withdrawal id (withdrawals) or deposit id
    pub id: String,
    /// On-chain transaction hash, if already known
    pub tx_hash: Option<String>,
    /// Raw venue status, verbatim
    pub status: String,
    /// Amount moved, if the venue reports it
    pub amount: Option<Decimal>,
}

// =============================================================================
// Withdrawal
// =============================================================================

/// A withdrawal the caller wants to make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Currency code (e.g. "USDT")
    pub currency: String,
    /// Amount to withdraw, before flattening to the venue step
    pub amount: Decimal,
    /// Destination address
    pub address: String,
    /// Network / chain name in the venue's vocabulary
    pub network: String,
    /// Memo / tag for chains that need one
    pub address_tag: Option<String>,
}

impl WithdrawalRequest {
    /// Create a withdrawal request without an address tag.
    pub fn new(
        currency: impl Into<String>,
        amount: Decimal,
        address: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            currency: currency.into(),
            amount,
            address: address.into(),
            network: network.into(),
            address_tag: None,
        }
    }

    /// Attach a memo / tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.address_tag = Some(tag.into());
        self
    }
}

/// Final record of a submitted withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    /// Venue-assigned withdrawal id
    pub id: String,
    /// Transaction hash (only when we waited for approval)
    pub tx_hash: Option<String>,
    /// Amount actually submitted (after flattening)
    pub requested_amount: Decimal,
    /// Whether the settlement was polled to completion
    pub waited_for_approval: bool,
}

// =============================================================================
// Deposit
// =============================================================================

/// Record of a deposit confirmed as credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    /// Currency credited
    pub currency: String,
    /// Transaction hash that was watched
    pub tx_hash: String,
    /// Amount credited, if the venue reports it
    pub amount: Option<Decimal>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_terminality() {
        assert!(!SettlementStatus::Pending.is_terminal());
        assert!(SettlementStatus::Success { tx_hash: None }.is_terminal());
        assert!(SettlementStatus::Failure { reason: "rejected".into() }.is_terminal());
    }

    #[test]
    fn test_withdrawal_request_builder() {
        let req = WithdrawalRequest::new("XRP", dec!(25), "rAddr", "XRP").with_tag("12345");
        assert_eq!(req.address_tag.as_deref(), Some("12345"));
        assert_eq!(req.amount, dec!(25));
    }

    #[test]
    fn test_withdrawal_record_serialization() {
        let record = WithdrawalRecord {
            id: "W1".to_string(),
            tx_hash: Some("0xabc".to_string()),
            requested_amount: dec!(1.5),
            waited_for_approval: true,
        };

        let json = serde_json::to_string(&record).unwrap();
        let parsed: WithdrawalRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, record);
    }
}
