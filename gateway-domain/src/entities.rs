//! Typed results of the caller-facing gateway operations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::quantity::StepSize;

/// Spendable and reserved amounts of one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Currency code
    pub currency: String,
    /// Available for trading / withdrawal
    pub free: Decimal,
    /// Held by open orders or pending withdrawals
    pub locked: Decimal,
}

impl Balance {
    /// Zero balance for a currency the venue did not list.
    pub fn empty(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            free: Decimal::ZERO,
            locked: Decimal::ZERO,
        }
    }

    /// Free plus locked.
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// Where to send funds so they land on the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositAddress {
    /// Currency code
    pub currency: String,
    /// Network / chain name
    pub network: String,
    /// Address on that network
    pub address: String,
    /// Memo / tag, if the chain needs one
    pub tag: Option<String>,
}

/// Limits a venue applies to withdrawals of one currency on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalTerms {
    /// Amount grid
    pub step: StepSize,
    /// Smallest amount accepted
    pub min_amount: Decimal,
    /// Flat fee charged by the venue
    pub fee: Decimal,
}

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Venue-assigned order id
    pub order_id: String,
    /// Quantity submitted (after flattening)
    pub quantity: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_total() {
        let balance = Balance {
            currency: "BTC".into(),
            free: dec!(0.5),
            locked: dec!(0.25),
        };
        assert_eq!(balance.total(), dec!(0.75));
        assert_eq!(Balance::empty("ETH").total(), Decimal::ZERO);
    }
}
