//! Value Objects for the Gateway Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Quantity must be non-negative and expressible on the step grid
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Step size is not a power of ten (e.g. 0.5, 0.25)
    #[error("Non-decimal step size: {0}")]
    NonDecimalStepSize(String),

    /// More decimal places than a `Decimal` can hold
    #[error("Precision out of range: {0} digits (max {})", crate::quantity::MAX_PRECISION)]
    PrecisionOutOfRange(u32),

    /// Symbol must be valid trading pair
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Venue name not recognised
    #[error("Unknown venue: {0}")]
    UnknownVenue(String),
}

// =============================================================================
// Symbol
// =============================================================================

/// Symbol represents a trading pair (e.g., BTC/USDT)
///
/// Venues disagree on how a pair is written (`BTCUSDT`, `BTC-USDT`,
/// `BTC_USDT`), so the symbol keeps base and quote apart and each venue
/// joins them with its own separator.
///
/// # Invariants
/// - Base and quote must be non-empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Create a Symbol from explicit base and quote
    ///
    /// # Examples
    /// ```
    /// # use gateway_domain::value_objects::Symbol;
    /// let symbol = Symbol::new("btc", "usdt").unwrap();
    /// assert_eq!(symbol.joined("-"), "BTC-USDT");
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSymbol` if base or quote is empty
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Result<Self, DomainError> {
        let base = base.into().trim().to_uppercase();
        let quote = quote.into().trim().to_uppercase();
        if base.is_empty() || quote.is_empty() {
            return Err(DomainError::InvalidSymbol("Base and quote must be non-empty".to_string()));
        }
        Ok(Self { base, quote })
    }

    /// Parse a pair written with a separator (`BTC/USDT`, `BTC-USDT`, `BTC_USDT`)
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSymbol` if no separator is found
    pub fn parse(pair: &str) -> Result<Self, DomainError> {
        pair.split_once(['/', '-', '_'])
            .ok_or_else(|| DomainError::InvalidSymbol(format!("Cannot parse trading pair: {}", pair)))
            .and_then(|(base, quote)| Self::new(base, quote))
    }

    /// Get the base currency
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Get the quote currency
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Join base and quote with a venue-specific separator
    pub fn joined(&self, separator: &str) -> String {
        format!("{}{}{}", self.base, separator, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

// =============================================================================
// OrderSide
// =============================================================================

/// OrderSide represents the order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
