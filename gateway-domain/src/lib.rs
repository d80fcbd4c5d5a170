//! Gateway Domain Layer
//!
//! Pure domain types with zero I/O dependencies: venue credentials,
//! settlement vocabulary, and the quantity normalizer.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod credentials;
pub mod entities;
pub mod quantity;
pub mod settlement;
pub mod value_objects;

// Re-export commonly used types
pub use credentials::{ApiCredentials, Venue};
pub use entities::{Balance, DepositAddress, OrderAck, WithdrawalTerms};
pub use quantity::{flatten, to_wire, StepSize};
pub use settlement::{
    DepositRecord, HistoryEntry, SettlementDirection, SettlementStatus, WithdrawalRecord,
    WithdrawalRequest,
};
pub use value_objects::{DomainError, OrderSide, Symbol};
