//! Gateway Exchange Connectors
//!
//! Venue adapters for centralized exchange REST APIs, the production
//! transport, configuration and the venue-agnostic [`GatewayClient`].
//!
//! # Venues
//!
//! | Venue | Module | Withdrawals |
//! |---|---|---|
//! | Binance, Commex | [`binance`] | yes |
//! | Bybit | [`bybit`] | yes |
//! | OKX | [`okx`] | yes |
//! | KuCoin | [`kucoin`] | yes |
//! | Gate.io | [`gateio`] | no |
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway_connectors::{GatewayClient, GatewayConfig};
//!
//! let mut config = GatewayConfig::from_env()?;
//! for settings in std::mem::take(&mut config.venues) {
//!     let client = GatewayClient::from_config(settings, &config);
//!     client.check_account().await?;
//! }
//! ```

#![warn(clippy::all)]

pub mod adapter;
pub mod binance;
pub mod bybit;
pub mod client;
pub mod config;
pub mod gateio;
pub mod kucoin;
pub mod okx;
pub mod transport;

// Re-exports
pub use adapter::VenueAdapter;
pub use binance::BinanceAdapter;
pub use bybit::BybitAdapter;
pub use client::{adapter_for, GatewayClient, MAX_ORDER_ATTEMPTS};
pub use config::{GatewayConfig, PollingConfig, VenueSettings};
pub use gateio::GateIoAdapter;
pub use kucoin::{KucoinAdapter, KucoinKeyVersion};
pub use okx::OkxAdapter;
pub use transport::ReqwestTransport;
