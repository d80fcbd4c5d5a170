//! Gateway Execution Layer
//!
//! Venue-agnostic machinery shared by every exchange connector.
//!
//! # Architecture
//!
//! ```text
//! RequestDescriptor → RequestSigner → Transport → ResponseUnwrapper → T
//!                                                       ↓
//!                         SettlementPoller (history polls until terminal)
//! ```
//!
//! # Components
//!
//! - **Ports**: `Transport` and `Clock`, the two external collaborators
//! - **Signing**: `RequestSigner` / `ResponseUnwrapper` capability traits,
//!   static error tables and hash primitives
//! - **Pipeline**: sign → send → unwrap → deserialize, with error normalization
//! - **Settlement**: cancellable polling of withdrawal/deposit history
//! - **Events**: broadcast bus for lifecycle notifications
//! - **Stub**: scripted transport and manual clock for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway_exec::{Auth, RequestDescriptor, RequestPipeline, SystemClock};
//! use std::sync::Arc;
//!
//! let pipeline = RequestPipeline::new(venue, base_url, credentials, transport, Arc::new(SystemClock));
//! let balances: Vec<RawBalance> = pipeline
//!     .execute(RequestDescriptor::get("/api/v5/asset/balances"), &signer, &unwrapper, Auth::Signed)
//!     .await?;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod pipeline;
pub mod ports;
pub mod request;
pub mod settlement;
pub mod signing;
pub mod stub;

// Re-exports for convenience
pub use error::{GatewayError, GatewayResult, VenueErrorKind};
pub use events::{EventBus, EventReceiver, GatewayEvent};
pub use pipeline::RequestPipeline;
pub use ports::{
    Clock, HttpMethod, HttpRequest, HttpResponse, SystemClock, Transport, TransportError,
};
pub use request::{Auth, RequestBody, RequestDescriptor};
pub use settlement::{PollPolicy, SettlementOutcome, SettlementPoller, DEFAULT_MAX_ATTEMPTS};
pub use signing::{ErrorTable, RequestSigner, ResponseUnwrapper, DEFAULT_RECV_WINDOW_MS};
pub use stub::{ManualClock, StubTransport};
