#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Realtime Price Feed - Authenticated market price stream client
//!
//! Maintains one authenticated WebSocket connection to a market-data server,
//! subscribes to the user's portfolio/watchlist price stream, and keeps a
//! merged table of the latest price per symbol. Reconnects with capped
//! exponential backoff and reacts to access token changes.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure feed logic and data types
//!   - `credential`: Access token and credential snapshot
//!   - `feed`: Connection state machine, outbound queue, backoff policy
//!   - `prices`: Symbols, price table and frame decoding
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport connector and price observer interfaces
//!   - `services`: Async feed driver and its handle
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `websocket`: `tokio-tungstenite` transport with heartbeat
//!   - `rest`: Stock REST API client
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! credential watch ──┐
//!                    ▼
//! FeedHandle ──► feed actor ──► FeedMachine ──► effects ──► WebSocket
//!    ▲               │                                         │
//!    └── status ◄────┴──── PriceObserver ◄── price frames ◄────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core feed types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::credential::{AccessToken, Credential, CredentialError};
pub use domain::feed::{ConnectionState, OutboundMessage, ReconnectConfig};
pub use domain::prices::{PriceQuote, PriceTable, PriceUpdate, Symbol};

// Ports and services
pub use application::ports::{
    NoopObserver, PriceObserver, TransportCommand, TransportConnector, TransportError,
    TransportLink, TransportSignal,
};
pub use application::services::{FeedError, FeedHandle, FeedOptions, FeedStatus, RealtimePriceFeed};

// Infrastructure
pub use infrastructure::config::{ConfigError, FeedConfig, WebSocketSettings};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::rest::{ApiError, StockApiClient};
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
pub use infrastructure::websocket::{HeartbeatConfig, WebSocketConnector};
