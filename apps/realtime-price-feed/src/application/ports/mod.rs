//! Port Interfaces
//!
//! Defines the interfaces (ports) the feed client needs from the outside
//! world, following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TransportConnector`: opens an authenticated duplex message channel
//! - `PriceObserver`: sink for price table snapshots and status changes
//!
//! ## Driver Ports (Inbound)
//!
//! - The credential source is a `tokio::sync::watch` channel of
//!   [`Credential`](crate::domain::credential::Credential) values.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::credential::AccessToken;
use crate::domain::feed::ConnectionState;
use crate::domain::prices::PriceTable;

// =============================================================================
// Transport
// =============================================================================

/// Errors raised while opening a transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Endpoint URL could not be built.
    #[error("invalid transport endpoint: {0}")]
    InvalidEndpoint(String),

    /// Connection could not be established.
    #[error("transport connection failed: {0}")]
    ConnectionFailed(String),
}

/// Command from the feed to an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Send a text frame.
    Text(String),
    /// Close the connection with a code and reason.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Signal from an open transport to the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// A text frame arrived.
    Message(String),
    /// The transport reported an error. A `Closed` signal follows.
    Error(String),
    /// The transport closed. No further signals follow.
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// An open transport: a command sender plus a signal receiver.
///
/// Dropping the command sender closes the transport.
#[derive(Debug)]
pub struct TransportLink {
    /// Commands to the transport.
    pub commands: mpsc::UnboundedSender<TransportCommand>,
    /// Signals from the transport.
    pub signals: mpsc::UnboundedReceiver<TransportSignal>,
}

impl TransportLink {
    /// Create a link from its two channel halves.
    #[must_use]
    pub const fn new(
        commands: mpsc::UnboundedSender<TransportCommand>,
        signals: mpsc::UnboundedReceiver<TransportSignal>,
    ) -> Self {
        Self { commands, signals }
    }

    /// Whether the transport side is still accepting commands.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Opens authenticated transports for the feed.
///
/// Returning `Ok` is the open acknowledgment.
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// Open a new transport authenticated with `token`.
    async fn open(&self, token: &AccessToken) -> Result<TransportLink, TransportError>;
}

// =============================================================================
// Observer
// =============================================================================

/// Sink for feed output. Called from the feed's actor task, so
/// implementations must not block.
pub trait PriceObserver: Send + Sync + 'static {
    /// The price table changed. `prices` is the full merged table.
    fn on_prices(&self, prices: &PriceTable);

    /// The connection state changed.
    fn on_state(&self, _state: ConnectionState) {}

    /// An error was recorded.
    fn on_error(&self, _error: &str) {}
}

/// Observer that ignores everything, for hosts that only poll the handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PriceObserver for NoopObserver {
    fn on_prices(&self, _prices: &PriceTable) {}
}
