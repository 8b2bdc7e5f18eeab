//! Shared fixtures for feed integration tests.
//!
//! `FakeConnector` stands in for the WebSocket transport. Every open attempt
//! is recorded; successful opens hand the test a `FakeTransport` that can
//! push server signals and read what the feed sent.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use realtime_price_feed::{
    AccessToken, ConnectionState, Credential, FeedHandle, FeedOptions, PriceObserver, PriceTable,
    RealtimePriceFeed, TransportCommand, TransportConnector, TransportError, TransportLink,
    TransportSignal,
};

/// Upper bound for waiting on an expected event. Virtual when the clock is
/// paused.
pub const WAIT: Duration = Duration::from_secs(120);

// =============================================================================
// Fake Transport
// =============================================================================

/// One open attempt seen by the connector.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub token: String,
    pub at: Instant,
    pub succeeded: bool,
}

/// Server side of one fake connection.
pub struct FakeTransport {
    pub token: String,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
    signals: mpsc::UnboundedSender<TransportSignal>,
}

impl FakeTransport {
    /// Push a text frame to the feed.
    pub fn push(&self, text: &str) {
        let _ = self.signals.send(TransportSignal::Message(text.to_string()));
    }

    /// Report a transport error.
    pub fn error(&self, message: &str) {
        let _ = self.signals.send(TransportSignal::Error(message.to_string()));
    }

    /// Close from the server side.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.signals.send(TransportSignal::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next command the feed sent on this connection.
    pub async fn next_command(&mut self) -> Option<TransportCommand> {
        tokio::time::timeout(WAIT, self.commands.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next command, which must be a text frame parsed as JSON.
    pub async fn next_json(&mut self) -> serde_json::Value {
        match self.next_command().await {
            Some(TransportCommand::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    /// Commands already sent, without waiting.
    pub fn drain_commands(&mut self) -> Vec<TransportCommand> {
        let mut out = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            out.push(command);
        }
        out
    }
}

/// Connector that never touches the network.
pub struct FakeConnector {
    attempts: Mutex<Vec<Attempt>>,
    fail_next: AtomicUsize,
    opened: mpsc::UnboundedSender<FakeTransport>,
}

impl FakeConnector {
    /// Create a connector plus the receiver of its successful connections.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeTransport>) {
        let (opened, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
            opened,
        });
        (connector, rx)
    }

    /// Make the next `count` open attempts fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Every open attempt so far.
    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl TransportConnector for FakeConnector {
    async fn open(&self, token: &AccessToken) -> Result<TransportLink, TransportError> {
        let fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        self.attempts.lock().push(Attempt {
            token: token.expose().to_string(),
            at: Instant::now(),
            succeeded: !fail,
        });

        if fail {
            return Err(TransportError::ConnectionFailed("connection refused".into()));
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let _ = self.opened.send(FakeTransport {
            token: token.expose().to_string(),
            commands: command_rx,
            signals: signal_tx,
        });

        Ok(TransportLink::new(command_tx, signal_rx))
    }
}

/// Wait for the next successful connection.
pub async fn next_transport(rx: &mut mpsc::UnboundedReceiver<FakeTransport>) -> FakeTransport {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

// =============================================================================
// Recording Observer
// =============================================================================

/// Everything an observer was told.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Prices(PriceTable),
    State(ConnectionState),
    Error(String),
}

/// Observer that forwards every callback to a channel.
pub struct RecordingObserver {
    tx: mpsc::UnboundedSender<Observed>,
}

impl RecordingObserver {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Observed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl PriceObserver for RecordingObserver {
    fn on_prices(&self, prices: &PriceTable) {
        let _ = self.tx.send(Observed::Prices(prices.clone()));
    }

    fn on_state(&self, state: ConnectionState) {
        let _ = self.tx.send(Observed::State(state));
    }

    fn on_error(&self, error: &str) {
        let _ = self.tx.send(Observed::Error(error.to_string()));
    }
}

/// Wait until the observer reports `state`.
pub async fn wait_for_state(rx: &mut mpsc::UnboundedReceiver<Observed>, state: ConnectionState) {
    tokio::time::timeout(WAIT, async {
        while let Some(observed) = rx.recv().await {
            if observed == Observed::State(state) {
                return;
            }
        }
        panic!("observer channel closed");
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {state}"));
}

/// Wait until the observer reports a price table and return it.
pub async fn wait_for_prices(rx: &mut mpsc::UnboundedReceiver<Observed>) -> PriceTable {
    tokio::time::timeout(WAIT, async {
        while let Some(observed) = rx.recv().await {
            if let Observed::Prices(table) = observed {
                return table;
            }
        }
        panic!("observer channel closed");
    })
    .await
    .expect("timed out waiting for prices")
}

// =============================================================================
// Harness
// =============================================================================

pub fn token(value: &str) -> AccessToken {
    AccessToken::new(value).unwrap()
}

/// A started feed wired to fakes.
pub struct Harness {
    pub handle: FeedHandle,
    pub connector: Arc<FakeConnector>,
    pub transports: mpsc::UnboundedReceiver<FakeTransport>,
    pub observed: mpsc::UnboundedReceiver<Observed>,
    pub credentials: watch::Sender<Credential>,
}

impl Harness {
    pub fn start(initial: Credential) -> Self {
        Self::start_with(initial, FeedOptions::default())
    }

    pub fn start_with(initial: Credential, options: FeedOptions) -> Self {
        let (connector, transports) = FakeConnector::new();
        let (observer, observed) = RecordingObserver::new();
        let (credentials, credential_rx) = watch::channel(initial);

        let handle = RealtimePriceFeed::new(connector.clone())
            .with_options(options)
            .start(credential_rx, observer);

        Self {
            handle,
            connector,
            transports,
            observed,
            credentials,
        }
    }

    /// Wait for the next connection and consume its subscribe frame.
    pub async fn connected(&mut self) -> FakeTransport {
        let mut transport = next_transport(&mut self.transports).await;
        let subscribe = transport.next_json().await;
        assert_eq!(subscribe["type"], "subscribe_portfolio_watchlist");
        transport
    }

    /// Let every ready task run. With a paused clock this advances time by
    /// one millisecond only after the runtime goes idle.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
