//! Realtime Price Feed Service
//!
//! Async driver around [`FeedMachine`]. A single tokio task (the actor) owns
//! the machine and serializes every input through one `select!` loop:
//!
//! - caller commands (`send`, `stop`) from [`FeedHandle`]
//! - credential changes from the `watch` channel
//! - transport opens, frames, errors and closes, tagged with their generation
//! - the reconnect timer
//!
//! Effects returned by the machine are executed in order. Transport I/O runs
//! in per-connection tasks and never blocks the actor.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    PriceObserver, TransportCommand, TransportConnector, TransportLink, TransportSignal,
};
use crate::domain::credential::{AccessToken, Credential};
use crate::domain::feed::{
    ABNORMAL_CLOSURE, ConnectionState, FeedEffect, FeedEvent, FeedMachine, Generation,
    OutboundMessage, ReconnectConfig, TimerId,
};
use crate::domain::prices::PriceTable;
use crate::infrastructure::metrics;

/// Default bound of the outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by [`FeedHandle`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The feed has been stopped and accepts no more commands.
    #[error("price feed is stopped")]
    Stopped,
}

// =============================================================================
// Options
// =============================================================================

/// Tuning for a feed instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedOptions {
    /// Backoff policy for abnormal closures.
    pub reconnect: ReconnectConfig,
    /// Outbound queue bound (0 = unbounded).
    pub queue_capacity: usize,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// =============================================================================
// Read View
// =============================================================================

/// Read-only view of the feed, written only by the actor.
#[derive(Debug, Clone, Default)]
pub struct FeedStatus {
    /// Current connection state.
    pub state: ConnectionState,
    /// Latest prices.
    pub prices: PriceTable,
    /// Last recorded error.
    pub last_error: Option<String>,
    /// Messages waiting for the transport.
    pub queued: usize,
    /// Abnormal closures since the last successful open.
    pub reconnect_attempts: u32,
    /// Time of the last successful open.
    pub last_connected_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Handle
// =============================================================================

enum FeedCommand {
    Send(OutboundMessage),
    Stop,
}

/// Owner handle of a running feed.
///
/// Dropping the handle stops the feed.
#[derive(Debug)]
pub struct FeedHandle {
    commands: mpsc::UnboundedSender<FeedCommand>,
    status: Arc<RwLock<FeedStatus>>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for FeedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send(message) => f.debug_tuple("Send").field(message).finish(),
            Self::Stop => f.write_str("Stop"),
        }
    }
}

impl FeedHandle {
    /// Send a message, or queue it until the transport is ready.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Stopped`] if the feed is no longer running.
    pub fn send(&self, message: impl Into<OutboundMessage>) -> Result<(), FeedError> {
        self.commands
            .send(FeedCommand::Send(message.into()))
            .map_err(|_| FeedError::Stopped)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.read().state
    }

    /// Snapshot of the price table.
    #[must_use]
    pub fn prices(&self) -> PriceTable {
        self.status.read().prices.clone()
    }

    /// Last recorded error.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.status.read().last_error.clone()
    }

    /// Full status snapshot.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        self.status.read().clone()
    }

    /// Whether the actor task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Tear the feed down and wait for the actor to exit.
    ///
    /// Sends a best-effort unsubscribe, closes the transport normally and
    /// cancels any pending reconnect.
    pub async fn stop(self) {
        let _ = self.commands.send(FeedCommand::Stop);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Price feed task ended abnormally");
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// Realtime price feed client.
///
/// Construct with a transport connector, then [`start`](Self::start) it with
/// a credential source and an observer.
pub struct RealtimePriceFeed {
    connector: Arc<dyn TransportConnector>,
    options: FeedOptions,
    shutdown: CancellationToken,
}

impl RealtimePriceFeed {
    /// Create a feed client with default options.
    #[must_use]
    pub fn new(connector: Arc<dyn TransportConnector>) -> Self {
        Self {
            connector,
            options: FeedOptions::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Override feed options.
    #[must_use]
    pub fn with_options(mut self, options: FeedOptions) -> Self {
        self.options = options;
        self
    }

    /// Tie the feed to a host-wide shutdown token.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Spawn the feed actor. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(
        self,
        credentials: watch::Receiver<Credential>,
        observer: Arc<dyn PriceObserver>,
    ) -> FeedHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(FeedStatus::default()));

        let actor = FeedActor {
            machine: FeedMachine::new(self.options.reconnect, self.options.queue_capacity),
            connector: self.connector,
            observer,
            status: Arc::clone(&status),
            credentials,
            credentials_open: true,
            commands: command_rx,
            inbox_tx,
            inbox: inbox_rx,
            opening: HashMap::new(),
            links: HashMap::new(),
            timer: None,
            shutdown: self.shutdown,
        };

        let task = tokio::spawn(actor.run());

        FeedHandle {
            commands: command_tx,
            status,
            task,
        }
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Messages from transport tasks to the actor.
enum Inbox {
    Opened {
        generation: Generation,
        link: TransportLink,
    },
    Event(FeedEvent),
}

type ArmedTimer = (TimerId, Pin<Box<Sleep>>);

struct FeedActor {
    machine: FeedMachine,
    connector: Arc<dyn TransportConnector>,
    observer: Arc<dyn PriceObserver>,
    status: Arc<RwLock<FeedStatus>>,
    credentials: watch::Receiver<Credential>,
    credentials_open: bool,
    commands: mpsc::UnboundedReceiver<FeedCommand>,
    inbox_tx: mpsc::UnboundedSender<Inbox>,
    inbox: mpsc::UnboundedReceiver<Inbox>,
    opening: HashMap<Generation, CancellationToken>,
    links: HashMap<Generation, mpsc::UnboundedSender<TransportCommand>>,
    timer: Option<ArmedTimer>,
    shutdown: CancellationToken,
}

async fn wait_timer(timer: &mut Option<ArmedTimer>) -> TimerId {
    match timer {
        Some((id, sleep)) => {
            sleep.as_mut().await;
            *id
        }
        None => std::future::pending().await,
    }
}

impl FeedActor {
    async fn run(mut self) {
        tracing::debug!("Price feed actor started");

        let initial = self.credentials.borrow_and_update().clone();
        self.dispatch(FeedEvent::CredentialChanged(initial));

        while !self.machine.is_stopped() {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    tracing::info!("Price feed cancelled");
                    self.dispatch(FeedEvent::Stop);
                }
                command = self.commands.recv() => match command {
                    Some(FeedCommand::Send(message)) => self.dispatch(FeedEvent::Send(message)),
                    Some(FeedCommand::Stop) | None => self.dispatch(FeedEvent::Stop),
                },
                changed = self.credentials.changed(), if self.credentials_open => {
                    if changed.is_ok() {
                        let credential = self.credentials.borrow_and_update().clone();
                        self.dispatch(FeedEvent::CredentialChanged(credential));
                    } else {
                        tracing::debug!("Credential source closed, keeping last credential");
                        self.credentials_open = false;
                    }
                }
                Some(message) = self.inbox.recv() => match message {
                    Inbox::Opened { generation, link } => self.on_opened(generation, link),
                    Inbox::Event(event) => self.dispatch(event),
                },
                timer = wait_timer(&mut self.timer) => {
                    self.timer = None;
                    self.dispatch(FeedEvent::ReconnectTimerFired { timer });
                }
            }
        }

        for (_, cancel) in self.opening.drain() {
            cancel.cancel();
        }
        self.links.clear();
        tracing::info!("Price feed stopped");
    }

    fn on_opened(&mut self, generation: Generation, link: TransportLink) {
        if self.opening.remove(&generation).is_none() {
            tracing::debug!(generation, "Closing transport opened after cancellation");
            let _ = link.commands.send(TransportCommand::Close {
                code: crate::domain::feed::NORMAL_CLOSURE,
                reason: "Superseded".to_string(),
            });
            return;
        }

        let TransportLink { commands, signals } = link;
        self.links.insert(generation, commands);
        tokio::spawn(forward_signals(generation, signals, self.inbox_tx.clone()));

        self.dispatch(FeedEvent::TransportOpened { generation });
    }

    fn dispatch(&mut self, event: FeedEvent) {
        match &event {
            FeedEvent::FrameReceived { .. } => metrics::record_frame_received(),
            FeedEvent::TransportClosed { generation, .. } => {
                // The transport is gone whether or not the machine still tracks it.
                self.opening.remove(generation);
                self.links.remove(generation);
            }
            _ => {}
        }

        let effects = self.machine.handle(event);
        for effect in effects {
            self.execute(effect);
        }
        self.sync_status();
    }

    fn execute(&mut self, effect: FeedEffect) {
        match effect {
            FeedEffect::OpenTransport { generation, token } => self.open(generation, token),
            FeedEffect::SendFrame {
                generation,
                message,
            } => self.send_frame(generation, &message),
            FeedEffect::CloseTransport {
                generation,
                code,
                reason,
            } => self.close(generation, code, reason),
            FeedEffect::ScheduleReconnect {
                timer,
                delay,
                attempt,
            } => {
                metrics::record_reconnect_scheduled(attempt);
                self.timer = Some((timer, Box::pin(tokio::time::sleep(delay))));
            }
            FeedEffect::CancelReconnect => {
                self.timer = None;
            }
            FeedEffect::StateChanged(state) => {
                metrics::set_connection_state(state);
                if state == ConnectionState::Connected {
                    self.status.write().last_connected_at = Some(Utc::now());
                }
                self.observer.on_state(state);
            }
            FeedEffect::PricesUpdated { applied } => {
                metrics::record_price_updates(applied);
                let prices = self.machine.prices();
                self.status.write().prices.clone_from(prices);
                self.observer.on_prices(prices);
            }
            FeedEffect::ErrorRaised(error) => {
                metrics::record_transport_error();
                self.observer.on_error(&error);
            }
            FeedEffect::ReconnectAbandoned(error) => {
                metrics::record_reconnect_abandoned();
                self.observer.on_error(&error);
            }
            FeedEffect::FrameDropped(_) => {
                metrics::record_frame_dropped();
            }
            FeedEffect::RecordsSkipped { count } => {
                metrics::record_records_skipped(count);
            }
            FeedEffect::MessageQueued { depth } => {
                metrics::record_message_queued();
                tracing::trace!(depth, "Outbound queue depth");
            }
            FeedEffect::MessageEvicted(_) => {
                metrics::record_queue_eviction();
            }
        }
    }

    fn open(&mut self, generation: Generation, token: AccessToken) {
        let cancel = self.shutdown.child_token();
        self.opening.insert(generation, cancel.clone());

        let connector = Arc::clone(&self.connector);
        let inbox = self.inbox_tx.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                () = cancel.cancelled() => return,
                result = connector.open(&token) => result,
            };

            match result {
                Ok(link) => {
                    let _ = inbox.send(Inbox::Opened { generation, link });
                }
                Err(e) => {
                    let message = e.to_string();
                    let _ = inbox.send(Inbox::Event(FeedEvent::TransportError {
                        generation,
                        message: message.clone(),
                    }));
                    let _ = inbox.send(Inbox::Event(FeedEvent::TransportClosed {
                        generation,
                        code: ABNORMAL_CLOSURE,
                        reason: message,
                    }));
                }
            }
        });
    }

    fn send_frame(&self, generation: Generation, message: &OutboundMessage) {
        let Some(link) = self.links.get(&generation) else {
            tracing::debug!(generation, "No open transport for frame, dropping");
            return;
        };

        let json = message.to_json();
        if link.send(TransportCommand::Text(json)).is_ok() {
            metrics::record_message_sent();
            tracing::debug!(generation, message = %message.to_json(), "Sent message");
        } else {
            tracing::debug!(generation, "Transport already closed, message not sent");
        }
    }

    fn close(&mut self, generation: Generation, code: u16, reason: &str) {
        if let Some(cancel) = self.opening.remove(&generation) {
            cancel.cancel();
        }
        if let Some(link) = self.links.remove(&generation) {
            let _ = link.send(TransportCommand::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }

    fn sync_status(&self) {
        let mut status = self.status.write();
        status.state = self.machine.state();
        status.last_error = self.machine.last_error().map(str::to_string);
        status.queued = self.machine.queued();
        status.reconnect_attempts = self.machine.attempt_count();
        metrics::set_queue_depth(status.queued);
    }
}

/// Forward transport signals into the actor inbox until the link closes.
async fn forward_signals(
    generation: Generation,
    mut signals: mpsc::UnboundedReceiver<TransportSignal>,
    inbox: mpsc::UnboundedSender<Inbox>,
) {
    while let Some(signal) = signals.recv().await {
        let (event, done) = match signal {
            TransportSignal::Message(text) => (FeedEvent::FrameReceived { generation, text }, false),
            TransportSignal::Error(message) => (
                FeedEvent::TransportError {
                    generation,
                    message,
                },
                false,
            ),
            TransportSignal::Closed { code, reason } => (
                FeedEvent::TransportClosed {
                    generation,
                    code,
                    reason,
                },
                true,
            ),
        };

        if inbox.send(Inbox::Event(event)).is_err() || done {
            return;
        }
    }

    // Signal channel dropped without a close notification.
    let _ = inbox.send(Inbox::Event(FeedEvent::TransportClosed {
        generation,
        code: ABNORMAL_CLOSURE,
        reason: "transport dropped".to_string(),
    }));
}
