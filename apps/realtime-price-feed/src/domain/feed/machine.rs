//! Feed State Machine
//!
//! Pure transition function for the realtime price feed. Every input
//! (credential change, transport signal, timer fire, caller command) is a
//! [`FeedEvent`]; [`FeedMachine::handle`] updates the owned state and returns
//! the [`FeedEffect`]s the driver must execute, in order.
//!
//! # Transitions
//!
//! ```text
//!                 credential ready
//!  Disconnected ───────────────────► Connecting
//!       ▲  ▲                              │ open ack
//!       │  │ close 1000                   ▼
//!       │  └──────────────────────── Connected ──── transport error ──► Error
//!       │                                 │                              │
//!       │ close != 1000                   │                              │
//!       └──── schedule reconnect ◄────────┴──────────────────────────────┘
//! ```
//!
//! # Generations
//!
//! Each connection attempt gets a new generation number. Transport events
//! carry the generation they belong to, and events from any generation other
//! than the live one are ignored. Reconnect timers carry their own id so a
//! stale timer firing after a newer connection was made is a no-op.

use std::time::Duration;

use crate::domain::credential::{AccessToken, Credential};
use crate::domain::prices::{PriceFrame, PriceTable, parse_frame};

use super::queue::{OutboundMessage, OutboundQueue};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::{ConnectionState, NORMAL_CLOSURE, is_normal_closure};

/// Monotonic connection attempt counter.
pub type Generation = u64;

/// Identifier of a scheduled reconnect timer.
pub type TimerId = u64;

/// Close reason used when the credential source signs out.
pub const REASON_SIGNED_OUT: &str = "Component unmount or logout";

/// Close reason used when the token rotates under a live connection.
pub const REASON_TOKEN_CHANGED: &str = "Access token changed";

/// Close reason used when the feed is stopped by its owner.
pub const REASON_STOPPED: &str = "Feed stopped";

// =============================================================================
// Events and Effects
// =============================================================================

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// The credential source published a new value.
    CredentialChanged(Credential),
    /// Transport of `generation` acknowledged the open.
    TransportOpened {
        /// Connection attempt.
        generation: Generation,
    },
    /// Text frame received on `generation`.
    FrameReceived {
        /// Connection attempt.
        generation: Generation,
        /// Raw frame text.
        text: String,
    },
    /// Transport-level error on `generation`.
    TransportError {
        /// Connection attempt.
        generation: Generation,
        /// Error description.
        message: String,
    },
    /// Transport of `generation` closed.
    TransportClosed {
        /// Connection attempt.
        generation: Generation,
        /// Close code (1000 = normal).
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// A scheduled reconnect timer fired.
    ReconnectTimerFired {
        /// Timer id from [`FeedEffect::ScheduleReconnect`].
        timer: TimerId,
    },
    /// Caller wants to send a message.
    Send(OutboundMessage),
    /// Owner is tearing the feed down.
    Stop,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEffect {
    /// Open a new transport authenticated with `token`.
    OpenTransport {
        /// Connection attempt.
        generation: Generation,
        /// Token to authenticate with.
        token: AccessToken,
    },
    /// Serialize and transmit `message` on `generation`.
    SendFrame {
        /// Connection attempt.
        generation: Generation,
        /// Message to send.
        message: OutboundMessage,
    },
    /// Close the transport of `generation`.
    CloseTransport {
        /// Connection attempt.
        generation: Generation,
        /// Close code.
        code: u16,
        /// Close reason.
        reason: &'static str,
    },
    /// Arm the reconnect timer, replacing any armed timer.
    ScheduleReconnect {
        /// Timer id to report back on fire.
        timer: TimerId,
        /// Delay before firing.
        delay: Duration,
        /// Attempt number this timer belongs to (1-based).
        attempt: u32,
    },
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Connection state changed.
    StateChanged(ConnectionState),
    /// The price table changed; `applied` records were merged.
    PricesUpdated {
        /// Records merged in this batch.
        applied: usize,
    },
    /// A transport error was recorded as the last error.
    ErrorRaised(String),
    /// Reconnect attempts are exhausted; recorded as the last error.
    ReconnectAbandoned(String),
    /// An inbound frame was discarded.
    FrameDropped(String),
    /// Records of an otherwise applied frame were skipped.
    RecordsSkipped {
        /// Number of skipped records.
        count: usize,
    },
    /// A message was queued while the transport was not ready.
    MessageQueued {
        /// Queue depth after the push.
        depth: usize,
    },
    /// The queue was full and its oldest message was evicted.
    MessageEvicted(OutboundMessage),
}

// =============================================================================
// Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LiveTransport {
    generation: Generation,
    opened: bool,
}

/// Owned state of one realtime price feed client.
#[derive(Debug)]
pub struct FeedMachine {
    state: ConnectionState,
    credential: Credential,
    active_token: Option<AccessToken>,
    generation: Generation,
    live: Option<LiveTransport>,
    pending_timer: Option<TimerId>,
    next_timer: TimerId,
    policy: ReconnectPolicy,
    queue: OutboundQueue,
    prices: PriceTable,
    last_error: Option<String>,
    stopped: bool,
}

impl FeedMachine {
    /// Create a machine in the `Disconnected` state with a loading credential.
    #[must_use]
    pub fn new(reconnect: ReconnectConfig, queue_capacity: usize) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            credential: Credential::loading(),
            active_token: None,
            generation: 0,
            live: None,
            pending_timer: None,
            next_timer: 0,
            policy: ReconnectPolicy::new(reconnect),
            queue: OutboundQueue::new(queue_capacity),
            prices: PriceTable::new(),
            last_error: None,
            stopped: false,
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Read view of the price table.
    #[must_use]
    pub const fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Last recorded error, cleared on a successful open.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Messages waiting for the transport.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Abnormal closures since the last successful open.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.policy.attempt_count()
    }

    /// Generation of the most recent connection attempt.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether a reconnect timer is armed.
    #[must_use]
    pub const fn has_pending_reconnect(&self) -> bool {
        self.pending_timer.is_some()
    }

    /// Whether outbound messages go straight to the transport.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.live, Some(LiveTransport { opened: true, .. }))
    }

    /// Whether the machine has been stopped.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Apply one event and return the effects to execute, in order.
    pub fn handle(&mut self, event: FeedEvent) -> Vec<FeedEffect> {
        let mut effects = Vec::new();

        if self.stopped {
            tracing::trace!(?event, "Feed stopped, ignoring event");
            return effects;
        }

        match event {
            FeedEvent::CredentialChanged(credential) => {
                self.on_credential(credential, &mut effects);
            }
            FeedEvent::TransportOpened { generation } => {
                self.on_opened(generation, &mut effects);
            }
            FeedEvent::FrameReceived { generation, text } => {
                self.on_frame(generation, &text, &mut effects);
            }
            FeedEvent::TransportError {
                generation,
                message,
            } => self.on_error(generation, message, &mut effects),
            FeedEvent::TransportClosed {
                generation,
                code,
                reason,
            } => self.on_closed(generation, code, &reason, &mut effects),
            FeedEvent::ReconnectTimerFired { timer } => self.on_timer(timer, &mut effects),
            FeedEvent::Send(message) => self.on_send(message, &mut effects),
            FeedEvent::Stop => {
                self.teardown(REASON_STOPPED, &mut effects);
                self.stopped = true;
            }
        }

        effects
    }

    fn is_live(&self, generation: Generation) -> bool {
        self.live.is_some_and(|live| live.generation == generation)
    }

    fn set_state(&mut self, state: ConnectionState, effects: &mut Vec<FeedEffect>) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "Feed state changed");
            self.state = state;
            effects.push(FeedEffect::StateChanged(state));
        }
    }

    fn cancel_timer(&mut self, effects: &mut Vec<FeedEffect>) {
        if self.pending_timer.take().is_some() {
            effects.push(FeedEffect::CancelReconnect);
        }
    }

    fn connect(&mut self, token: AccessToken, effects: &mut Vec<FeedEffect>) {
        self.cancel_timer(effects);

        self.generation += 1;
        let generation = self.generation;
        self.live = Some(LiveTransport {
            generation,
            opened: false,
        });
        self.active_token = Some(token.clone());

        tracing::info!(generation, "Opening price feed transport");
        self.set_state(ConnectionState::Connecting, effects);
        effects.push(FeedEffect::OpenTransport { generation, token });
    }

    /// Close the live transport (if any) with a normal closure.
    fn close_live(&mut self, reason: &'static str, effects: &mut Vec<FeedEffect>) {
        if let Some(live) = self.live.take() {
            effects.push(FeedEffect::CloseTransport {
                generation: live.generation,
                code: NORMAL_CLOSURE,
                reason,
            });
        }
    }

    fn teardown(&mut self, reason: &'static str, effects: &mut Vec<FeedEffect>) {
        self.cancel_timer(effects);

        if let Some(live) = self.live {
            if live.opened {
                effects.push(FeedEffect::SendFrame {
                    generation: live.generation,
                    message: OutboundMessage::unsubscribe_all(),
                });
            }
            tracing::info!(generation = live.generation, reason, "Closing price feed transport");
        }

        self.close_live(reason, effects);
        self.active_token = None;
        self.set_state(ConnectionState::Disconnected, effects);
    }

    fn on_credential(&mut self, credential: Credential, effects: &mut Vec<FeedEffect>) {
        self.credential = credential;

        // A loading credential is not usable yet, whatever token it carries.
        let Some(token) = self.credential.ready_token().cloned() else {
            if self.live.is_some() || self.pending_timer.is_some() {
                tracing::info!(
                    loading = self.credential.is_loading,
                    "No usable access token, disconnecting feed"
                );
            }
            self.teardown(REASON_SIGNED_OUT, effects);
            return;
        };

        let same_token = self.active_token.as_ref() == Some(&token);

        if self.live.is_some() {
            if same_token {
                return;
            }
            tracing::info!("Reconnecting price feed due to access token change");
            self.close_live(REASON_TOKEN_CHANGED, effects);
            self.set_state(ConnectionState::Disconnected, effects);
            self.connect(token, effects);
            return;
        }

        if same_token && self.pending_timer.is_some() {
            // Backoff already in progress for this token.
            return;
        }

        self.connect(token, effects);
    }

    fn on_opened(&mut self, generation: Generation, effects: &mut Vec<FeedEffect>) {
        if !self.is_live(generation) {
            tracing::debug!(generation, "Ignoring open from stale transport");
            return;
        }

        self.live = Some(LiveTransport {
            generation,
            opened: true,
        });
        self.policy.reset();
        self.last_error = None;
        self.set_state(ConnectionState::Connected, effects);
        tracing::info!(generation, "Price feed connected");

        effects.push(FeedEffect::SendFrame {
            generation,
            message: OutboundMessage::subscribe_portfolio_watchlist(),
        });

        let queued = self.queue.drain_all();
        if !queued.is_empty() {
            tracing::debug!(generation, count = queued.len(), "Flushing queued messages");
        }
        effects.extend(
            queued
                .into_iter()
                .map(|message| FeedEffect::SendFrame {
                    generation,
                    message,
                }),
        );
    }

    fn on_frame(&mut self, generation: Generation, text: &str, effects: &mut Vec<FeedEffect>) {
        if !self.is_live(generation) {
            return;
        }

        match parse_frame(text) {
            Ok(PriceFrame::Updates { updates, skipped }) => {
                if !skipped.is_empty() {
                    for e in &skipped {
                        tracing::warn!(generation, error = %e, "Skipping malformed price record");
                    }
                    effects.push(FeedEffect::RecordsSkipped {
                        count: skipped.len(),
                    });
                }
                if updates.is_empty() {
                    return;
                }
                let applied = self.prices.apply_batch(&updates);
                effects.push(FeedEffect::PricesUpdated { applied });
            }
            Ok(PriceFrame::Ignored) => {
                tracing::trace!(generation, "Ignoring non-price frame");
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "Failed to parse price frame");
                effects.push(FeedEffect::FrameDropped(e.to_string()));
            }
        }
    }

    fn on_error(&mut self, generation: Generation, message: String, effects: &mut Vec<FeedEffect>) {
        if !self.is_live(generation) {
            return;
        }

        tracing::error!(generation, error = %message, "Price feed transport error");
        self.last_error = Some(message.clone());
        self.set_state(ConnectionState::Error, effects);
        effects.push(FeedEffect::ErrorRaised(message));
    }

    fn on_closed(
        &mut self,
        generation: Generation,
        code: u16,
        reason: &str,
        effects: &mut Vec<FeedEffect>,
    ) {
        if !self.is_live(generation) {
            tracing::trace!(generation, code, "Ignoring close from stale transport");
            return;
        }

        self.live = None;
        self.set_state(ConnectionState::Disconnected, effects);
        tracing::info!(generation, code, reason, "Price feed disconnected");

        if is_normal_closure(code) {
            return;
        }

        self.schedule_reconnect(effects);
    }

    fn schedule_reconnect(&mut self, effects: &mut Vec<FeedEffect>) {
        if self.credential.ready_token().is_none() {
            tracing::debug!("No usable credential, not scheduling reconnect");
            return;
        }

        if let Some(delay) = self.policy.next_delay() {
            self.next_timer += 1;
            let timer = self.next_timer;
            let attempt = self.policy.attempt_count();
            self.pending_timer = Some(timer);

            tracing::info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Scheduling price feed reconnect"
            );
            effects.push(FeedEffect::ScheduleReconnect {
                timer,
                delay,
                attempt,
            });
        } else {
            let message = format!(
                "maximum reconnection attempts ({}) exceeded",
                self.policy.config().max_attempts
            );
            tracing::error!(error = %message, "Giving up on price feed");
            self.last_error = Some(message.clone());
            effects.push(FeedEffect::ReconnectAbandoned(message));
        }
    }

    fn on_timer(&mut self, timer: TimerId, effects: &mut Vec<FeedEffect>) {
        if self.pending_timer != Some(timer) {
            tracing::trace!(timer, "Ignoring stale reconnect timer");
            return;
        }
        self.pending_timer = None;

        if self.live.is_some() {
            return;
        }

        if let Some(token) = self.credential.ready_token().cloned() {
            self.connect(token, effects);
        }
    }

    fn on_send(&mut self, message: OutboundMessage, effects: &mut Vec<FeedEffect>) {
        if let Some(LiveTransport {
            generation,
            opened: true,
        }) = self.live
        {
            effects.push(FeedEffect::SendFrame {
                generation,
                message,
            });
            return;
        }

        tracing::warn!(message = %message.to_json(), "Feed not open, queuing message");
        if let Some(evicted) = self.queue.push(message) {
            tracing::warn!(message = %evicted.to_json(), "Outbound queue full, dropped oldest message");
            effects.push(FeedEffect::MessageEvicted(evicted));
        }
        effects.push(FeedEffect::MessageQueued {
            depth: self.queue.len(),
        });
    }
}
