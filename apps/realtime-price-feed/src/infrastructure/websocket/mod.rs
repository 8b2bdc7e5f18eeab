//! WebSocket Transport
//!
//! [`TransportConnector`] backed by `tokio-tungstenite`. Each open spawns a
//! connection task that owns the socket and bridges it to a
//! [`TransportLink`]:
//!
//! - `TransportCommand::Text` is written as a text frame
//! - `TransportCommand::Close` sends a close frame, waits briefly for the
//!   peer's reply and ends the task
//! - inbound text frames become `TransportSignal::Message`
//! - a close frame, read error, heartbeat timeout or EOF ends with exactly one
//!   `TransportSignal::Closed`
//!
//! The access token travels as the `token` query parameter.

pub mod heartbeat;

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

pub use heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};

use crate::application::ports::{
    TransportCommand, TransportConnector, TransportError, TransportLink, TransportSignal,
};
use crate::domain::credential::AccessToken;
use crate::domain::feed::{ABNORMAL_CLOSURE, NORMAL_CLOSURE};

/// Close code reported when the peer's close frame carries no status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// How long either side of a closing handshake is given to finish.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameter carrying the access token.
const TOKEN_PARAM: &str = "token";

// =============================================================================
// Connector
// =============================================================================

/// Opens authenticated WebSocket connections to the price feed server.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    heartbeat: HeartbeatConfig,
}

impl WebSocketConnector {
    /// Create a connector for the given `ws://` or `wss://` endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Override the heartbeat configuration.
    #[must_use]
    pub const fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Endpoint URL with the token attached.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidEndpoint`] if the base URL does not
    /// parse or is not a WebSocket URL.
    pub fn endpoint(&self, token: &AccessToken) -> Result<Url, TransportError> {
        let url = Url::parse_with_params(&self.url, [(TOKEN_PARAM, token.expose())])
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(TransportError::InvalidEndpoint(format!(
                "unsupported scheme '{other}'"
            ))),
        }
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    async fn open(&self, token: &AccessToken) -> Result<TransportLink, TransportError> {
        let url = self.endpoint(token)?;

        tracing::info!(host = url.host_str().unwrap_or_default(), "Connecting to price feed");

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_connection(stream, command_rx, signal_tx, self.heartbeat));

        Ok(TransportLink::new(command_tx, signal_rx))
    }
}

// =============================================================================
// Connection Task
// =============================================================================

/// Pump one socket until either side closes it.
async fn run_connection<S>(
    stream: S,
    mut commands: mpsc::UnboundedReceiver<TransportCommand>,
    signals: mpsc::UnboundedSender<TransportSignal>,
    heartbeat: HeartbeatConfig,
) where
    S: futures_util::Stream<Item = Result<Message, WsError>>
        + futures_util::Sink<Message, Error = WsError>
        + Unpin,
{
    let (mut write, mut read) = stream.split();
    let mut monitor = HeartbeatMonitor::new(heartbeat);

    let closed = |code: u16, reason: String| {
        let _ = signals.send(TransportSignal::Closed { code, reason });
    };
    let failed = |message: String| {
        let _ = signals.send(TransportSignal::Error(message.clone()));
        let _ = signals.send(TransportSignal::Closed {
            code: ABNORMAL_CLOSURE,
            reason: message,
        });
    };

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(TransportCommand::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        failed(e.to_string());
                        return;
                    }
                }
                Some(TransportCommand::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        tracing::debug!(error = %e, "Close frame not delivered");
                    }
                    tracing::info!(code, reason = %reason, "Price feed connection closed");
                    closed(code, reason);
                    await_close_reply(&mut read).await;
                    return;
                }
                None => {
                    let frame = CloseFrame {
                        code: CloseCode::from(NORMAL_CLOSURE),
                        reason: "".into(),
                    };
                    if write.send(Message::Close(Some(frame))).await.is_ok() {
                        await_close_reply(&mut read).await;
                    }
                    return;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    monitor.record_activity();
                    let _ = signals.send(TransportSignal::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    monitor.record_activity();
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            let _ = signals.send(TransportSignal::Message(text));
                        }
                        Err(_) => tracing::debug!(len = data.len(), "Dropping non-UTF-8 binary frame"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    monitor.record_activity();
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        failed(e.to_string());
                        return;
                    }
                }
                Some(Ok(Message::Pong(_))) => monitor.record_activity(),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS_RECEIVED, String::new()),
                        |f| (u16::from(f.code), f.reason.as_str().to_owned()),
                    );
                    tracing::info!(code, reason = %reason, "Server closed price feed connection");
                    closed(code, reason);
                    flush_close_reply(&mut write).await;
                    return;
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Price feed read error");
                    failed(e.to_string());
                    return;
                }
                None => {
                    tracing::info!("Price feed stream ended");
                    closed(ABNORMAL_CLOSURE, "connection lost".to_string());
                    return;
                }
            },
            action = monitor.tick() => match action {
                HeartbeatAction::Ping => {
                    if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                        failed(e.to_string());
                        return;
                    }
                }
                HeartbeatAction::TimedOut { silent_for } => {
                    failed(format!("heartbeat timeout after {}s", silent_for.as_secs()));
                    return;
                }
            },
        }
    }
}

/// Read until the peer answers our close frame, the stream ends, or the
/// handshake times out. Frames arriving meanwhile are discarded.
async fn await_close_reply<R>(read: &mut R)
where
    R: futures_util::Stream<Item = Result<Message, WsError>> + Unpin,
{
    let reply = async {
        while let Some(Ok(frame)) = read.next().await {
            if frame.is_close() {
                return;
            }
        }
    };
    if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, reply).await.is_err() {
        tracing::debug!("Peer did not answer close frame");
    }
}

/// Write the close reply tungstenite queued when the peer's close arrived.
async fn flush_close_reply<W>(write: &mut W)
where
    W: futures_util::Sink<Message, Error = WsError> + Unpin,
{
    match tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, write.flush()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Close reply not delivered"),
        Err(_) => tracing::debug!("Timed out flushing close reply"),
    }
}
