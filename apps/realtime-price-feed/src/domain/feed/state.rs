//! Connection State

use serde::Serialize;

/// WebSocket close code for a deliberate, application-initiated shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the link drops without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Connection state of the feed client. Exactly one value at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport, or the transport has closed.
    #[default]
    Disconnected,
    /// Transport opening, not yet acknowledged.
    Connecting,
    /// Transport open and subscribed.
    Connected,
    /// Transport reported an error; the closure that follows drives recovery.
    Error,
}

impl ConnectionState {
    /// State name for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Numeric encoding for the state gauge.
    #[must_use]
    pub const fn as_gauge(&self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Error => 3.0,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a close code is the normal closure code.
#[must_use]
pub const fn is_normal_closure(code: u16) -> bool {
    code == NORMAL_CLOSURE
}
