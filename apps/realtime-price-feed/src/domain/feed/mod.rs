//! Realtime Feed Core
//!
//! Connection lifecycle, subscription protocol, outbound queue and
//! reconnection policy of the price feed client, as a pure state machine.

mod machine;
mod queue;
mod reconnect;
mod state;

pub use machine::{
    FeedEffect, FeedEvent, FeedMachine, Generation, REASON_SIGNED_OUT, REASON_STOPPED,
    REASON_TOKEN_CHANGED, TimerId,
};
pub use queue::{OutboundMessage, OutboundQueue, SUBSCRIBE_PORTFOLIO_WATCHLIST, UNSUBSCRIBE_ALL};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use state::{ABNORMAL_CLOSURE, ConnectionState, NORMAL_CLOSURE, is_normal_closure};
