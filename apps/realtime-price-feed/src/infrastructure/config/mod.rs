//! Configuration Module
//!
//! Environment-driven configuration for the feed client and its binary.

mod settings;

pub use settings::{ConfigError, FeedConfig, MAX_DURATION, WebSocketSettings};
