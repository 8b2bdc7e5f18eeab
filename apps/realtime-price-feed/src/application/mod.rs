//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the feed driver and the port interfaces that define
//! how the feed interacts with transports, credential sources and observers.

/// Port interfaces for external systems (transport, observer).
pub mod ports;

/// Application services driving the feed state machine.
pub mod services;
