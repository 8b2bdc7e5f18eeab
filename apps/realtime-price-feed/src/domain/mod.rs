//! Domain Layer - Core feed types and business logic.
//!
//! This layer contains the price feed state machine and its data types.
//! Nothing here performs I/O or reads clocks, so every transition can be
//! exercised without a network.

/// Access token and credential source snapshot.
pub mod credential;

/// Connection state machine, outbound queue and backoff policy.
pub mod feed;

/// Price table, symbols and inbound frame decoding.
pub mod prices;
