//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `RealtimePriceFeed`: runs the feed state machine against a transport

mod feed;

pub use feed::{
    DEFAULT_QUEUE_CAPACITY, FeedError, FeedHandle, FeedOptions, FeedStatus, RealtimePriceFeed,
};
