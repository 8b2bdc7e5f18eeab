//! Prometheus Metrics Module
//!
//! Exposes feed client metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound frames received, dropped and price records applied
//! - **Connection**: current connection state and reconnect scheduling
//! - **Outbound**: messages sent, queued and evicted from the offline queue
//!
//! # Integration
//!
//! When a metrics port is configured, an HTTP listener serves `/metrics`.
//! Recording functions are no-ops until a recorder is installed, so the feed
//! can run (and be tested) without an exporter.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::domain::feed::ConnectionState;

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

// =============================================================================
// Initialization
// =============================================================================

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install the exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Install the Prometheus exporter listening on `0.0.0.0:{port}`.
///
/// Calling this again after a successful install is a no-op.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed (port in use, or a
/// different recorder already registered).
pub fn init_metrics(port: u16) -> Result<SocketAddr, MetricsError> {
    if let Some(addr) = INSTALLED.get() {
        return Ok(*addr);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    register_metrics();
    let addr = *INSTALLED.get_or_init(|| addr);

    tracing::info!(%addr, "Prometheus metrics exporter started");
    Ok(addr)
}

/// Address of the installed exporter, if any.
#[must_use]
pub fn metrics_addr() -> Option<SocketAddr> {
    INSTALLED.get().copied()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "price_feed_frames_received_total",
        "Total inbound frames received from the feed server"
    );
    describe_counter!(
        "price_feed_frames_dropped_total",
        "Total inbound frames dropped as malformed"
    );
    describe_counter!(
        "price_feed_records_skipped_total",
        "Total price records skipped as malformed inside an applied frame"
    );
    describe_counter!(
        "price_feed_price_updates_total",
        "Total price records merged into the price table"
    );

    describe_gauge!(
        "price_feed_connection_state",
        "Connection state (0=disconnected, 1=connecting, 2=connected, 3=error)"
    );
    describe_counter!(
        "price_feed_transport_errors_total",
        "Total transport errors reported"
    );
    describe_counter!(
        "price_feed_reconnects_scheduled_total",
        "Total reconnect attempts scheduled"
    );
    describe_counter!(
        "price_feed_reconnects_abandoned_total",
        "Total times reconnection stopped after exhausting max attempts"
    );
    describe_gauge!(
        "price_feed_reconnect_attempt",
        "Attempt number of the most recently scheduled reconnect"
    );

    describe_counter!(
        "price_feed_messages_sent_total",
        "Total outbound messages written to the transport"
    );
    describe_counter!(
        "price_feed_messages_queued_total",
        "Total outbound messages queued while the transport was not ready"
    );
    describe_counter!(
        "price_feed_queue_evictions_total",
        "Total queued messages evicted because the queue was full"
    );
    describe_gauge!("price_feed_queue_depth", "Current outbound queue depth");
}

// =============================================================================
// Frames
// =============================================================================

/// Record an inbound frame.
pub fn record_frame_received() {
    counter!("price_feed_frames_received_total").increment(1);
}

/// Record a malformed frame that was dropped.
pub fn record_frame_dropped() {
    counter!("price_feed_frames_dropped_total").increment(1);
}

/// Record malformed records skipped inside an array frame.
pub fn record_records_skipped(count: usize) {
    counter!("price_feed_records_skipped_total").increment(count as u64);
}

/// Record price records merged into the table.
pub fn record_price_updates(count: usize) {
    counter!("price_feed_price_updates_total").increment(count as u64);
}

// =============================================================================
// Connection
// =============================================================================

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("price_feed_connection_state").set(state.as_gauge());
}

/// Record a transport error.
pub fn record_transport_error() {
    counter!("price_feed_transport_errors_total").increment(1);
}

/// Record a scheduled reconnect attempt.
pub fn record_reconnect_scheduled(attempt: u32) {
    counter!("price_feed_reconnects_scheduled_total").increment(1);
    gauge!("price_feed_reconnect_attempt").set(f64::from(attempt));
}

/// Record reconnection giving up after `max_attempts`.
pub fn record_reconnect_abandoned() {
    counter!("price_feed_reconnects_abandoned_total").increment(1);
}

// =============================================================================
// Outbound
// =============================================================================

/// Record a message written to the transport.
pub fn record_message_sent() {
    counter!("price_feed_messages_sent_total").increment(1);
}

/// Record a message queued while offline.
pub fn record_message_queued() {
    counter!("price_feed_messages_queued_total").increment(1);
}

/// Record a queued message evicted on overflow.
pub fn record_queue_eviction() {
    counter!("price_feed_queue_evictions_total").increment(1);
}

/// Update the outbound queue depth gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_queue_depth(depth: usize) {
    gauge!("price_feed_queue_depth").set(depth as f64);
}

// =============================================================================
// Tests
// =============================================================================
