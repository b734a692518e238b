//! Feed metrics.
//!
//! # Metrics
//! - `feed_events_total` (counter): applied events by `source` and `outcome`
//! - `feed_stale_events_total` (counter): events dropped by the session guard
//! - `feed_channel_opens_total` (counter): channels that reached the open state
//! - `feed_reconnects_scheduled_total` (counter): reconnection timers armed
//! - `feed_polls_total` (counter): poll ticks by `result` (`new`, `idle`, `error`)
//! - `feed_connection_status` (gauge): 0 disconnected, 1 connecting, 2 polling, 3 connected
//! - `feed_items` (gauge): records currently in the feed
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

use crate::liveness::ConnectionStatus;
use crate::model::EventSource;

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(%addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_event(source: EventSource, outcome: &'static str) {
    counter!("feed_events_total", "source" => source.as_str(), "outcome" => outcome).increment(1);
}

/// Records a bulk fetch merged into the feed.
pub fn record_bulk_merge(inserted: usize) {
    counter!("feed_events_total", "source" => EventSource::Bulk.as_str(), "outcome" => "inserted")
        .increment(inserted as u64);
}

pub fn record_stale_event() {
    counter!("feed_stale_events_total").increment(1);
}

pub fn record_channel_open() {
    counter!("feed_channel_opens_total").increment(1);
}

pub fn record_reconnect_scheduled() {
    counter!("feed_reconnects_scheduled_total").increment(1);
}

pub fn record_poll(result: &'static str) {
    counter!("feed_polls_total", "result" => result).increment(1);
}

pub fn record_connection_status(status: ConnectionStatus) {
    let value = match status {
        ConnectionStatus::Disconnected => 0.0,
        ConnectionStatus::Connecting => 1.0,
        ConnectionStatus::Polling => 2.0,
        ConnectionStatus::Connected => 3.0,
    };
    gauge!("feed_connection_status").set(value);
}

pub fn record_items(count: usize) {
    gauge!("feed_items").set(count as f64);
}
