//! Telemetry delivery metrics.
//!
//! # Metrics
//! - `telemetry_records_enqueued_total` (counter): records handed to a client
//! - `telemetry_records_dropped_total` (counter): records lost, by reason
//! - `telemetry_records_shipped_total` (counter): records accepted by the transport
//! - `telemetry_batches_total` (counter): batch POSTs, by outcome
//! - `telemetry_flush_total` (counter): flush calls, by outcome
//!
//! Without an installed recorder these are no-ops.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install a Prometheus scrape endpoint. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_enqueued() {
    counter!("telemetry_records_enqueued_total").increment(1);
}

pub fn record_dropped(reason: &'static str, count: usize) {
    counter!("telemetry_records_dropped_total", "reason" => reason).increment(count as u64);
}

pub fn record_batch(success: bool, records: usize) {
    let outcome = if success { "success" } else { "failure" };
    counter!("telemetry_batches_total", "outcome" => outcome).increment(1);
    if success {
        counter!("telemetry_records_shipped_total").increment(records as u64);
    }
}

pub fn record_flush(outcome: &'static str) {
    counter!("telemetry_flush_total", "outcome" => outcome).increment(1);
}
