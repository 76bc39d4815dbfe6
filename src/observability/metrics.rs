//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ingest_connections_total` (counter): accepted connections
//! - `ingest_requests_total` (counter): requests by kind and status
//! - `ingest_records_enqueued_total` (counter): records handed to the queue
//! - `ingest_records_rejected_total` (counter): entries that failed to decode
//! - `ingest_records_persisted_total` (counter): records written by the consumer
//! - `ingest_queue_depth` (gauge): records waiting for the consumer

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

pub fn record_connection() {
    metrics::counter!("ingest_connections_total").increment(1);
}

pub fn record_request(kind: &'static str, status: u16) {
    metrics::counter!(
        "ingest_requests_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_enqueued(count: usize) {
    metrics::counter!("ingest_records_enqueued_total").increment(count as u64);
}

pub fn record_rejected(count: usize) {
    metrics::counter!("ingest_records_rejected_total").increment(count as u64);
}

pub fn record_persisted() {
    metrics::counter!("ingest_records_persisted_total").increment(1);
}

pub fn record_queue_depth(depth: usize) {
    metrics::gauge!("ingest_queue_depth").set(depth as f64);
}
