//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_decisions_total` (counter): decisions by source (`affinity`, `resolved`)
//! - `dispatch_resolutions_total` (counter): resolutions by strategy, request class and pick
//! - `dispatch_errors_total` (counter): failed dispatch calls by error kind
//! - `dispatch_affinity_entries` (gauge): live affinity table entries
//! - `dispatch_affinity_overflow_total` (counter): connections served unpinned
//! - `dispatch_classifier_reloads_total` (counter): risk rule reloads

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_decision(source: &'static str) {
    ::metrics::counter!("dispatch_decisions_total", "source" => source).increment(1);
}

pub fn record_resolution(strategy: &'static str, class: &'static str, pick: &'static str) {
    ::metrics::counter!(
        "dispatch_resolutions_total",
        "strategy" => strategy,
        "class" => class,
        "pick" => pick
    )
    .increment(1);
}

pub fn record_error(kind: &'static str) {
    ::metrics::counter!("dispatch_errors_total", "kind" => kind).increment(1);
}

pub fn record_affinity_entries(len: usize) {
    ::metrics::gauge!("dispatch_affinity_entries").set(len as f64);
}

pub fn record_affinity_overflow() {
    ::metrics::counter!("dispatch_affinity_overflow_total").increment(1);
}

pub fn record_classifier_reload() {
    ::metrics::counter!("dispatch_classifier_reloads_total").increment(1);
}
