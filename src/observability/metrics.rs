//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mesh_requests_total` (counter): handled requests by service, endpoint, status
//! - `mesh_request_duration_seconds` (histogram): handler latency by service, endpoint
//! - `mesh_spans_closed_total` (counter): closed spans by service, status
//! - `mesh_spans_emitted_total` (counter): spans written by the exporter
//! - `mesh_spans_dropped_total` (counter): spans lost to a full export buffer
//! - `mesh_scenarios_total` (counter): generator scenarios by loop, scenario, outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The Prometheus exporter is optional and serves its own HTTP listener

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(service: &str, endpoint: &str, status: u16, start: Instant) {
    metrics::counter!(
        "mesh_requests_total",
        "service" => service.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "mesh_request_duration_seconds",
        "service" => service.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_span(service: &str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!("mesh_spans_closed_total", "service" => service.to_string(), "status" => status)
        .increment(1);
}

pub fn record_span_emitted(service: &str) {
    metrics::counter!("mesh_spans_emitted_total", "service" => service.to_string()).increment(1);
}

pub fn record_span_dropped(service: &str) {
    metrics::counter!("mesh_spans_dropped_total", "service" => service.to_string()).increment(1);
}

pub fn record_scenario(loop_name: &str, scenario: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(
        "mesh_scenarios_total",
        "loop" => loop_name.to_string(),
        "scenario" => scenario.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
