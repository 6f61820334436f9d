//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tape_proxy_requests_total` (counter): proxied requests by mode, status
//! - `tape_proxy_request_duration_seconds` (histogram): latency by mode
//! - `tape_proxy_replay_misses_total` (counter): replay requests with no match
//! - `tape_proxy_recorded_total` (counter): interactions persisted in record mode
//! - `tape_proxy_tape_switches_total` (counter): control-channel tape changes
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::Mode;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(mode: Mode, status: u16, start: Instant) {
    counter!(
        "tape_proxy_requests_total",
        "mode" => mode.as_str(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("tape_proxy_request_duration_seconds", "mode" => mode.as_str())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_replay_miss() {
    counter!("tape_proxy_replay_misses_total").increment(1);
}

pub fn record_recorded() {
    counter!("tape_proxy_recorded_total").increment(1);
}

pub fn record_tape_switch(mode: Mode) {
    counter!("tape_proxy_tape_switches_total", "mode" => mode.as_str()).increment(1);
}
