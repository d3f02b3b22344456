// src/core/metrics.rs

//! Defines and registers Prometheus metrics for monitor observability.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    // --- Fleet-wide Gauges ---
    /// The number of sites whose polling client currently has an established session.
    pub static ref SITES_CONNECTED: Gauge =
        register_gauge!("fleetmon_sites_connected", "Number of sites with an established session.").unwrap();
    /// The number of sites known to the monitor (group rows included).
    pub static ref SITES_MONITORED: Gauge =
        register_gauge!("fleetmon_sites_monitored", "Number of site records in the status area.").unwrap();

    // --- Counters ---
    /// The total number of protocol messages parsed since startup.
    pub static ref MESSAGES_PARSED_TOTAL: Counter =
        register_counter!("fleetmon_messages_parsed_total", "Total number of tagged messages parsed.").unwrap();
    /// The total number of lines the tag parser could not classify, labeled by site alias.
    pub static ref PARSE_WARNINGS_TOTAL: CounterVec =
        register_counter_vec!("fleetmon_parse_warnings_total", "Total number of unparsable protocol lines, labeled by site.", &["site"]).unwrap();
    /// The total number of reconnect attempts, labeled by site alias.
    pub static ref RECONNECTS_TOTAL: CounterVec =
        register_counter_vec!("fleetmon_reconnects_total", "Total number of reconnect attempts, labeled by site.", &["site"]).unwrap();
    /// The total number of polling-client and log-forwarder restarts by the supervisor.
    pub static ref WORKER_RESTARTS_TOTAL: Counter =
        register_counter!("fleetmon_worker_restarts_total", "Total number of worker restarts.").unwrap();
    /// The total number of log bytes received over the secondary protocol.
    pub static ref LOG_BYTES_RECEIVED_TOTAL: Counter =
        register_counter!("fleetmon_log_bytes_received_total", "Total log bytes received from all sites.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
