//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dhcp_cfggen_generations_total` (counter): generation passes
//! - `dhcp_cfggen_subnets` (gauge): subnets in the last rendered config
//! - `dhcp_cfggen_last_skipped_rows` (gauge): rows skipped in the last pass
//! - `dhcp_cfggen_skipped_rows_total` (counter): skipped rows by table
//! - `dhcp_monitor_checker_fired_total` (counter): checker fires by checker
//! - `dhcp_relay_process_starts_total` (counter): spawns by process family
//! - `dhcp_relay_process_kills_total` (counter): terminations by process family
//! - `dhcp_relay_mode` (gauge): 1 = MANAGED, 0 = LEGACY

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener. Must run inside
/// the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_generation(subnets: usize, skipped: usize) {
    metrics::counter!("dhcp_cfggen_generations_total").increment(1);
    metrics::gauge!("dhcp_cfggen_subnets").set(subnets as f64);
    metrics::gauge!("dhcp_cfggen_last_skipped_rows").set(skipped as f64);
}

pub fn record_skipped_row(table: &'static str) {
    metrics::counter!("dhcp_cfggen_skipped_rows_total", "table" => table).increment(1);
}

pub fn record_checker_fired(checker: &'static str) {
    metrics::counter!("dhcp_monitor_checker_fired_total", "checker" => checker).increment(1);
}

pub fn record_process_start(family: &'static str) {
    metrics::counter!("dhcp_relay_process_starts_total", "process" => family).increment(1);
}

pub fn record_process_kill(family: &'static str, count: usize) {
    metrics::counter!("dhcp_relay_process_kills_total", "process" => family).increment(count as u64);
}

pub fn record_mode(managed: bool) {
    metrics::gauge!("dhcp_relay_mode").set(if managed { 1.0 } else { 0.0 });
}
