//! Metrics collection and exposition.
//!
//! # Metrics
//! - `routeforge_generator_runs_total` (counter): generations by outcome
//!   (`written`, `unchanged`, `failed`)
//! - `routeforge_watcher_ticks_total` (counter): watcher ticks by watcher and outcome
//! - `routeforge_fetch_failures_total` (counter): failed upstream fetches by source type
//! - `routeforge_resources_disabled_total` (counter)
//! - `routeforge_services_created_total` (counter)
//! - `routeforge_active_resources` (gauge): active resources after the last sync
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_generation(outcome: &'static str) {
    counter!("routeforge_generator_runs_total", "outcome" => outcome).increment(1);
}

pub fn record_watcher_tick(watcher: &'static str, outcome: &'static str) {
    counter!("routeforge_watcher_ticks_total", "watcher" => watcher, "outcome" => outcome).increment(1);
}

pub fn record_fetch_failure(source: &'static str) {
    counter!("routeforge_fetch_failures_total", "source" => source).increment(1);
}

pub fn record_resources_disabled(count: usize) {
    counter!("routeforge_resources_disabled_total").increment(count as u64);
}

pub fn record_services_created(count: usize) {
    counter!("routeforge_services_created_total").increment(count as u64);
}

pub fn set_active_resources(count: usize) {
    gauge!("routeforge_active_resources").set(count as f64);
}
