//! Metrics collection and exposition.
//!
//! # Metrics
//! - `orchestrator_config_version` (gauge): version of the current generation
//! - `orchestrator_updates_total` (counter): update attempts by outcome
//!   (`applied`, `stale`, `rejected`)
//! - `orchestrator_generations_released_total` (counter): retired generations
//! - `proxy_requests_total` (counter): routed requests by service kind
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_config_version(version: i32) {
    gauge!("orchestrator_config_version").set(f64::from(version));
}

/// Outcome label values for [`record_update`].
pub mod outcome {
    pub const APPLIED: &str = "applied";
    pub const STALE: &str = "stale";
    pub const REJECTED: &str = "rejected";
}

pub fn record_update(outcome: &'static str) {
    counter!("orchestrator_updates_total", "outcome" => outcome).increment(1);
}

pub fn record_generation_released() {
    counter!("orchestrator_generations_released_total").increment(1);
}

pub fn record_proxy_request(service: &'static str) {
    counter!("proxy_requests_total", "service" => service).increment(1);
}
