//! Prometheus metrics for preview instances.
//!
//! Metrics are exposed via a dedicated HTTP endpoint when the binary is started
//! with `METRICS_PORT` set. Without an installed recorder every recording
//! function is a no-op, so library users pay nothing.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `preview_trust_decisions_total` - Trust decisions (label: `rule` =
//!   `session` | `token` | `referer` | `denied`)
//! - `preview_files_served_total` - Successful file responses (label: `kind` =
//!   `html` | `static`)
//!
//! ## Gauges
//! - `preview_instances_running` - Instances currently serving

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const TRUST_DECISIONS_TOTAL: &str = "preview_trust_decisions_total";
    pub const FILES_SERVED_TOTAL: &str = "preview_files_served_total";
    pub const INSTANCES_RUNNING: &str = "preview_instances_running";
}

/// Initialize the Prometheus metrics exporter on `metrics_addr`.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (address in use, or
/// a recorder is already installed).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::TRUST_DECISIONS_TOTAL,
        "Total number of trust decisions, by deciding rule"
    );
    describe_counter!(
        names::FILES_SERVED_TOTAL,
        "Total number of files served, by response kind"
    );
    describe_gauge!(
        names::INSTANCES_RUNNING,
        "Number of preview instances currently serving"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record which rule decided a request.
pub fn record_trust_decision(rule: &'static str) {
    counter!(names::TRUST_DECISIONS_TOTAL, "rule" => rule).increment(1);
}

/// Record a successful file response.
pub fn record_file_served(kind: &'static str) {
    counter!(names::FILES_SERVED_TOTAL, "kind" => kind).increment(1);
}

/// An instance started serving.
pub fn instance_started() {
    gauge!(names::INSTANCES_RUNNING).increment(1.0);
}

/// An instance stopped serving.
pub fn instance_stopped() {
    gauge!(names::INSTANCES_RUNNING).decrement(1.0);
}
