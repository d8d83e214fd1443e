//! # Metrics Collection
//!
//! Prometheus metrics for the compiler and the discovery server.

use std::net::SocketAddr;

use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::errors::{ControlPlaneError, Result};

/// Metrics recorder that tracks control plane metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Update the number of entities held for one kind
    pub fn update_entity_count(&self, kind: &str, count: usize) {
        let labels = [("type", kind.to_string())];
        gauge!("xds_entities_total", &labels).set(count as f64);
    }

    /// Record a snapshot build and what triggered it
    pub fn record_snapshot(&self, trigger: &str) {
        let labels = [("trigger", trigger.to_string())];
        counter!("xds_snapshots_total", &labels).increment(1);
    }

    /// Record how long a compile took in seconds
    pub fn record_compile_duration(&self, duration: f64) {
        histogram!("xds_compile_duration_seconds").record(duration);
    }

    /// Record an inbound discovery request on a stream
    pub fn record_resource_request(&self, type_url: &str) {
        let labels = [("type_url", type_url.to_string())];
        counter!("xds_resource_requests_total", &labels).increment(1);
    }

    /// Record a unary fetch request
    pub fn record_fetch_request(&self, type_url: &str) {
        let labels = [("type_url", type_url.to_string())];
        counter!("xds_fetch_requests_total", &labels).increment(1);
    }

    /// Record a rejected response reported by a proxy
    pub fn record_nack(&self, type_url: &str) {
        let labels = [("type_url", type_url.to_string())];
        counter!("xds_nacks_total", &labels).increment(1);
    }

    pub fn record_stream_opened(&self) {
        gauge!("xds_streams_active").increment(1.0);
    }

    pub fn record_stream_closed(&self) {
        gauge!("xds_streams_active").decrement(1.0);
    }

    /// Update the number of nodes known to the registry
    pub fn update_node_count(&self, count: usize) {
        gauge!("xds_nodes_total").set(count as f64);
    }

    /// Register descriptions so series show up before the first event
    pub fn register_xds_metrics(&self) {
        describe_gauge!("xds_entities_total", Unit::Count, "Entities held per kind");
        describe_counter!("xds_snapshots_total", Unit::Count, "Snapshots built per trigger");
        describe_histogram!(
            "xds_compile_duration_seconds",
            Unit::Seconds,
            "Duration of one compile of all resources"
        );
        describe_counter!(
            "xds_resource_requests_total",
            Unit::Count,
            "Discovery requests received on streams"
        );
        describe_counter!("xds_fetch_requests_total", Unit::Count, "Unary fetch requests received");
        describe_counter!("xds_nacks_total", Unit::Count, "Responses rejected by proxies");
        describe_gauge!("xds_streams_active", Unit::Count, "Open discovery streams");
        describe_gauge!("xds_nodes_total", Unit::Count, "Nodes known to the registry");

        gauge!("xds_streams_active").set(0.0);
        gauge!("xds_nodes_total").set(0.0);
    }
}

/// Initialize the Prometheus exporter
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        ControlPlaneError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            ControlPlaneError::config(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    MetricsRecorder::new().register_xds_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}
