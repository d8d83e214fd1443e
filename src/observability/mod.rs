//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the control plane.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::{init_metrics, MetricsRecorder};

use ::tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use crate::config::ObservabilityConfig;
use crate::errors::Result;

/// Initialize logging and, when enabled, the metrics exporter.
///
/// Keep the returned guard alive until shutdown so buffered log lines are flushed.
pub async fn init_observability(config: &ObservabilityConfig) -> Result<Option<WorkerGuard>> {
    let guard = init_logging(config)?;

    if config.enable_metrics {
        init_metrics(config).await?;
    }

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json_logging = config.json_logging,
        metrics_enabled = config.enable_metrics,
        "Observability initialized"
    );

    Ok(guard)
}
