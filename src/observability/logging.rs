//! # Structured Logging
//!
//! `tracing` subscriber setup. `RUST_LOG` takes precedence over the configured level;
//! output goes to stdout, or to a file through a non-blocking `tracing-appender` writer.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::errors::{ControlPlaneError, Result};

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must live as long as the
/// process logs. A subscriber that is already installed (tests) is left in place.
pub fn init_logging(config: &ObservabilityConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            ControlPlaneError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let (writer, guard) = match config.log_file.as_deref() {
        Some(path) => {
            let (writer, guard) = file_writer(Path::new(path))?;
            (writer, Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer);
    let installed = if config.json_logging {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }

    Ok(guard)
}

fn file_writer(path: &Path) -> Result<(BoxMakeWriter, WorkerGuard)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ControlPlaneError::config(format!("Invalid log file '{}'", path.display())))?;
    let directory = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(writer), guard))
}

/// Create a tracing span for xDS operations
#[macro_export]
macro_rules! xds_span {
    ($operation:expr, $node_id:expr) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $node_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        xds_address = %config.xds.bind_address(),
        admin_address = %config.admin.bind_address(),
        compile_interval_ms = config.xds.compile_interval_ms,
        store_path = %config.store.path,
        xds_tls = config.xds.has_tls_config(),
        ext_authz = config.envoy.ext_authz.is_active(),
        rate_limiter = config.envoy.rate_limiter.is_active(),
        metrics_enabled = config.observability.enable_metrics,
        "Control plane configuration"
    );
}
