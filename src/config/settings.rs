//! # Configuration Settings
//!
//! Defines the configuration structure for the control plane.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{ControlPlaneError, Result};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Logging and metrics
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Admin HTTP surface
    #[validate(nested)]
    pub admin: AdminConfig,

    /// xDS server and compile loop
    #[validate(nested)]
    pub xds: XdsConfig,

    /// Entity store
    #[validate(nested)]
    pub store: StoreConfig,

    /// Process-wide defaults applied to compiled Envoy resources
    #[validate(nested)]
    pub envoy: EnvoyConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(ControlPlaneError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    fn validate_custom(&self) -> Result<()> {
        if self.admin.port == self.xds.port {
            return Err(ControlPlaneError::validation_field(
                "Admin and xDS ports cannot be the same",
                "admin.port",
            ));
        }

        if self.observability.enable_metrics
            && self.observability.metrics_port != 0
            && (self.observability.metrics_port == self.xds.port
                || self.observability.metrics_port == self.admin.port)
        {
            return Err(ControlPlaneError::validation_field(
                "Metrics port conflicts with the admin or xDS port",
                "observability.metrics_port",
            ));
        }

        if self.xds.cert_file.is_some() != self.xds.key_file.is_some() {
            return Err(ControlPlaneError::validation_field(
                "xDS TLS requires both cert_file and key_file",
                "xds.cert_file",
            ));
        }

        let ext_authz = &self.envoy.ext_authz;
        if ext_authz.enabled && ext_authz.cluster.trim().is_empty() {
            return Err(ControlPlaneError::validation_field(
                "ext_authz is enabled but no cluster is configured",
                "envoy.ext_authz.cluster",
            ));
        }

        let rate_limiter = &self.envoy.rate_limiter;
        if rate_limiter.enabled {
            if rate_limiter.cluster.trim().is_empty() {
                return Err(ControlPlaneError::validation_field(
                    "rate limiter is enabled but no cluster is configured",
                    "envoy.rate_limiter.cluster",
                ));
            }
            if rate_limiter.domain.trim().is_empty() {
                return Err(ControlPlaneError::validation_field(
                    "rate limiter is enabled but no domain is configured",
                    "envoy.rate_limiter.domain",
                ));
            }
        }

        Ok(())
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Optional log file; stdout when unset
    pub log_file: Option<String>,

    /// Enable the Prometheus exporter
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    /// Service label attached to every metric
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            log_file: None,
            enable_metrics: true,
            metrics_port: 9090,
            service_name: "gatekeeper-controlplane".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if !self.enable_metrics || self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

/// Admin HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    #[validate(length(min = 1, message = "Admin host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "Admin port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 9902 }
    }
}

impl AdminConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// xDS server configuration for Envoy communication
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct XdsConfig {
    /// xDS server bind address
    #[validate(length(min = 1, message = "xDS host cannot be empty"))]
    pub host: String,

    /// xDS server port
    #[validate(range(min = 1, max = 65535, message = "xDS port must be between 1 and 65535"))]
    pub port: u16,

    /// Fallback recompile interval when no change notification arrives
    #[validate(range(min = 1, message = "Compile interval must be positive"))]
    pub compile_interval_ms: u64,

    /// Cluster name proxies use to reach this control plane
    #[validate(length(min = 1, message = "xDS cluster name cannot be empty"))]
    pub cluster: String,

    /// Timeout for gRPC config sources pointing back at this control plane
    #[validate(range(min = 1, message = "xDS timeout must be positive"))]
    pub timeout_ms: u64,

    /// Path to TLS certificate file
    pub cert_file: Option<String>,

    /// Path to TLS private key file
    pub key_file: Option<String>,

    /// Path to CA certificate file for client verification
    pub ca_file: Option<String>,
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9901,
            compile_interval_ms: 2000,
            cluster: "xds_cluster".to_string(),
            timeout_ms: 2000,
            cert_file: None,
            key_file: None,
            ca_file: None,
        }
    }
}

impl XdsConfig {
    /// Get the xDS server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn compile_interval(&self) -> Duration {
        Duration::from_millis(self.compile_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check if TLS is properly configured
    pub fn has_tls_config(&self) -> bool {
        self.cert_file.is_some() && self.key_file.is_some()
    }
}

/// Entity store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// YAML or JSON document holding clusters, routes and listeners
    #[validate(length(min = 1, message = "Store path cannot be empty"))]
    pub path: String,

    #[validate(range(min = 1, message = "Refresh interval must be positive"))]
    pub refresh_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: "entities.yaml".to_string(), refresh_interval_ms: 2000 }
    }
}

impl StoreConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// Defaults applied when compiling Envoy resources
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
#[serde(default)]
pub struct EnvoyConfig {
    #[validate(nested)]
    pub access_log: AccessLogConfig,

    #[validate(nested)]
    pub ext_authz: ExtAuthzConfig,

    #[validate(nested)]
    pub rate_limiter: RateLimiterConfig,
}

/// Default access log destinations, used when a listener carries no override
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
#[serde(default)]
pub struct AccessLogConfig {
    #[validate(nested)]
    pub file: FileAccessLogConfig,

    #[validate(nested)]
    pub grpc: GrpcAccessLogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
#[serde(default)]
pub struct FileAccessLogConfig {
    pub path: Option<String>,

    /// JSON log format: output key to Envoy format string
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct GrpcAccessLogConfig {
    pub cluster: Option<String>,

    #[validate(length(min = 1, message = "Access log name cannot be empty"))]
    pub log_name: String,

    #[validate(range(min = 1, message = "Access log timeout must be positive"))]
    pub timeout_ms: u64,

    pub buffer_size: u32,
}

impl Default for GrpcAccessLogConfig {
    fn default() -> Self {
        Self { cluster: None, log_name: "accesslog".to_string(), timeout_ms: 1000, buffer_size: 16384 }
    }
}

impl GrpcAccessLogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// External authorization filter settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct ExtAuthzConfig {
    pub enabled: bool,

    pub cluster: String,

    #[validate(range(min = 1, message = "ext_authz timeout must be positive"))]
    pub timeout_ms: u64,

    pub failure_mode_allow: bool,

    /// Request body bytes forwarded to the authorization service (0 = none)
    pub request_body_size: u32,
}

impl Default for ExtAuthzConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cluster: String::new(),
            timeout_ms: 10,
            failure_mode_allow: false,
            request_body_size: 0,
        }
    }
}

impl ExtAuthzConfig {
    /// Whether listeners get the authorization filter
    pub fn is_active(&self) -> bool {
        self.enabled && !self.cluster.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Rate limit filter settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub enabled: bool,

    pub cluster: String,

    pub domain: String,

    #[validate(range(min = 1, message = "Rate limiter timeout must be positive"))]
    pub timeout_ms: u64,

    pub failure_mode_allow: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cluster: String::new(),
            domain: String::new(),
            timeout_ms: 10,
            failure_mode_allow: false,
        }
    }
}

impl RateLimiterConfig {
    /// Whether listeners get the rate limit filter
    pub fn is_active(&self) -> bool {
        self.enabled && !self.cluster.trim().is_empty() && !self.domain.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
