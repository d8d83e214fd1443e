//! # Configuration Management
//!
//! Layered configuration for the control plane: built-in defaults, then an optional YAML
//! file, then `CONTROLPLANE__`-prefixed environment variables
//! (`CONTROLPLANE__XDS__PORT=18000`).

mod settings;
mod tls;

use std::path::Path;

use config::{Config, Environment, File, FileFormat};

pub use settings::{
    AccessLogConfig, AdminConfig, AppConfig, EnvoyConfig, ExtAuthzConfig, FileAccessLogConfig,
    GrpcAccessLogConfig, ObservabilityConfig, RateLimiterConfig, StoreConfig, XdsConfig,
};
pub use tls::XdsTlsConfig;

use crate::Result;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "CONTROLPLANE";

/// Load and validate the application configuration.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let defaults = Config::try_from(&AppConfig::default())?;

    let mut builder = Config::builder().add_source(defaults);
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__").try_parsing(true),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
