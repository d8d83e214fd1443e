//! # Error Types
//!
//! Error types for the control plane using `thiserror`.

use super::tls::TlsError;

/// Custom result type for control plane operations
pub type Result<T> = std::result::Result<T, ControlPlaneError>;

/// Main error type for the control plane
#[derive(thiserror::Error, Debug)]
pub enum ControlPlaneError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Entity store errors
    #[error("Entity store error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        context: String,
    },

    /// Network transport errors (gRPC, HTTP)
    #[error("Transport error: {0}")]
    Transport(String),

    /// TLS material errors
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// A long-running task stopped unexpectedly
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ControlPlaneError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an entity store error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage { message: message.into(), source: None }
    }

    /// Create an entity store error with source
    pub fn storage_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Storage { message: message.into(), source: Some(source) }
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }
}

impl From<std::io::Error> for ControlPlaneError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for ControlPlaneError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: Box::new(error), context: "JSON processing failed".to_string() }
    }
}

impl From<serde_yaml::Error> for ControlPlaneError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization { source: Box::new(error), context: "YAML processing failed".to_string() }
    }
}

impl From<config::ConfigError> for ControlPlaneError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Failed to load configuration", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for ControlPlaneError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|field| field.to_string());
        Self::Validation { message: errors.to_string(), field }
    }
}

impl From<tonic::transport::Error> for ControlPlaneError {
    fn from(error: tonic::transport::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = ControlPlaneError::config("bad listen address");
        assert!(matches!(error, ControlPlaneError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: bad listen address");
    }

    #[test]
    fn test_validation_error_with_field() {
        let error = ControlPlaneError::validation_field("must be positive", "compile_interval_ms");
        match error {
            ControlPlaneError::Validation { message, field } => {
                assert_eq!(message, "must be positive");
                assert_eq!(field.as_deref(), Some("compile_interval_ms"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_internal_error_display() {
        let error = ControlPlaneError::internal("distributor exited before shutdown");
        assert_eq!(error.to_string(), "Internal error: distributor exited before shutdown");
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "entities.yaml");
        let error: ControlPlaneError = io_error.into();
        assert!(matches!(error, ControlPlaneError::Io { .. }));

        let yaml_error = serde_yaml::from_str::<Vec<u32>>("{").unwrap_err();
        let error: ControlPlaneError = yaml_error.into();
        assert!(matches!(error, ControlPlaneError::Serialization { .. }));
    }
}
