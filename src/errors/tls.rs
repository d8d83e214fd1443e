use std::path::PathBuf;

use thiserror::Error;

/// TLS-specific error variants surfaced while loading the xDS listener certificates.
#[derive(Debug, Error)]
pub enum TlsError {
    /// TLS has been enabled but the certificate path was not provided.
    #[error("TLS is enabled but certificate path is not configured")]
    MissingCertificatePath,

    /// TLS has been enabled but the private key path was not provided.
    #[error("TLS is enabled but private key path is not configured")]
    MissingPrivateKeyPath,

    /// The certificate file could not be read.
    #[error("Failed to read certificate at {path}: {source}")]
    CertificateReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The private key file could not be read.
    #[error("Failed to read private key at {path}: {source}")]
    PrivateKeyReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The client CA bundle could not be read.
    #[error("Failed to read client CA bundle at {path}: {source}")]
    ClientCaReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A PEM file was readable but empty.
    #[error("PEM file {path} is empty")]
    EmptyPem { path: PathBuf },
}
