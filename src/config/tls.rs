use std::path::{Path, PathBuf};

use tonic::transport::{Certificate, Identity, ServerTlsConfig};

use super::XdsConfig;
use crate::{errors::TlsError, Result};

/// Certificate material for the xDS gRPC listener.
#[derive(Debug, Clone)]
pub struct XdsTlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub client_ca_path: Option<PathBuf>,
}

impl XdsTlsConfig {
    /// Resolve TLS settings from the xDS configuration; `None` when TLS is not configured.
    pub fn from_config(config: &XdsConfig) -> Result<Option<Self>> {
        let cert_path = config.cert_file.as_deref().map(str::trim).filter(|path| !path.is_empty());
        let key_path = config.key_file.as_deref().map(str::trim).filter(|path| !path.is_empty());

        let (cert_path, key_path) = match (cert_path, key_path) {
            (None, None) => return Ok(None),
            (None, Some(_)) => return Err(TlsError::MissingCertificatePath.into()),
            (Some(_), None) => return Err(TlsError::MissingPrivateKeyPath.into()),
            (Some(cert), Some(key)) => (PathBuf::from(cert), PathBuf::from(key)),
        };

        let client_ca_path = config
            .ca_file
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        Ok(Some(Self { cert_path, key_path, client_ca_path }))
    }

    /// Read the PEM files and build the tonic server TLS configuration.
    pub fn load(&self) -> Result<ServerTlsConfig> {
        let cert = read_pem(&self.cert_path)
            .map_err(|source| TlsError::CertificateReadError { path: self.cert_path.clone(), source })?;
        ensure_not_empty(&self.cert_path, &cert)?;

        let key = read_pem(&self.key_path)
            .map_err(|source| TlsError::PrivateKeyReadError { path: self.key_path.clone(), source })?;
        ensure_not_empty(&self.key_path, &key)?;

        let mut tls = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

        if let Some(ca_path) = &self.client_ca_path {
            let ca = read_pem(ca_path)
                .map_err(|source| TlsError::ClientCaReadError { path: ca_path.clone(), source })?;
            ensure_not_empty(ca_path, &ca)?;
            tls = tls.client_ca_root(Certificate::from_pem(ca));
        }

        Ok(tls)
    }
}

fn read_pem(path: &Path) -> std::io::Result<Vec<u8>> {
    std::fs::read(path)
}

fn ensure_not_empty(path: &Path, contents: &[u8]) -> Result<()> {
    if contents.iter().all(u8::is_ascii_whitespace) {
        return Err(TlsError::EmptyPem { path: path.to_path_buf() }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ControlPlaneError;
    use std::io::Write;

    #[test]
    fn no_tls_when_unconfigured() {
        assert!(XdsTlsConfig::from_config(&XdsConfig::default()).unwrap().is_none());
    }

    #[test]
    fn key_without_certificate_is_rejected() {
        let config = XdsConfig { key_file: Some("key.pem".to_string()), ..Default::default() };
        let err = XdsTlsConfig::from_config(&config).unwrap_err();
        assert!(matches!(err, ControlPlaneError::Tls(TlsError::MissingCertificatePath)));
    }

    #[test]
    fn empty_pem_is_rejected() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "   ").unwrap();
        let config = XdsConfig {
            cert_file: Some(cert.path().display().to_string()),
            key_file: Some(cert.path().display().to_string()),
            ..Default::default()
        };

        let tls = XdsTlsConfig::from_config(&config).unwrap().unwrap();
        let err = tls.load().unwrap_err();
        assert!(matches!(err, ControlPlaneError::Tls(TlsError::EmptyPem { .. })));
    }

    #[test]
    fn missing_certificate_file_is_reported() {
        let config = XdsConfig {
            cert_file: Some("/nonexistent/cert.pem".to_string()),
            key_file: Some("/nonexistent/key.pem".to_string()),
            ..Default::default()
        };
        let tls = XdsTlsConfig::from_config(&config).unwrap().unwrap();
        let err = tls.load().unwrap_err();
        assert!(matches!(err, ControlPlaneError::Tls(TlsError::CertificateReadError { .. })));
    }
}
