//! Client-side TLS material for [`Client::dial_tls`](crate::Client::dial_tls).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use diam_domain::config::TlsConfig;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::TlsConnector;

use crate::types::Error;

/// Trusted roots, an optional client certificate, and an optional server
/// name override.
pub struct TlsCredentials {
    roots: RootCertStore,
    identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
    server_name: Option<String>,
}

impl TlsCredentials {
    pub fn new() -> Self {
        Self {
            roots: RootCertStore::empty(),
            identity: None,
            server_name: None,
        }
    }

    pub fn with_root(mut self, cert: CertificateDer<'static>) -> Result<Self, Error> {
        self.roots.add(cert)?;
        Ok(self)
    }

    /// Trust every certificate in a PEM bundle.
    pub fn with_root_pem(mut self, pem: &[u8]) -> Result<Self, Error> {
        let certs = parse_certificates(pem)?;
        if certs.is_empty() {
            return Err(Error::Config("no CA certificates found".into()));
        }
        for cert in certs {
            self.roots.add(cert)?;
        }
        Ok(self)
    }

    pub fn with_root_file(self, path: impl AsRef<Path>) -> Result<Self, Error> {
        let pem = read(path.as_ref())?;
        self.with_root_pem(&pem)
    }

    /// Present a client certificate during the TLS handshake.
    pub fn with_client_identity(
        mut self,
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Self {
        self.identity = Some((chain, key));
        self
    }

    pub fn with_client_identity_files(
        self,
        cert: impl AsRef<Path>,
        key: impl AsRef<Path>,
    ) -> Result<Self, Error> {
        let chain = parse_certificates(&read(cert.as_ref())?)?;
        if chain.is_empty() {
            return Err(Error::Config(format!(
                "no certificates in {}",
                cert.as_ref().display()
            )));
        }
        let key = PrivateKeyDer::from_pem_slice(&read(key.as_ref())?)
            .map_err(|e| Error::Config(format!("failed to parse private key: {e}")))?;
        Ok(self.with_client_identity(chain, key))
    }

    /// Name to verify the peer certificate against, instead of the host part
    /// of the dialed address.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn from_config(cfg: &TlsConfig) -> Result<Self, Error> {
        let mut creds = Self::new();
        match &cfg.ca_file {
            Some(ca) => creds = creds.with_root_file(ca)?,
            None => return Err(Error::Config("peer.tls.ca_file is required".into())),
        }
        match (&cfg.cert_file, &cfg.key_file) {
            (Some(cert), Some(key)) => creds = creds.with_client_identity_files(cert, key)?,
            (None, None) => {}
            _ => {
                return Err(Error::Config(
                    "peer.tls.cert_file and key_file must be set together".into(),
                ))
            }
        }
        if let Some(name) = &cfg.server_name {
            creds = creds.with_server_name(name.clone());
        }
        Ok(creds)
    }

    pub(crate) fn connector(&self) -> Result<TlsConnector, Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(self.roots.clone());
        let config = match &self.identity {
            Some((chain, key)) => builder.with_client_auth_cert(chain.clone(), key.clone_key())?,
            None => builder.with_no_client_auth(),
        };
        Ok(TlsConnector::from(Arc::new(config)))
    }

    /// The configured override, else the host part of `addr`.
    pub(crate) fn server_name(&self, addr: &str) -> Result<ServerName<'static>, Error> {
        let host = match &self.server_name {
            Some(name) => name.clone(),
            None => host_of(addr).to_string(),
        };
        ServerName::try_from(host.clone()).map_err(|_| Error::InvalidServerName(host))
    }
}

impl Default for TlsCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TlsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsCredentials")
            .field("roots", &self.roots.len())
            .field("client_identity", &self.identity.is_some())
            .field("server_name", &self.server_name)
            .finish()
    }
}

fn read(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, Error> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("failed to parse certificates: {e}")))
}

/// `host:port`, `[v6]:port` or a bare host.
fn host_of(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_taken_from_address() {
        assert_eq!(host_of("peer.example.org:5658"), "peer.example.org");
        assert_eq!(host_of("[::1]:5658"), "::1");
        assert_eq!(host_of("localhost"), "localhost");
    }

    #[test]
    fn server_name_override_wins() {
        let creds = TlsCredentials::new().with_server_name("aaa.example.org");
        let name = creds.server_name("127.0.0.1:5658").unwrap();
        assert_eq!(name.to_str(), "aaa.example.org");
    }

    #[test]
    fn ip_addresses_are_valid_server_names() {
        assert!(TlsCredentials::new().server_name("127.0.0.1:5658").is_ok());
    }

    #[test]
    fn invalid_server_name_is_rejected() {
        let creds = TlsCredentials::new().with_server_name("not a host name");
        assert!(matches!(
            creds.server_name("127.0.0.1:5658"),
            Err(Error::InvalidServerName(_))
        ));
    }

    #[test]
    fn empty_pem_is_rejected() {
        assert!(matches!(
            TlsCredentials::new().with_root_pem(b""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn config_without_ca_is_rejected() {
        let err = TlsCredentials::from_config(&TlsConfig::default()).unwrap_err();
        assert!(err.to_string().contains("ca_file"));
    }
}
