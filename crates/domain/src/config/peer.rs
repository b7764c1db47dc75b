use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Peer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The remote peer to dial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// `host:port`.
    #[serde(default = "d_address")]
    pub address: String,
    /// When present the connection is wrapped in TLS.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            address: d_address(),
            tls: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM bundle of trusted roots.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    /// Client certificate chain (PEM), paired with `key_file`.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Overrides the name taken from `address` for certificate checks.
    #[serde(default)]
    pub server_name: Option<String>,
}

fn d_address() -> String {
    "127.0.0.1:3868".into()
}
