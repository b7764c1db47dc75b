mod client;
mod identity;
mod peer;

pub use client::*;
pub use identity::*;
pub use peer::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// Smallest frame the codec can carry: a bare 20-byte header.
const MIN_MESSAGE_BYTES: usize = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub peer: PeerConfig,
}

impl Config {
    /// Read and parse a TOML file.  A missing file is an error; callers that
    /// want defaults should check for existence first.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Like [`Config::validate`], but fails on the first error-level issue.
    pub fn validated(self) -> Result<Self> {
        match self
            .validate()
            .into_iter()
            .find(|issue| issue.severity == ConfigSeverity::Error)
        {
            Some(issue) => Err(Error::Config(issue.to_string())),
            None => Ok(self),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.identity.origin_host.is_empty() {
            errors.push(ConfigError::error(
                "identity.origin_host",
                "origin_host must not be empty",
            ));
        }
        if self.identity.origin_realm.is_empty() {
            errors.push(ConfigError::error(
                "identity.origin_realm",
                "origin_realm must not be empty",
            ));
        }
        if !self.identity.has_applications() {
            errors.push(ConfigError::error(
                "identity",
                "declare at least one auth, acct or vendor-specific application id",
            ));
        }
        if self.identity.origin_state_id == Some(0) {
            errors.push(ConfigError::error(
                "identity.origin_state_id",
                "origin_state_id must be non-zero",
            ));
        }
        for (i, vsa) in self.identity.vendor_specific_applications.iter().enumerate() {
            if vsa.auth_application_id.is_none() && vsa.acct_application_id.is_none() {
                errors.push(ConfigError::error(
                    format!("identity.vendor_specific_applications[{i}]"),
                    "needs auth_application_id or acct_application_id",
                ));
            }
        }

        if self.client.retransmit_interval_ms == Some(0) {
            errors.push(ConfigError::error(
                "client.retransmit_interval_ms",
                "retransmit interval must be greater than 0",
            ));
        }
        if self.client.enable_watchdog && self.client.watchdog_interval_ms == 0 {
            errors.push(ConfigError::error(
                "client.watchdog_interval_ms",
                "watchdog interval must be greater than 0",
            ));
        }
        if self.client.max_message_bytes < MIN_MESSAGE_BYTES {
            errors.push(ConfigError::error(
                "client.max_message_bytes",
                format!("must be at least {MIN_MESSAGE_BYTES}"),
            ));
        }
        if self.client.enable_watchdog && self.client.watchdog_interval_ms < 6_000 {
            // RFC 3539 floors Tw at 6 s; shorter is only useful in tests.
            errors.push(ConfigError::warning(
                "client.watchdog_interval_ms",
                "watchdog interval below 6000 ms",
            ));
        }

        if self.peer.address.is_empty() {
            errors.push(ConfigError::error("peer.address", "address must not be empty"));
        }
        if let Some(tls) = &self.peer.tls {
            if tls.cert_file.is_some() != tls.key_file.is_some() {
                errors.push(ConfigError::error(
                    "peer.tls",
                    "cert_file and key_file must be set together",
                ));
            }
            if tls.ca_file.is_none() {
                errors.push(ConfigError::error(
                    "peer.tls.ca_file",
                    "ca_file is required to verify the peer certificate",
                ));
            }
        }

        errors
    }
}
