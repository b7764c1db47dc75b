//! Builder pattern for constructing a [`Client`].

use std::sync::Arc;
use std::time::Duration;

use diam_domain::config::ClientConfig;
use diam_protocol::{Applications, VendorSpecificApplication, DEFAULT_MAX_MESSAGE_BYTES};

use crate::client::Client;
use crate::registry::StateMachine;
use crate::retransmit::RetransmitPolicy;
use crate::types::Error;

/// Fluent builder for [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use diam_peer_sdk::{ClientBuilder, Settings, StateMachine};
/// let settings = Settings::builder("client.example.org", "example.org")
///     .acct_application_id(3)
///     .build();
/// let client = ClientBuilder::new()
///     .handler(StateMachine::new(settings))
///     .max_retransmits(3)
///     .retransmit_interval(std::time::Duration::from_millis(500))
///     .watchdog_interval(std::time::Duration::from_secs(30))
///     .build()
///     .unwrap();
/// ```
pub struct ClientBuilder {
    pub(crate) handler: Option<Arc<StateMachine>>,
    pub(crate) applications: Applications,
    pub(crate) supported_vendor_ids: Vec<u32>,
    pub(crate) retransmit: RetransmitPolicy,
    pub(crate) enable_watchdog: bool,
    pub(crate) watchdog_interval: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) answer_timeout: Duration,
    pub(crate) max_message_bytes: usize,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            handler: None,
            applications: Applications::default(),
            supported_vendor_ids: Vec::new(),
            retransmit: RetransmitPolicy::default(),
            enable_watchdog: true,
            watchdog_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            answer_timeout: Duration::from_secs(10),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Timings and limits from the `[client]` config section.
    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self::new()
            .max_retransmits(cfg.max_retransmits)
            .enable_watchdog(cfg.enable_watchdog)
            .watchdog_interval(cfg.watchdog_interval())
            .connect_timeout(cfg.connect_timeout())
            .answer_timeout(cfg.answer_timeout())
            .max_message_bytes(cfg.max_message_bytes)
            .retransmit_interval_opt(cfg.retransmit_interval())
    }

    // ── Required ─────────────────────────────────────────────────────

    /// The state machine that owns settings and dispatch.  Dialing without
    /// one fails with [`Error::MissingStateMachine`].
    pub fn handler(mut self, sm: impl Into<Arc<StateMachine>>) -> Self {
        self.handler = Some(sm.into());
        self
    }

    // ── Capability overrides ─────────────────────────────────────────

    /// Advertised in addition to the applications in the settings.
    pub fn auth_application_id(mut self, id: u32) -> Self {
        self.applications.auth.push(id);
        self
    }

    pub fn acct_application_id(mut self, id: u32) -> Self {
        self.applications.acct.push(id);
        self
    }

    pub fn vendor_specific_application(mut self, app: VendorSpecificApplication) -> Self {
        self.applications.vendor_specific.push(app);
        self
    }

    pub fn supported_vendor_id(mut self, id: u32) -> Self {
        self.supported_vendor_ids.push(id);
        self
    }

    // ── Retransmission / watchdog ────────────────────────────────────

    /// Resends after the first CER or DWR (default 0).
    pub fn max_retransmits(mut self, n: u32) -> Self {
        self.retransmit.max_retransmits = n;
        self
    }

    /// Answer window per attempt.  Unset: 1 s for the CER, the watchdog
    /// interval for DWRs.
    pub fn retransmit_interval(mut self, d: Duration) -> Self {
        self.retransmit.interval = Some(d);
        self
    }

    fn retransmit_interval_opt(mut self, d: Option<Duration>) -> Self {
        self.retransmit.interval = d;
        self
    }

    pub fn enable_watchdog(mut self, on: bool) -> Self {
        self.enable_watchdog = on;
        self
    }

    /// Time between DWRs (default 30s).
    pub fn watchdog_interval(mut self, d: Duration) -> Self {
        self.watchdog_interval = d;
        self
    }

    // ── Transport ────────────────────────────────────────────────────

    /// Bound on TCP connect plus TLS handshake (default 5s).
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    /// How long [`Connection::send_request`](crate::Connection::send_request)
    /// waits (default 10s).
    pub fn answer_timeout(mut self, d: Duration) -> Self {
        self.answer_timeout = d;
        self
    }

    /// Maximum inbound message size (default 64 KB).
    pub fn max_message_bytes(mut self, n: usize) -> Self {
        self.max_message_bytes = n;
        self
    }

    /// Build the [`Client`].
    pub fn build(self) -> Result<Client, Error> {
        if self.retransmit.interval.is_some_and(|d| d.is_zero()) {
            return Err(Error::Config("retransmit_interval must be greater than 0".into()));
        }
        if self.enable_watchdog && self.watchdog_interval.is_zero() {
            return Err(Error::Config("watchdog_interval must be greater than 0".into()));
        }
        if self.max_message_bytes < diam_protocol::message::HEADER_LEN {
            return Err(Error::Config(format!(
                "max_message_bytes must be at least {}",
                diam_protocol::message::HEADER_LEN
            )));
        }

        Ok(self.into_client())
    }

    pub(crate) fn into_client(self) -> Client {
        Client {
            handler: self.handler,
            applications: self.applications,
            supported_vendor_ids: self.supported_vendor_ids,
            retransmit: self.retransmit,
            enable_watchdog: self.enable_watchdog,
            watchdog_interval: self.watchdog_interval,
            connect_timeout: self.connect_timeout,
            answer_timeout: self.answer_timeout,
            max_message_bytes: self.max_message_bytes,
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diam_domain::config::Config;

    #[test]
    fn defaults() {
        let client = ClientBuilder::new().build().unwrap();
        assert!(client.handler.is_none());
        assert_eq!(client.retransmit, RetransmitPolicy::default());
        assert_eq!(client.watchdog_interval, Duration::from_secs(30));
        assert!(client.enable_watchdog);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        assert!(matches!(
            ClientBuilder::new().retransmit_interval(Duration::ZERO).build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ClientBuilder::new().watchdog_interval(Duration::ZERO).build(),
            Err(Error::Config(_))
        ));
        assert!(ClientBuilder::new()
            .enable_watchdog(false)
            .watchdog_interval(Duration::ZERO)
            .build()
            .is_ok());
    }

    #[test]
    fn from_config_maps_timings() {
        let cfg = Config::from_toml(
            "[client]\nmax_retransmits = 2\nretransmit_interval_ms = 250\nenable_watchdog = false\n",
        )
        .unwrap();
        let client = ClientBuilder::from_config(&cfg.client).build().unwrap();
        assert_eq!(
            client.retransmit,
            RetransmitPolicy::new(2, Some(Duration::from_millis(250)))
        );
        assert!(!client.enable_watchdog);
    }
}
