//! Errors, close reasons and the values the peer procedures publish.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use diam_protocol::{Applications, Avp, CapabilitiesAnswer, DisconnectCause, ParseError};

/// Top-level SDK error.
///
/// Every failed [`dial`](crate::Client::dial) returns exactly one of these
/// and never a half-open connection.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("missing state machine: set a handler before dialing")]
    MissingStateMachine,

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The peer answered with a non-success Result-Code.  `avps` is the full
    /// answer body so callers can look at Error-Message or Failed-AVP.
    #[error("failed Result-Code AVP: {code}")]
    FailedResultCode { code: u32, avps: Vec<Avp> },

    #[error("unexpected Origin-State-Id: sent {sent}, received {received}")]
    UnexpectedOriginStateId { sent: u32, received: u32 },

    #[error("handshake timeout: no CEA after {attempts} attempts")]
    HandshakeTimeout { attempts: u32 },

    #[error("no answer within {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("connection closed: {0}")]
    Closed(CloseReason),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    #[error("config: {0}")]
    Config(String),
}

impl From<diam_domain::Error> for Error {
    fn from(e: diam_domain::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Why a connection went away.  Carried by the close signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// [`Connection::close`](crate::Connection::close) or a completed
    /// disconnect.
    Local,
    HandshakeFailed,
    /// Device-Watchdog retransmissions ran out.
    WatchdogExpired,
    /// The peer sent a DPR.
    PeerDisconnect(DisconnectCause),
    /// The peer closed the transport.
    Eof,
    Transport(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Local => f.write_str("closed locally"),
            CloseReason::HandshakeFailed => f.write_str("handshake failed"),
            CloseReason::WatchdogExpired => f.write_str("watchdog expired"),
            CloseReason::PeerDisconnect(cause) => write!(f, "peer disconnected ({cause})"),
            CloseReason::Eof => f.write_str("peer closed the transport"),
            CloseReason::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    RequestSent,
    AwaitingAnswer,
    Established,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Inactive,
    RequestSent,
    AwaitingAnswer,
    Closed,
}

/// What the peer told us in its CEA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCapabilities {
    pub origin_host: String,
    pub origin_realm: String,
    pub result_code: u32,
    pub origin_state_id: u32,
    pub host_ip_addresses: Vec<IpAddr>,
    pub vendor_id: Option<u32>,
    pub product_name: Option<String>,
    pub applications: Applications,
}

impl From<CapabilitiesAnswer> for PeerCapabilities {
    fn from(cea: CapabilitiesAnswer) -> Self {
        Self {
            origin_host: cea.origin_host,
            origin_realm: cea.origin_realm,
            result_code: cea.result_code,
            origin_state_id: cea.origin_state_id,
            host_ip_addresses: cea.host_ip_addresses,
            vendor_id: cea.vendor_id,
            product_name: cea.product_name,
            applications: cea.applications,
        }
    }
}

/// Published after every successful watchdog exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogReport {
    pub origin_host: String,
    pub origin_realm: String,
    pub origin_state_id: Option<u32>,
    pub result_code: u32,
    pub received_at: DateTime<Utc>,
}
