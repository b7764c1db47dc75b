//! Structural parsers for the peer-management commands.
//!
//! Each parser checks that the AVPs mandatory for its command are present and
//! well typed, and returns a typed view of the message.  Semantic checks
//! (result codes, state ids) are left to the caller.

use std::fmt;
use std::net::IpAddr;

use crate::avp::Avp;
use crate::dict::{self, avp as code, command};
use crate::message::Message;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("missing Origin-Host AVP")]
    MissingOriginHost,

    #[error("missing Origin-Realm AVP")]
    MissingOriginRealm,

    #[error("missing Result-Code AVP")]
    MissingResultCode,

    #[error("missing Origin-State-Id AVP")]
    MissingOriginStateId,

    #[error("missing application: no Auth-Application-Id, Acct-Application-Id or Vendor-Specific-Application-Id")]
    MissingApplication,

    #[error("unexpected message {found}, want {expected}")]
    UnexpectedCommand { expected: String, found: String },

    #[error("invalid {avp} AVP: {reason}")]
    InvalidAvp { avp: &'static str, reason: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Applications
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One Vendor-Specific-Application-Id grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorSpecificApplication {
    pub vendor_id: u32,
    pub auth_application_id: Option<u32>,
    pub acct_application_id: Option<u32>,
}

impl VendorSpecificApplication {
    pub fn auth(vendor_id: u32, application_id: u32) -> Self {
        Self {
            vendor_id,
            auth_application_id: Some(application_id),
            acct_application_id: None,
        }
    }

    pub fn acct(vendor_id: u32, application_id: u32) -> Self {
        Self {
            vendor_id,
            auth_application_id: None,
            acct_application_id: Some(application_id),
        }
    }

    pub fn to_avp(&self) -> Avp {
        let mut group = vec![Avp::mandatory(code::VENDOR_ID, self.vendor_id)];
        if let Some(id) = self.auth_application_id {
            group.push(Avp::mandatory(code::AUTH_APPLICATION_ID, id));
        }
        if let Some(id) = self.acct_application_id {
            group.push(Avp::mandatory(code::ACCT_APPLICATION_ID, id));
        }
        Avp::mandatory(code::VENDOR_SPECIFIC_APPLICATION_ID, group)
    }

    fn from_avp(avp: &Avp) -> Result<Self, ParseError> {
        let vendor_id = avp
            .find(code::VENDOR_ID)
            .and_then(|a| a.data.as_u32())
            .ok_or_else(|| ParseError::InvalidAvp {
                avp: dict::avp_name(code::VENDOR_SPECIFIC_APPLICATION_ID),
                reason: "missing Vendor-Id".into(),
            })?;
        let app = Self {
            vendor_id,
            auth_application_id: avp.find(code::AUTH_APPLICATION_ID).and_then(|a| a.data.as_u32()),
            acct_application_id: avp.find(code::ACCT_APPLICATION_ID).and_then(|a| a.data.as_u32()),
        };
        if app.auth_application_id.is_none() && app.acct_application_id.is_none() {
            return Err(ParseError::InvalidAvp {
                avp: dict::avp_name(code::VENDOR_SPECIFIC_APPLICATION_ID),
                reason: "no application id".into(),
            });
        }
        Ok(app)
    }
}

/// Applications advertised in a capabilities exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applications {
    pub auth: Vec<u32>,
    pub acct: Vec<u32>,
    pub vendor_specific: Vec<VendorSpecificApplication>,
}

impl Applications {
    pub fn is_empty(&self) -> bool {
        self.auth.is_empty() && self.acct.is_empty() && self.vendor_specific.is_empty()
    }

    /// Union of two sets, preserving order and dropping duplicates.
    pub fn merged(&self, other: &Applications) -> Applications {
        let mut out = self.clone();
        for id in &other.auth {
            if !out.auth.contains(id) {
                out.auth.push(*id);
            }
        }
        for id in &other.acct {
            if !out.acct.contains(id) {
                out.acct.push(*id);
            }
        }
        for vsa in &other.vendor_specific {
            if !out.vendor_specific.contains(vsa) {
                out.vendor_specific.push(*vsa);
            }
        }
        out
    }

    /// AVPs in the order RFC 6733 lists them in the CER grammar.
    pub fn to_avps(&self) -> Vec<Avp> {
        let auth = self.auth.iter().map(|id| Avp::mandatory(code::AUTH_APPLICATION_ID, *id));
        let acct = self.acct.iter().map(|id| Avp::mandatory(code::ACCT_APPLICATION_ID, *id));
        let vsa = self.vendor_specific.iter().map(VendorSpecificApplication::to_avp);
        auth.chain(acct).chain(vsa).collect()
    }

    fn from_message(msg: &Message) -> Result<Self, ParseError> {
        let apps = Self {
            auth: u32_values(msg, code::AUTH_APPLICATION_ID),
            acct: u32_values(msg, code::ACCT_APPLICATION_ID),
            vendor_specific: msg
                .find_all(code::VENDOR_SPECIFIC_APPLICATION_ID)
                .map(VendorSpecificApplication::from_avp)
                .collect::<Result<_, _>>()?,
        };
        if apps.is_empty() {
            return Err(ParseError::MissingApplication);
        }
        Ok(apps)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capabilities exchange
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitiesRequest {
    pub origin_host: String,
    pub origin_realm: String,
    pub origin_state_id: Option<u32>,
    pub host_ip_addresses: Vec<IpAddr>,
    pub vendor_id: Option<u32>,
    pub product_name: Option<String>,
    pub supported_vendor_ids: Vec<u32>,
    pub applications: Applications,
    pub firmware_revision: Option<u32>,
}

impl CapabilitiesRequest {
    pub fn parse(msg: &Message) -> Result<Self, ParseError> {
        expect_command(msg, command::CAPABILITIES_EXCHANGE, true)?;
        Ok(Self {
            origin_host: identity(msg, code::ORIGIN_HOST, ParseError::MissingOriginHost)?,
            origin_realm: identity(msg, code::ORIGIN_REALM, ParseError::MissingOriginRealm)?,
            origin_state_id: optional_u32(msg, code::ORIGIN_STATE_ID)?,
            host_ip_addresses: addresses(msg),
            vendor_id: optional_u32(msg, code::VENDOR_ID)?,
            product_name: optional_str(msg, code::PRODUCT_NAME),
            supported_vendor_ids: u32_values(msg, code::SUPPORTED_VENDOR_ID),
            applications: Applications::from_message(msg)?,
            firmware_revision: optional_u32(msg, code::FIRMWARE_REVISION)?,
        })
    }
}

/// Typed view of a CEA.  Origin-State-Id is mandatory here: the answer must
/// echo the value this node sent so stale sessions are detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitiesAnswer {
    pub origin_host: String,
    pub origin_realm: String,
    pub result_code: u32,
    pub origin_state_id: u32,
    pub host_ip_addresses: Vec<IpAddr>,
    pub vendor_id: Option<u32>,
    pub product_name: Option<String>,
    pub applications: Applications,
    pub error_message: Option<String>,
}

impl CapabilitiesAnswer {
    pub fn parse(msg: &Message) -> Result<Self, ParseError> {
        expect_command(msg, command::CAPABILITIES_EXCHANGE, false)?;
        Ok(Self {
            origin_host: identity(msg, code::ORIGIN_HOST, ParseError::MissingOriginHost)?,
            origin_realm: identity(msg, code::ORIGIN_REALM, ParseError::MissingOriginRealm)?,
            result_code: required_u32(msg, code::RESULT_CODE, ParseError::MissingResultCode)?,
            origin_state_id: required_u32(
                msg,
                code::ORIGIN_STATE_ID,
                ParseError::MissingOriginStateId,
            )?,
            host_ip_addresses: addresses(msg),
            vendor_id: optional_u32(msg, code::VENDOR_ID)?,
            product_name: optional_str(msg, code::PRODUCT_NAME),
            applications: Applications::from_message(msg)?,
            error_message: optional_str(msg, code::ERROR_MESSAGE),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Device watchdog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogRequest {
    pub origin_host: String,
    pub origin_realm: String,
    pub origin_state_id: Option<u32>,
}

impl WatchdogRequest {
    pub fn parse(msg: &Message) -> Result<Self, ParseError> {
        expect_command(msg, command::DEVICE_WATCHDOG, true)?;
        Ok(Self {
            origin_host: identity(msg, code::ORIGIN_HOST, ParseError::MissingOriginHost)?,
            origin_realm: identity(msg, code::ORIGIN_REALM, ParseError::MissingOriginRealm)?,
            origin_state_id: optional_u32(msg, code::ORIGIN_STATE_ID)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogAnswer {
    pub origin_host: String,
    pub origin_realm: String,
    pub result_code: u32,
    pub origin_state_id: Option<u32>,
}

impl WatchdogAnswer {
    pub fn parse(msg: &Message) -> Result<Self, ParseError> {
        expect_command(msg, command::DEVICE_WATCHDOG, false)?;
        Ok(Self {
            origin_host: identity(msg, code::ORIGIN_HOST, ParseError::MissingOriginHost)?,
            origin_realm: identity(msg, code::ORIGIN_REALM, ParseError::MissingOriginRealm)?,
            result_code: required_u32(msg, code::RESULT_CODE, ParseError::MissingResultCode)?,
            origin_state_id: optional_u32(msg, code::ORIGIN_STATE_ID)?,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Disconnect peer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Disconnect-Cause values (RFC 6733 §5.4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    Rebooting,
    Busy,
    DoNotWantToTalkToYou,
    Other(i32),
}

impl DisconnectCause {
    pub fn code(self) -> i32 {
        match self {
            DisconnectCause::Rebooting => 0,
            DisconnectCause::Busy => 1,
            DisconnectCause::DoNotWantToTalkToYou => 2,
            DisconnectCause::Other(v) => v,
        }
    }
}

impl From<i32> for DisconnectCause {
    fn from(v: i32) -> Self {
        match v {
            0 => DisconnectCause::Rebooting,
            1 => DisconnectCause::Busy,
            2 => DisconnectCause::DoNotWantToTalkToYou,
            other => DisconnectCause::Other(other),
        }
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectCause::Rebooting => f.write_str("REBOOTING"),
            DisconnectCause::Busy => f.write_str("BUSY"),
            DisconnectCause::DoNotWantToTalkToYou => f.write_str("DO_NOT_WANT_TO_TALK_TO_YOU"),
            DisconnectCause::Other(v) => write!(f, "cause {v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRequest {
    pub origin_host: String,
    pub origin_realm: String,
    pub cause: DisconnectCause,
}

impl DisconnectRequest {
    pub fn parse(msg: &Message) -> Result<Self, ParseError> {
        expect_command(msg, command::DISCONNECT_PEER, true)?;
        let cause = msg
            .find(code::DISCONNECT_CAUSE)
            .map(|a| {
                a.data.as_i32().ok_or_else(|| ParseError::InvalidAvp {
                    avp: dict::avp_name(code::DISCONNECT_CAUSE),
                    reason: "expected Enumerated".into(),
                })
            })
            .transpose()?
            .map(DisconnectCause::from)
            .unwrap_or(DisconnectCause::Rebooting);
        Ok(Self {
            origin_host: identity(msg, code::ORIGIN_HOST, ParseError::MissingOriginHost)?,
            origin_realm: identity(msg, code::ORIGIN_REALM, ParseError::MissingOriginRealm)?,
            cause,
        })
    }
}

// ── helpers ──────────────────────────────────────────────────────────

fn expect_command(msg: &Message, code: u32, request: bool) -> Result<(), ParseError> {
    if msg.command_code() == code && msg.is_request() == request {
        return Ok(());
    }
    Err(ParseError::UnexpectedCommand {
        expected: dict::command_name(code, request),
        found: msg.name(),
    })
}

fn identity(msg: &Message, code: u32, missing: ParseError) -> Result<String, ParseError> {
    let avp = msg.find(code).ok_or(missing)?;
    match avp.data.as_str() {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(ParseError::InvalidAvp {
            avp: dict::avp_name(code),
            reason: "expected non-empty DiameterIdentity".into(),
        }),
    }
}

fn required_u32(msg: &Message, code: u32, missing: ParseError) -> Result<u32, ParseError> {
    optional_u32(msg, code)?.ok_or(missing)
}

fn optional_u32(msg: &Message, code: u32) -> Result<Option<u32>, ParseError> {
    msg.find(code)
        .map(|a| {
            a.data.as_u32().ok_or_else(|| ParseError::InvalidAvp {
                avp: dict::avp_name(code),
                reason: "expected Unsigned32".into(),
            })
        })
        .transpose()
}

fn optional_str(msg: &Message, code: u32) -> Option<String> {
    msg.find(code).and_then(|a| a.data.as_str()).map(str::to_string)
}

fn u32_values(msg: &Message, code: u32) -> Vec<u32> {
    msg.find_all(code).filter_map(|a| a.data.as_u32()).collect()
}

fn addresses(msg: &Message) -> Vec<IpAddr> {
    msg.find_all(code::HOST_IP_ADDRESS)
        .filter_map(|a| a.data.as_address())
        .collect()
}
