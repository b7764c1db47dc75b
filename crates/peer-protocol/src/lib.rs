//! Diameter wire model: messages, AVPs, a base-protocol dictionary, a framed
//! codec and parsers for the peer-management commands.
//!
//! Only what the capabilities-exchange, device-watchdog and disconnect-peer
//! procedures need lives here.  Application dictionaries are out of scope:
//! AVPs this crate does not know decode as `OctetString`.

pub mod avp;
pub mod codec;
pub mod dict;
pub mod message;
pub mod parser;

pub use avp::{Avp, AvpData};
pub use codec::{CodecError, DiameterCodec, DEFAULT_MAX_MESSAGE_BYTES};
pub use message::{Header, Message};
pub use parser::{
    Applications, CapabilitiesAnswer, CapabilitiesRequest, DisconnectCause, DisconnectRequest,
    ParseError, VendorSpecificApplication, WatchdogAnswer, WatchdogRequest,
};

/// Diameter protocol version carried in every header.
pub const PROTOCOL_VERSION: u8 = 1;

/// IANA-assigned port for Diameter over TCP/SCTP.
pub const DEFAULT_PORT: u16 = 3868;

/// IANA-assigned port for Diameter over TLS.
pub const DEFAULT_TLS_PORT: u16 = 5658;
