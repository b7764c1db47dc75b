//! Diameter message: 20-byte header followed by AVPs.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::avp::{get_u24, put_u24, Avp};
use crate::codec::CodecError;
use crate::dict::{self, avp as code};
use crate::PROTOCOL_VERSION;

/// `R` bit: the message is a request.
pub const FLAG_REQUEST: u8 = 0x80;
/// `P` bit: the message may be proxied.
pub const FLAG_PROXIABLE: u8 = 0x40;
/// `E` bit: the answer carries a protocol error.
pub const FLAG_ERROR: u8 = 0x20;
/// `T` bit: potentially retransmitted after a link failover.
pub const FLAG_RETRANSMIT: u8 = 0x10;

pub const HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub flags: u8,
    pub command_code: u32,
    pub application_id: u32,
    pub hop_by_hop: u32,
    pub end_to_end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub avps: Vec<Avp>,
}

impl Message {
    /// New request.  Hop-by-hop and end-to-end identifiers start at zero;
    /// the sender stamps them right before the first transmission.
    pub fn request(command_code: u32, application_id: u32) -> Self {
        Self {
            header: Header {
                flags: FLAG_REQUEST,
                command_code,
                application_id,
                hop_by_hop: 0,
                end_to_end: 0,
            },
            avps: Vec::new(),
        }
    }

    /// Answer skeleton for this request: same command, application and
    /// identifiers, `R` and `T` cleared, Session-Id copied, Result-Code set.
    pub fn answer(&self, result_code: u32) -> Self {
        let mut answer = Self {
            header: Header {
                flags: self.header.flags & FLAG_PROXIABLE,
                ..self.header
            },
            avps: Vec::new(),
        };
        if let Some(session) = self.find(code::SESSION_ID) {
            answer.avps.push(session.clone());
        }
        answer.avps.push(Avp::mandatory(code::RESULT_CODE, result_code));
        answer
    }

    /// Builder-style AVP append.
    pub fn with(mut self, avp: Avp) -> Self {
        self.avps.push(avp);
        self
    }

    pub fn push(&mut self, avp: Avp) {
        self.avps.push(avp);
    }

    pub fn is_request(&self) -> bool {
        self.header.flags & FLAG_REQUEST != 0
    }

    pub fn is_error(&self) -> bool {
        self.header.flags & FLAG_ERROR != 0
    }

    pub fn set_error(&mut self) {
        self.header.flags |= FLAG_ERROR;
    }

    pub fn command_code(&self) -> u32 {
        self.header.command_code
    }

    pub fn hop_by_hop(&self) -> u32 {
        self.header.hop_by_hop
    }

    /// Short name (`CER`, `DWA`, ...).
    pub fn name(&self) -> String {
        dict::command_name(self.header.command_code, self.is_request())
    }

    /// First top-level AVP with the given code.
    pub fn find(&self, code: u32) -> Option<&Avp> {
        self.avps.iter().find(|a| a.code == code)
    }

    /// All top-level AVPs with the given code, in wire order.
    pub fn find_all(&self, code: u32) -> impl Iterator<Item = &Avp> + '_ {
        self.avps.iter().filter(move |a| a.code == code)
    }

    pub fn result_code(&self) -> Option<u32> {
        self.find(code::RESULT_CODE).and_then(|a| a.data.as_u32())
    }

    /// Message Length field: header plus padded AVPs.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.avps.iter().map(Avp::padded_len).sum::<usize>()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        let len = self.encoded_len();
        dst.reserve(len);
        dst.put_u8(PROTOCOL_VERSION);
        put_u24(dst, len as u32);
        dst.put_u8(self.header.flags);
        put_u24(dst, self.header.command_code);
        dst.put_u32(self.header.application_id);
        dst.put_u32(self.header.hop_by_hop);
        dst.put_u32(self.header.end_to_end);
        for avp in &self.avps {
            avp.encode(dst);
        }
    }

    /// Decode one complete message.  `src` must hold exactly the bytes
    /// announced by the Message Length field.
    pub fn decode(mut src: Bytes) -> Result<Self, CodecError> {
        if src.remaining() < HEADER_LEN {
            return Err(CodecError::Truncated);
        }
        let version = src.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let _length = get_u24(&mut src);
        let flags = src.get_u8();
        let command_code = get_u24(&mut src);
        let header = Header {
            flags,
            command_code,
            application_id: src.get_u32(),
            hop_by_hop: src.get_u32(),
            end_to_end: src.get_u32(),
        };

        let mut avps = Vec::new();
        while src.has_remaining() {
            avps.push(Avp::decode(&mut src)?);
        }
        Ok(Self { header, avps })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} app={} hbh={:#010x} e2e={:#010x} avps={}",
            self.name(),
            self.header.application_id,
            self.header.hop_by_hop,
            self.header.end_to_end,
            self.avps.len()
        )
    }
}
