//! Attribute-value pairs and their wire encoding.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::CodecError;
use crate::dict::{self, AvpType};

/// `V` bit: a Vendor-Id field follows the AVP header.
pub const FLAG_VENDOR: u8 = 0x80;
/// `M` bit: the receiver must understand this AVP.
pub const FLAG_MANDATORY: u8 = 0x40;
/// `P` bit: reserved for end-to-end security.
pub const FLAG_PROTECTED: u8 = 0x20;

const HEADER_LEN: usize = 8;
const VENDOR_HEADER_LEN: usize = 12;

const FAMILY_IPV4: u16 = 1;
const FAMILY_IPV6: u16 = 2;

/// Decoded AVP payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvpData {
    Unsigned32(u32),
    Unsigned64(u64),
    Integer32(i32),
    OctetString(Bytes),
    Utf8String(String),
    DiameterIdentity(String),
    Address(IpAddr),
    Grouped(Vec<Avp>),
}

impl AvpData {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            AvpData::Unsigned32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            AvpData::Integer32(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of `Utf8String` and `DiameterIdentity` payloads.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AvpData::Utf8String(s) | AvpData::DiameterIdentity(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<IpAddr> {
        match self {
            AvpData::Address(ip) => Some(*ip),
            _ => None,
        }
    }

    pub fn as_grouped(&self) -> Option<&[Avp]> {
        match self {
            AvpData::Grouped(avps) => Some(avps),
            _ => None,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            AvpData::Unsigned32(_) | AvpData::Integer32(_) => 4,
            AvpData::Unsigned64(_) => 8,
            AvpData::OctetString(b) => b.len(),
            AvpData::Utf8String(s) | AvpData::DiameterIdentity(s) => s.len(),
            AvpData::Address(IpAddr::V4(_)) => 2 + 4,
            AvpData::Address(IpAddr::V6(_)) => 2 + 16,
            AvpData::Grouped(avps) => avps.iter().map(Avp::padded_len).sum(),
        }
    }

    fn encode(&self, dst: &mut BytesMut) {
        match self {
            AvpData::Unsigned32(v) => dst.put_u32(*v),
            AvpData::Integer32(v) => dst.put_i32(*v),
            AvpData::Unsigned64(v) => dst.put_u64(*v),
            AvpData::OctetString(b) => dst.put_slice(b),
            AvpData::Utf8String(s) | AvpData::DiameterIdentity(s) => dst.put_slice(s.as_bytes()),
            AvpData::Address(IpAddr::V4(ip)) => {
                dst.put_u16(FAMILY_IPV4);
                dst.put_slice(&ip.octets());
            }
            AvpData::Address(IpAddr::V6(ip)) => {
                dst.put_u16(FAMILY_IPV6);
                dst.put_slice(&ip.octets());
            }
            AvpData::Grouped(avps) => {
                for avp in avps {
                    avp.encode(dst);
                }
            }
        }
    }

    fn decode(ty: AvpType, code: u32, mut data: Bytes) -> Result<Self, CodecError> {
        let invalid = |reason: &str| CodecError::InvalidAvp {
            code,
            reason: reason.to_string(),
        };
        let value = match ty {
            AvpType::Unsigned32 => {
                if data.len() != 4 {
                    return Err(invalid("Unsigned32 must be 4 bytes"));
                }
                AvpData::Unsigned32(data.get_u32())
            }
            AvpType::Integer32 => {
                if data.len() != 4 {
                    return Err(invalid("Integer32 must be 4 bytes"));
                }
                AvpData::Integer32(data.get_i32())
            }
            AvpType::Unsigned64 => {
                if data.len() != 8 {
                    return Err(invalid("Unsigned64 must be 8 bytes"));
                }
                AvpData::Unsigned64(data.get_u64())
            }
            AvpType::OctetString => AvpData::OctetString(data),
            AvpType::Utf8String => AvpData::Utf8String(
                String::from_utf8(data.to_vec()).map_err(|_| invalid("invalid UTF-8"))?,
            ),
            AvpType::DiameterIdentity => AvpData::DiameterIdentity(
                String::from_utf8(data.to_vec()).map_err(|_| invalid("invalid UTF-8"))?,
            ),
            AvpType::Address => {
                if data.len() < 2 {
                    return Err(invalid("address family missing"));
                }
                match (data.get_u16(), data.len()) {
                    (FAMILY_IPV4, 4) => {
                        let mut octets = [0u8; 4];
                        data.copy_to_slice(&mut octets);
                        AvpData::Address(IpAddr::V4(Ipv4Addr::from(octets)))
                    }
                    (FAMILY_IPV6, 16) => {
                        let mut octets = [0u8; 16];
                        data.copy_to_slice(&mut octets);
                        AvpData::Address(IpAddr::V6(Ipv6Addr::from(octets)))
                    }
                    (family, len) => {
                        return Err(invalid(&format!(
                            "unsupported address family {family} with {len} bytes"
                        )))
                    }
                }
            }
            AvpType::Grouped => {
                let mut avps = Vec::new();
                while data.has_remaining() {
                    avps.push(Avp::decode(&mut data)?);
                }
                AvpData::Grouped(avps)
            }
        };
        Ok(value)
    }
}

impl From<u32> for AvpData {
    fn from(v: u32) -> Self {
        AvpData::Unsigned32(v)
    }
}

impl From<IpAddr> for AvpData {
    fn from(ip: IpAddr) -> Self {
        AvpData::Address(ip)
    }
}

impl From<Vec<Avp>> for AvpData {
    fn from(avps: Vec<Avp>) -> Self {
        AvpData::Grouped(avps)
    }
}

/// A single AVP.  `flags` never needs the `V` bit set by hand: encoding
/// derives it from `vendor_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avp {
    pub code: u32,
    pub flags: u8,
    pub vendor_id: Option<u32>,
    pub data: AvpData,
}

impl Avp {
    pub fn new(code: u32, flags: u8, data: impl Into<AvpData>) -> Self {
        Self {
            code,
            flags: flags & !FLAG_VENDOR,
            vendor_id: None,
            data: data.into(),
        }
    }

    /// Mandatory (`M` bit) base-protocol AVP.
    pub fn mandatory(code: u32, data: impl Into<AvpData>) -> Self {
        Self::new(code, FLAG_MANDATORY, data)
    }

    pub fn vendor_specific(code: u32, vendor_id: u32, flags: u8, data: impl Into<AvpData>) -> Self {
        Self {
            code,
            flags: flags | FLAG_VENDOR,
            vendor_id: Some(vendor_id),
            data: data.into(),
        }
    }

    /// Mandatory `DiameterIdentity` AVP (Origin-Host, Origin-Realm, ...).
    pub fn identity(code: u32, value: impl Into<String>) -> Self {
        Self::mandatory(code, AvpData::DiameterIdentity(value.into()))
    }

    /// `UTF8String` AVP without the `M` bit (Product-Name, Error-Message, ...).
    pub fn utf8(code: u32, value: impl Into<String>) -> Self {
        Self::new(code, 0, AvpData::Utf8String(value.into()))
    }

    pub fn is_mandatory(&self) -> bool {
        self.flags & FLAG_MANDATORY != 0
    }

    /// Header plus payload, excluding padding (the AVP Length field).
    pub fn len(&self) -> usize {
        self.header_len() + self.data.encoded_len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.encoded_len() == 0
    }

    /// Bytes occupied on the wire, padding included.
    pub fn padded_len(&self) -> usize {
        let len = self.len();
        len + padding(len)
    }

    /// First child with the given code, for grouped AVPs.
    pub fn find(&self, code: u32) -> Option<&Avp> {
        self.data.as_grouped()?.iter().find(|a| a.code == code)
    }

    fn header_len(&self) -> usize {
        if self.vendor_id.is_some() {
            VENDOR_HEADER_LEN
        } else {
            HEADER_LEN
        }
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        let flags = match self.vendor_id {
            Some(_) => self.flags | FLAG_VENDOR,
            None => self.flags & !FLAG_VENDOR,
        };
        let len = self.len();
        dst.put_u32(self.code);
        dst.put_u8(flags);
        put_u24(dst, len as u32);
        if let Some(vendor_id) = self.vendor_id {
            dst.put_u32(vendor_id);
        }
        self.data.encode(dst);
        dst.put_bytes(0, padding(len));
    }

    pub(crate) fn decode(src: &mut Bytes) -> Result<Self, CodecError> {
        if src.remaining() < HEADER_LEN {
            return Err(CodecError::Truncated);
        }
        let code = src.get_u32();
        let flags = src.get_u8();
        let length = get_u24(src) as usize;

        let (vendor_id, header_len) = if flags & FLAG_VENDOR != 0 {
            if src.remaining() < 4 {
                return Err(CodecError::Truncated);
            }
            (Some(src.get_u32()), VENDOR_HEADER_LEN)
        } else {
            (None, HEADER_LEN)
        };

        if length < header_len {
            return Err(CodecError::InvalidAvpLength { code, length });
        }
        let data_len = length - header_len;
        if src.remaining() < data_len {
            return Err(CodecError::Truncated);
        }
        let data = src.split_to(data_len);
        // Trailing padding of the last AVP is sometimes omitted by peers.
        src.advance(padding(length).min(src.remaining()));

        let data = AvpData::decode(dict::avp_type(code, vendor_id), code, data)?;
        Ok(Self {
            code,
            flags,
            vendor_id,
            data,
        })
    }
}

pub(crate) fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

pub(crate) fn put_u24(dst: &mut BytesMut, v: u32) {
    dst.put_u8((v >> 16) as u8);
    dst.put_u16(v as u16);
}

pub(crate) fn get_u24(src: &mut Bytes) -> u32 {
    let hi = src.get_u8() as u32;
    let lo = src.get_u16() as u32;
    (hi << 16) | lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::avp as code;

    fn encode(avp: &Avp) -> Bytes {
        let mut buf = BytesMut::new();
        avp.encode(&mut buf);
        buf.freeze()
    }

    #[test]
    fn identity_is_padded_to_four_bytes() {
        let avp = Avp::identity(code::ORIGIN_HOST, "peer1");
        assert_eq!(avp.len(), 8 + 5);
        let wire = encode(&avp);
        assert_eq!(wire.len(), 16);
        assert_eq!(&wire[..4], &264u32.to_be_bytes());
        assert_eq!(wire[4], FLAG_MANDATORY);
        assert_eq!(&wire[13..], &[0, 0, 0]);
    }

    #[test]
    fn vendor_flag_follows_vendor_id() {
        let avp = Avp::vendor_specific(1001, 10415, FLAG_MANDATORY, 7u32);
        let wire = encode(&avp);
        assert_eq!(wire.len(), 16);
        assert_eq!(wire[4], FLAG_VENDOR | FLAG_MANDATORY);

        let mut src = wire;
        let decoded = Avp::decode(&mut src).unwrap();
        assert_eq!(decoded.vendor_id, Some(10415));
        // Unknown vendor AVP survives as raw bytes.
        assert_eq!(
            decoded.data,
            AvpData::OctetString(Bytes::from_static(&[0, 0, 0, 7]))
        );
    }

    #[test]
    fn grouped_roundtrip_keeps_children() {
        let vsa = Avp::mandatory(
            code::VENDOR_SPECIFIC_APPLICATION_ID,
            vec![
                Avp::mandatory(code::VENDOR_ID, 10415u32),
                Avp::mandatory(code::AUTH_APPLICATION_ID, 16777251u32),
            ],
        );
        let mut src = encode(&vsa);
        let decoded = Avp::decode(&mut src).unwrap();
        assert_eq!(decoded, vsa);
        assert_eq!(
            decoded.find(code::AUTH_APPLICATION_ID).and_then(|a| a.data.as_u32()),
            Some(16777251)
        );
        assert!(!src.has_remaining());
    }

    #[test]
    fn address_decodes_both_families() {
        for ip in ["10.0.0.1", "::1"] {
            let ip: IpAddr = ip.parse().unwrap();
            let mut src = encode(&Avp::mandatory(code::HOST_IP_ADDRESS, ip));
            let decoded = Avp::decode(&mut src).unwrap();
            assert_eq!(decoded.data.as_address(), Some(ip));
        }
    }

    #[test]
    fn wrong_unsigned32_width_is_rejected() {
        let bogus = Avp::new(code::RESULT_CODE, FLAG_MANDATORY, AvpData::OctetString(Bytes::from_static(&[1, 2])));
        let mut src = encode(&bogus);
        let err = Avp::decode(&mut src).unwrap_err();
        assert!(matches!(err, CodecError::InvalidAvp { code: 268, .. }));
    }

    #[test]
    fn length_shorter_than_header_is_rejected() {
        let mut raw = BytesMut::new();
        raw.put_u32(code::ORIGIN_HOST);
        raw.put_u8(0);
        put_u24(&mut raw, 4);
        let mut src = raw.freeze();
        assert!(matches!(
            Avp::decode(&mut src),
            Err(CodecError::InvalidAvpLength { length: 4, .. })
        ));
    }
}
