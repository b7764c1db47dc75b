//! Length-delimited framing for Diameter over a byte stream.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{Message, HEADER_LEN};
use crate::PROTOCOL_VERSION;

/// Default upper bound for a single inbound message (64 KB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid message length {0}")]
    InvalidLength(usize),

    #[error("message of {length} bytes exceeds limit of {max}")]
    TooLarge { length: usize, max: usize },

    #[error("truncated message")]
    Truncated,

    #[error("AVP {code} has invalid length {length}")]
    InvalidAvpLength { code: u32, length: usize },

    #[error("invalid AVP {code}: {reason}")]
    InvalidAvp { code: u32, reason: String },
}

/// Frames [`Message`]s on top of any `AsyncRead + AsyncWrite`.
///
/// Inbound frames larger than `max_message_bytes` are rejected before they
/// are buffered, so a misbehaving peer cannot make us allocate 16 MB.
#[derive(Debug, Clone)]
pub struct DiameterCodec {
    max_message_bytes: usize,
}

impl DiameterCodec {
    pub fn new(max_message_bytes: usize) -> Self {
        Self { max_message_bytes }
    }
}

impl Default for DiameterCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_BYTES)
    }
}

impl Decoder for DiameterCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        if src.len() < 4 {
            return Ok(None);
        }
        if src[0] != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(src[0]));
        }
        let length = (src[1] as usize) << 16 | (src[2] as usize) << 8 | src[3] as usize;
        if length < HEADER_LEN || length % 4 != 0 {
            return Err(CodecError::InvalidLength(length));
        }
        if length > self.max_message_bytes {
            return Err(CodecError::TooLarge {
                length,
                max: self.max_message_bytes,
            });
        }
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }
        let frame = src.split_to(length).freeze();
        Message::decode(frame).map(Some)
    }
}

impl Encoder<Message> for DiameterCodec {
    type Error = CodecError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        msg.encode(dst);
        Ok(())
    }
}
