//! Binary wire format
//!
//! Requests and replies are fixed-layout records of big-endian 32-bit words.
//! Lengths travel in 4-byte units and always include the header.
//!
//! ```text
//! request header (4 bytes)
//! ┌────────┬─────┬──────────────┐
//! │ opcode │ pad │ length (u16) │
//! └────────┴─────┴──────────────┘
//!
//! reply header (8 bytes)
//! ┌───────┬───────┬──────────────┬──────────────┬───────────┐
//! │ data1 │ data2 │ status (u16) │ length (u16) │ pad (u16) │
//! └───────┴───────┴──────────────┴──────────────┴───────────┘
//! ```
//!
//! A Capabilities reply carries `supported` in `data1` and `max_depth` in
//! `data2`. The status word is zero on every successful reply, so readers
//! that treat it as reserved still parse Ack and Capabilities; error replies
//! set it to [`STATUS_ERROR`].
//!
//! Decoding validates the declared length against the buffer before any
//! field is read, and every read is bounds-checked.

use crate::error::{ProtocolError, Result};
use crate::metadata::{CapabilityRecord, HdrMetadata};

/// Size of one length unit in bytes
pub const UNIT: usize = 4;

pub const REQUEST_HEADER_SIZE: usize = 4;

pub const REPLY_HEADER_SIZE: usize = 8;

/// Reply status word for a successful reply
pub const STATUS_REPLY: u16 = 0;

/// Reply status word for an error
pub const STATUS_ERROR: u16 = 1;

const ACK_UNITS: u16 = 2;
const ERROR_UNITS: u16 = 3;

/// Request operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    SetHdrMetadata = 0,
    QueryHdrCapabilities = 1,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::SetHdrMetadata),
            1 => Some(Self::QueryHdrCapabilities),
            _ => None,
        }
    }

    /// Exact request length for this opcode, in units
    pub const fn request_units(self) -> u16 {
        match self {
            // header + window + five metadata words
            Self::SetHdrMetadata => 7,
            // header + screen
            Self::QueryHdrCapabilities => 2,
        }
    }
}

/// Fixed request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub opcode: u8,
    /// Total request length in units
    pub length: u16,
}

impl RequestHeader {
    /// Parse the header prefix, `None` if the buffer is too short
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let bytes = buf.get(..REQUEST_HEADER_SIZE)?;
        Some(Self {
            opcode: bytes[0],
            length: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    /// Total request size in bytes
    pub fn byte_len(&self) -> usize {
        self.length as usize * UNIT
    }
}

/// Fixed reply header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub data1: u8,
    pub data2: u8,
    pub status: u16,
    /// Total reply length in units
    pub length: u16,
}

impl ReplyHeader {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let bytes = buf.get(..REPLY_HEADER_SIZE)?;
        Some(Self {
            data1: bytes[0],
            data2: bytes[1],
            status: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
        })
    }

    pub fn byte_len(&self) -> usize {
        self.length as usize * UNIT
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.data1);
        buf.push(self.data2);
        buf.extend_from_slice(&self.status.to_be_bytes());
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf.extend_from_slice(&[0, 0]);
    }
}

/// A client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SetHdrMetadata { window: u32, metadata: HdrMetadata },
    QueryHdrCapabilities { screen: u32 },
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::SetHdrMetadata { .. } => Opcode::SetHdrMetadata,
            Self::QueryHdrCapabilities { .. } => Opcode::QueryHdrCapabilities,
        }
    }

    /// The reply variant a well-behaved server answers with
    pub fn reply_kind(&self) -> ReplyKind {
        match self {
            Self::SetHdrMetadata { .. } => ReplyKind::Ack,
            Self::QueryHdrCapabilities { .. } => ReplyKind::Capabilities,
        }
    }
}

/// Successful reply variants, used to tell the decoder what to expect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Ack,
    Capabilities,
}

/// Error codes, numbered as in the core X11 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// Unknown opcode
    Request = 1,
    /// Field value out of range
    Value = 2,
    /// Window does not exist
    Window = 3,
    /// Permission denied
    Access = 10,
    /// Request length wrong for its opcode
    Length = 16,
    /// Server-side failure
    Implementation = 17,
}

impl ErrorCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Request),
            2 => Some(Self::Value),
            3 => Some(Self::Window),
            10 => Some(Self::Access),
            16 => Some(Self::Length),
            17 => Some(Self::Implementation),
            _ => None,
        }
    }
}

/// Request-level error sent back instead of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReply {
    pub code: ErrorCode,
    /// Opcode of the failing request (raw, may be undefined)
    pub opcode: u8,
    /// Resource ID or field value that caused the error
    pub bad_value: u32,
}

impl std::fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} error (code {}) for opcode {}, bad value {:#x}",
            self.code, self.code as u8, self.opcode, self.bad_value
        )
    }
}

/// A server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Capabilities(CapabilityRecord),
    Error(ErrorReply),
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let bytes: [u8; 4] = buf.get(offset..end)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Encode a request into its wire form
pub fn encode_request(request: &Request) -> Vec<u8> {
    let opcode = request.opcode();
    let units = opcode.request_units();
    let mut buf = Vec::with_capacity(units as usize * UNIT);
    buf.push(opcode as u8);
    buf.push(0);
    buf.extend_from_slice(&units.to_be_bytes());

    match request {
        Request::SetHdrMetadata { window, metadata } => {
            buf.extend_from_slice(&window.to_be_bytes());
            for word in metadata.to_words() {
                buf.extend_from_slice(&word.to_be_bytes());
            }
        }
        Request::QueryHdrCapabilities { screen } => {
            buf.extend_from_slice(&screen.to_be_bytes());
        }
    }

    debug_assert_eq!(buf.len(), units as usize * UNIT);
    buf
}

/// Decode a complete request
pub fn decode_request(buf: &[u8]) -> Result<Request> {
    let header = RequestHeader::decode(buf).ok_or(ProtocolError::MalformedRequest {
        reason: "shorter than request header",
    })?;
    let opcode = Opcode::from_u8(header.opcode).ok_or(ProtocolError::UnknownOpcode(header.opcode))?;

    if header.byte_len() != buf.len() {
        return Err(ProtocolError::MalformedRequest {
            reason: "declared length disagrees with buffer",
        });
    }
    if header.length != opcode.request_units() {
        return Err(ProtocolError::MalformedRequest {
            reason: "wrong length for opcode",
        });
    }

    let word = |index: usize| {
        read_u32(buf, REQUEST_HEADER_SIZE + index * UNIT).ok_or(ProtocolError::MalformedRequest {
            reason: "payload truncated",
        })
    };

    match opcode {
        Opcode::SetHdrMetadata => {
            let window = word(0)?;
            let mut words = [0u32; 5];
            for (i, slot) in words.iter_mut().enumerate() {
                *slot = word(i + 1)?;
            }
            Ok(Request::SetHdrMetadata {
                window,
                metadata: HdrMetadata::from_words(words),
            })
        }
        Opcode::QueryHdrCapabilities => Ok(Request::QueryHdrCapabilities { screen: word(0)? }),
    }
}

/// Encode a reply into its wire form
///
/// Fails only when a capability list is too long for the 16-bit length field.
pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>> {
    match reply {
        Reply::Ack => {
            let mut buf = Vec::with_capacity(REPLY_HEADER_SIZE);
            ReplyHeader {
                data1: 0,
                data2: 0,
                status: STATUS_REPLY,
                length: ACK_UNITS,
            }
            .encode_into(&mut buf);
            Ok(buf)
        }
        Reply::Capabilities(record) => {
            let length = u16::try_from(record.eotfs.len())
                .ok()
                .and_then(|n| n.checked_add(ACK_UNITS))
                .ok_or(ProtocolError::ReplyTooLarge {
                    eotfs: record.eotfs.len(),
                })?;
            let mut buf = Vec::with_capacity(length as usize * UNIT);
            ReplyHeader {
                data1: record.supported as u8,
                data2: record.max_depth,
                status: STATUS_REPLY,
                length,
            }
            .encode_into(&mut buf);
            for eotf in &record.eotfs {
                buf.extend_from_slice(&eotf.to_be_bytes());
            }
            Ok(buf)
        }
        Reply::Error(error) => {
            let mut buf = Vec::with_capacity(ERROR_UNITS as usize * UNIT);
            ReplyHeader {
                data1: error.code as u8,
                data2: error.opcode,
                status: STATUS_ERROR,
                length: ERROR_UNITS,
            }
            .encode_into(&mut buf);
            buf.extend_from_slice(&error.bad_value.to_be_bytes());
            Ok(buf)
        }
    }
}

/// Decode a complete reply
///
/// Error replies decode regardless of `expected`; a successful reply of the
/// other variant is [`ProtocolError::UnexpectedReply`].
pub fn decode_reply(buf: &[u8], expected: ReplyKind) -> Result<Reply> {
    let header = ReplyHeader::decode(buf).ok_or(ProtocolError::MalformedReply {
        reason: "shorter than reply header",
    })?;

    let declared = header.byte_len();
    if declared != buf.len() {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: buf.len(),
        });
    }

    match header.status {
        STATUS_ERROR => {
            if header.length != ERROR_UNITS {
                return Err(ProtocolError::MalformedReply {
                    reason: "error reply has wrong length",
                });
            }
            let code = ErrorCode::from_u8(header.data1).ok_or(ProtocolError::MalformedReply {
                reason: "unknown error code",
            })?;
            let bad_value = read_u32(buf, REPLY_HEADER_SIZE).ok_or(ProtocolError::MalformedReply {
                reason: "error reply truncated",
            })?;
            Ok(Reply::Error(ErrorReply {
                code,
                opcode: header.data2,
                bad_value,
            }))
        }
        STATUS_REPLY => match expected {
            ReplyKind::Ack => {
                if header.length != ACK_UNITS || header.data1 != 0 || header.data2 != 0 {
                    return Err(ProtocolError::UnexpectedReply { expected });
                }
                Ok(Reply::Ack)
            }
            ReplyKind::Capabilities => {
                let supported = match header.data1 {
                    0 => false,
                    1 => true,
                    _ => {
                        return Err(ProtocolError::MalformedReply {
                            reason: "supported flag is not a boolean",
                        });
                    }
                };
                // declared == buf.len() >= REPLY_HEADER_SIZE, so length >= 2
                let count = (header.length - ACK_UNITS) as usize;
                let mut eotfs = Vec::with_capacity(count);
                for i in 0..count {
                    let eotf = read_u32(buf, REPLY_HEADER_SIZE + i * UNIT).ok_or(
                        ProtocolError::LengthMismatch {
                            declared,
                            actual: buf.len(),
                        },
                    )?;
                    eotfs.push(eotf);
                }
                Ok(Reply::Capabilities(CapabilityRecord {
                    supported,
                    max_depth: header.data2,
                    eotfs,
                }))
            }
        },
        _ => Err(ProtocolError::MalformedReply {
            reason: "unknown reply status",
        }),
    }
}
