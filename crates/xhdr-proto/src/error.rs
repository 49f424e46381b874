//! Codec errors

use thiserror::Error;

/// Errors raised while encoding or decoding XHDR messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Request length does not fit its header or its opcode
    #[error("malformed request: {reason}")]
    MalformedRequest { reason: &'static str },

    /// Opcode outside the defined set
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// Declared reply length disagrees with the bytes received
    #[error("reply length mismatch: header declares {declared} bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Reply too short to carry a header, or with a bad kind byte
    #[error("malformed reply: {reason}")]
    MalformedReply { reason: &'static str },

    /// A well-formed reply of a different variant than the one awaited
    #[error("unexpected reply: expected {expected:?}")]
    UnexpectedReply { expected: crate::wire::ReplyKind },

    /// Capability list does not fit the 16-bit length field
    #[error("reply too large: {eotfs} eotfs")]
    ReplyTooLarge { eotfs: usize },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
