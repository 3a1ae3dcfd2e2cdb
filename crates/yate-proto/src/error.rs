//! Protocol-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("buffer too short: need {needed} more bytes, have {remaining}")]
    BufferTooShort { needed: usize, remaining: usize },

    #[error("VarInt encoding error: {0}")]
    VarInt(#[from] crate::types::VarIntError),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("unsupported MessagePack marker: 0x{0:02X}")]
    UnsupportedMarker(u8),

    #[error("nesting too deep (limit: {limit})")]
    NestingTooDeep { limit: usize },

    #[error("trailing bytes after message: {0}")]
    TrailingBytes(usize),

    #[error("unknown message type: {0}")]
    UnknownMsgType(i64),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
