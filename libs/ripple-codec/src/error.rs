use crate::frame::MAX_VARINT_BYTES;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("length prefix longer than {} bytes", MAX_VARINT_BYTES)]
    LengthOverflow,

    #[error("payload too large: {len} bytes (max {max})")]
    TooLarge { len: usize, max: usize },
}

/// Why a record payload could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeCause {
    #[error("unexpected tag {found:#04x}, decoder is bound to {expected:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("truncated field at offset {offset}")]
    Truncated { offset: usize },

    #[error("field {tag:#04x}: expected {expected} bytes, got {found}")]
    Width { tag: u8, expected: usize, found: usize },

    #[error("field {0:#04x} appears more than once")]
    Duplicate(u8),

    #[error("missing field {0:#04x}")]
    Missing(u8),

    #[error("source is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("field header: {0}")]
    Frame(#[from] FrameError),
}

/// Malformed inbound frame. Carries the payload length so the dropped frame
/// can be identified in logs without keeping its bytes.
#[derive(Debug, thiserror::Error)]
#[error("malformed record frame ({len} bytes): {cause}")]
pub struct DecodeError {
    pub len: usize,
    #[source]
    pub cause: DecodeCause,
}
