//! Wire codecs for the ripple stage.
//!
//! Every frame on the wire is `tag: u8`, `length: LEB128 varint`,
//! `value: [u8; length]`. Record payloads are themselves a sequence of such
//! frames, one per field.

pub mod error;
pub mod frame;
pub mod record;
pub mod status;

pub use error::{DecodeCause, DecodeError, FrameError};
pub use frame::FrameCodec;
pub use record::{RecordDecoder, RecordEncoder, FIELD_SOURCE, FIELD_TIMESTAMP, FIELD_VALUE};
pub use status::{status_line, StatusEncoder};

/// Outer tag of noise readings and of the status frames sent back.
pub const NOISE_DATA_TAG: u8 = 0x10;
