use ripple_api::{RawFrame, Record};

use crate::error::{DecodeCause, DecodeError, FrameError};
use crate::frame::{read_header, write_field};

/// `value`: f32, 4 bytes big-endian.
pub const FIELD_VALUE: u8 = 0x11;
/// `timestamp`: i64, 8 bytes big-endian.
pub const FIELD_TIMESTAMP: u8 = 0x12;
/// `source`: UTF-8 string.
pub const FIELD_SOURCE: u8 = 0x13;

/// Decodes record frames of one outer tag.
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder {
    tag: u8,
}

impl RecordDecoder {
    pub fn new(tag: u8) -> Self {
        Self { tag }
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Decode one record frame. Unknown field tags are skipped; each known
    /// field must appear exactly once.
    pub fn decode(&self, frame: RawFrame) -> Result<Record, DecodeError> {
        let len = frame.payload.len();
        if frame.tag != self.tag {
            return Err(DecodeError {
                len,
                cause: DecodeCause::UnexpectedTag { expected: self.tag, found: frame.tag },
            });
        }
        decode_fields(frame.payload).map_err(|cause| DecodeError { len, cause })
    }
}

fn decode_fields(mut payload: Vec<u8>) -> Result<Record, DecodeCause> {
    let mut value: Option<f32> = None;
    let mut timestamp: Option<i64> = None;
    let mut source: Option<(usize, usize)> = None;

    let mut offset = 0;
    while offset < payload.len() {
        let rest = &payload[offset..];
        let (tag, len, header_len) = match read_header(rest)? {
            Some(h) if rest.len() >= h.2 + h.1 => h,
            _ => return Err(DecodeCause::Truncated { offset }),
        };
        let start = offset + header_len;
        let field = &payload[start..start + len];

        match tag {
            FIELD_VALUE => {
                let bytes = fixed::<4>(tag, field)?;
                set_once(&mut value, tag, f32::from_be_bytes(bytes))?;
            }
            FIELD_TIMESTAMP => {
                let bytes = fixed::<8>(tag, field)?;
                set_once(&mut timestamp, tag, i64::from_be_bytes(bytes))?;
            }
            FIELD_SOURCE => set_once(&mut source, tag, (start, len))?,
            _ => {}
        }

        offset = start + len;
    }

    let value = value.ok_or(DecodeCause::Missing(FIELD_VALUE))?;
    let timestamp = timestamp.ok_or(DecodeCause::Missing(FIELD_TIMESTAMP))?;
    let (start, len) = source.ok_or(DecodeCause::Missing(FIELD_SOURCE))?;

    payload.truncate(start + len);
    let source = String::from_utf8(payload.split_off(start))?;

    Ok(Record { value, timestamp, source })
}

fn fixed<const N: usize>(tag: u8, field: &[u8]) -> Result<[u8; N], DecodeCause> {
    field
        .try_into()
        .map_err(|_| DecodeCause::Width { tag, expected: N, found: field.len() })
}

fn set_once<T>(slot: &mut Option<T>, tag: u8, value: T) -> Result<(), DecodeCause> {
    if slot.is_some() {
        return Err(DecodeCause::Duplicate(tag));
    }
    *slot = Some(value);
    Ok(())
}

/// Encodes records into frames the decoder accepts. Used by load generators
/// and tests; the stage itself only decodes records.
#[derive(Debug, Clone, Copy)]
pub struct RecordEncoder {
    tag: u8,
}

impl RecordEncoder {
    pub fn new(tag: u8) -> Self {
        Self { tag }
    }

    /// Fails only for a `source` longer than the length prefix can express.
    pub fn encode(&self, record: &Record) -> Result<RawFrame, FrameError> {
        let mut payload = Vec::with_capacity(2 + 4 + 2 + 8 + 2 + record.source.len());
        write_field(FIELD_VALUE, &record.value.to_be_bytes(), &mut payload)?;
        write_field(FIELD_TIMESTAMP, &record.timestamp.to_be_bytes(), &mut payload)?;
        write_field(FIELD_SOURCE, record.source.as_bytes(), &mut payload)?;
        Ok(RawFrame { tag: self.tag, payload })
    }
}
