use ripple_api::RawFrame;

use crate::error::FrameError;

/// Longest accepted length prefix. Four LEB128 bytes carry 28 bits.
pub const MAX_VARINT_BYTES: usize = 4;

/// Largest length a prefix can express.
pub const MAX_FRAME_LEN: usize = (1 << (7 * MAX_VARINT_BYTES)) - 1;

/// Splits a byte stream into `RawFrame`s and writes frames back.
///
/// Wire layout: `tag: u8`, `length: LEB128`, `value: [u8; length]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    /// Максимальный размер payload в байтах (0 = без ограничения).
    max_payload: usize,
}

impl FrameCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Try to cut one frame off the front of `buf`.
    ///
    /// `Ok(None)` means not enough bytes yet. On `Ok(Some((frame, consumed)))`
    /// caller drops `consumed` bytes from its buffer.
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(RawFrame, usize)>, FrameError> {
        let Some((tag, len, header_len)) = read_header(buf)? else {
            return Ok(None);
        };

        if self.max_payload > 0 && len > self.max_payload {
            return Err(FrameError::TooLarge { len, max: self.max_payload });
        }

        let total = header_len + len;
        if buf.len() < total {
            return Ok(None); // Не хватает данных для полного фрейма
        }

        let payload = buf[header_len..total].to_vec();
        Ok(Some((RawFrame { tag, payload }, total)))
    }

    /// Append the wire form of `frame` to `out`.
    pub fn encode(&self, frame: &RawFrame, out: &mut Vec<u8>) -> Result<(), FrameError> {
        let len = frame.payload.len();
        if self.max_payload > 0 && len > self.max_payload {
            return Err(FrameError::TooLarge { len, max: self.max_payload });
        }
        write_field(frame.tag, &frame.payload, out)
    }
}

/// Parse `tag` + length prefix.
///
/// Returns `(tag, value_len, header_len)`, or `None` if the header itself is
/// not complete yet.
pub(crate) fn read_header(buf: &[u8]) -> Result<Option<(u8, usize, usize)>, FrameError> {
    let Some((&tag, rest)) = buf.split_first() else {
        return Ok(None);
    };

    let mut len: usize = 0;
    for (i, &byte) in rest.iter().enumerate() {
        if i == MAX_VARINT_BYTES {
            return Err(FrameError::LengthOverflow);
        }
        len |= ((byte & 0x7f) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((tag, len, 1 + i + 1)));
        }
    }

    if rest.len() >= MAX_VARINT_BYTES {
        return Err(FrameError::LengthOverflow);
    }
    Ok(None)
}

/// Append one `tag | length | value` field.
pub(crate) fn write_field(tag: u8, value: &[u8], out: &mut Vec<u8>) -> Result<(), FrameError> {
    let mut len = value.len();
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { len, max: MAX_FRAME_LEN });
    }

    out.reserve(1 + MAX_VARINT_BYTES + len);
    out.push(tag);
    loop {
        let byte = (len & 0x7f) as u8;
        len >>= 7;
        if len == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out.extend_from_slice(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_frame_uses_single_length_byte() {
        let mut out = Vec::new();
        FrameCodec::default()
            .encode(&RawFrame::new(0x10, b"abc".to_vec()), &mut out)
            .unwrap();
        assert_eq!(out, vec![0x10, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn long_frame_uses_multi_byte_prefix() {
        let payload = vec![7u8; 300];
        let mut out = Vec::new();
        FrameCodec::default()
            .encode(&RawFrame::new(0x10, payload.clone()), &mut out)
            .unwrap();
        // 300 = 0b10_0101100 → 0xac 0x02
        assert_eq!(&out[..3], &[0x10, 0xac, 0x02]);

        let (frame, consumed) = FrameCodec::default().decode(&out).unwrap().unwrap();
        assert_eq!(consumed, out.len());
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn partial_input_waits_for_more_bytes() {
        let codec = FrameCodec::default();
        assert_eq!(codec.decode(&[]).unwrap(), None);
        assert_eq!(codec.decode(&[0x10]).unwrap(), None);
        assert_eq!(codec.decode(&[0x10, 0x80]).unwrap(), None);
        assert_eq!(codec.decode(&[0x10, 0x03, b'a']).unwrap(), None);
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let codec = FrameCodec::default();
        let mut buf = Vec::new();
        codec.encode(&RawFrame::new(0x10, b"one".to_vec()), &mut buf).unwrap();
        codec.encode(&RawFrame::new(0x20, b"two!".to_vec()), &mut buf).unwrap();

        let (first, n) = codec.decode(&buf).unwrap().unwrap();
        buf.drain(..n);
        let (second, m) = codec.decode(&buf).unwrap().unwrap();
        buf.drain(..m);

        assert_eq!(first, RawFrame::new(0x10, b"one".to_vec()));
        assert_eq!(second, RawFrame::new(0x20, b"two!".to_vec()));
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_overlong_length_prefix() {
        let buf = [0x10, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert_eq!(FrameCodec::default().decode(&buf), Err(FrameError::LengthOverflow));
    }

    #[test]
    fn enforces_max_payload() {
        let codec = FrameCodec::new(4);
        assert_eq!(
            codec.decode(&[0x10, 0x05, 1, 2, 3, 4, 5]),
            Err(FrameError::TooLarge { len: 5, max: 4 })
        );

        let mut out = Vec::new();
        assert!(codec.encode(&RawFrame::new(0x10, vec![0; 5]), &mut out).is_err());
        assert!(out.is_empty());
    }
}
