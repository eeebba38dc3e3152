use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use ripple_api::RawFrame;
use ripple_codec::FrameCodec;

use crate::error::ServerError;

const READ_CHUNK: usize = 8 * 1024;

/// Reads length-prefixed frames off an async byte stream.
///
/// `next_frame` is cancel safe: bytes already read stay in the buffer.
pub struct FrameReader<R> {
    inner: R,
    codec: FrameCodec,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, codec: FrameCodec) -> Self {
        Self {
            inner,
            codec,
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// `Ok(None)` on a clean EOF between frames.
    pub async fn next_frame(&mut self) -> Result<Option<RawFrame>, ServerError> {
        loop {
            if let Some((frame, consumed)) = self.codec.decode(&self.buf)? {
                self.buf.drain(..consumed);
                return Ok(Some(frame));
            }

            self.buf.reserve(READ_CHUNK);
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ServerError::Truncated(self.buf.len()));
            }
        }
    }
}

/// Writes frames to an async byte stream.
pub struct FrameWriter<W> {
    inner: W,
    codec: FrameCodec,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, codec: FrameCodec) -> Self {
        Self {
            inner,
            codec,
            buf: Vec::new(),
        }
    }

    pub async fn write_frame(&mut self, frame: &RawFrame) -> Result<(), ServerError> {
        self.buf.clear();
        self.codec.encode(frame, &mut self.buf)?;
        self.inner.write_all(&self.buf).await?;
        Ok(())
    }

    /// Flush and close the write side.
    pub async fn shutdown(&mut self) -> Result<(), ServerError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_survive_a_duplex_pipe() {
        let (client, server) = tokio::io::duplex(64);
        let codec = FrameCodec::new(1024);

        let writer = tokio::spawn(async move {
            let mut w = FrameWriter::new(client, codec);
            w.write_frame(&RawFrame::new(0x10, b"first".to_vec())).await.unwrap();
            w.write_frame(&RawFrame::new(0x20, vec![7u8; 300])).await.unwrap();
            w.shutdown().await.unwrap();
        });

        let mut r = FrameReader::new(server, codec);
        assert_eq!(r.next_frame().await.unwrap(), Some(RawFrame::new(0x10, b"first".to_vec())));
        assert_eq!(r.next_frame().await.unwrap(), Some(RawFrame::new(0x20, vec![7u8; 300])));
        assert_eq!(r.next_frame().await.unwrap(), None);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn eof_inside_frame_is_an_error() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&[0x10, 0x05, b'a', b'b']).await.unwrap();
        drop(client);

        let mut r = FrameReader::new(server, FrameCodec::default());
        assert!(matches!(r.next_frame().await, Err(ServerError::Truncated(4))));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&[0x10, 0x80, 0x01]).await.unwrap(); // len = 128

        let mut r = FrameReader::new(server, FrameCodec::new(16));
        assert!(matches!(r.next_frame().await, Err(ServerError::Frame(_))));
    }
}
