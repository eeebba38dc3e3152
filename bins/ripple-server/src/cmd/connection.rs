use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ripple_api::RawFrame;
use ripple_codec::FrameCodec;
use ripple_engine::{Pipeline, PipelineConfig, PipelineStats, ReadySink};

use crate::wire::{FrameReader, FrameWriter};

// ═══════════════════════════════════════════════════════════════
//  Connection: socket → frames → pipeline → status frames → socket
// ═══════════════════════════════════════════════════════════════

/// Per-connection settings copied from the server config.
#[derive(Clone)]
pub struct ConnectionContext {
    pub pipeline: PipelineConfig,
    pub sink: ReadySink,
    pub codec: FrameCodec,
    pub buffer: usize,
}

/// Serve one connection until the peer closes its write side or `token` is
/// cancelled. The pipeline drains in both cases.
pub async fn handle<R, W>(
    peer: SocketAddr,
    reader: R,
    writer: W,
    ctx: ConnectionContext,
    token: CancellationToken,
) -> PipelineStats
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (inbound_tx, inbound_rx) = mpsc::channel(ctx.buffer);
    let (outbound_tx, outbound_rx) = mpsc::channel(ctx.buffer);

    let read_task = tokio::spawn(read_frames(
        peer,
        FrameReader::new(reader, ctx.codec),
        inbound_tx,
        token.clone(),
    ));
    let write_task = tokio::spawn(write_frames(peer, FrameWriter::new(writer, ctx.codec), outbound_rx));

    let mut config = ctx.pipeline;
    config.name = peer.to_string();
    let stats = Pipeline::new(config, ctx.sink).run(inbound_rx, outbound_tx, token).await;

    if let Err(e) = read_task.await {
        tracing::error!(%peer, error = %e, "reader task failed");
    }
    if let Err(e) = write_task.await {
        tracing::error!(%peer, error = %e, "writer task failed");
    }
    stats
}

async fn read_frames<R: AsyncRead + Unpin>(
    peer: SocketAddr,
    mut reader: FrameReader<R>,
    inbound: mpsc::Sender<RawFrame>,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            next = reader.next_frame() => next,
            _ = token.cancelled() => break,
        };
        match next {
            Ok(Some(frame)) => {
                if inbound.send(frame).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!(%peer, "peer finished sending");
                break;
            }
            Err(e) => {
                // Поток байтов рассинхронизирован, дальше читать нельзя.
                tracing::warn!(%peer, error = %e, "read error, closing inbound stream");
                break;
            }
        }
    }
}

async fn write_frames<W: AsyncWrite + Unpin>(
    peer: SocketAddr,
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::Receiver<RawFrame>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_frame(&frame).await {
            tracing::warn!(%peer, error = %e, "write error, dropping further status frames");
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(%peer, error = %e, "shutdown error");
    }
}
