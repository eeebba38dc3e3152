use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ripple_api::{BatchSink, FlushResult, RawFrame};
use ripple_codec::{status_line, RecordDecoder, StatusEncoder};

use crate::config::PipelineConfig;
use crate::error::EngineError;
use crate::flush::FlushWorker;
use crate::window::{Offer, WindowAccumulator};

/// Capacity of the flush-result channel between worker and forwarder.
const RESULT_BUFFER: usize = 64;

// ═══════════════════════════════════════════════════════════════
//  ReadySink: a sink whose init() succeeded
// ═══════════════════════════════════════════════════════════════

/// A sink that has been initialized. The only way to build a [`Pipeline`],
/// so a pipeline never runs against a sink that failed to connect.
#[derive(Clone)]
pub struct ReadySink(Arc<dyn BatchSink>);

impl ReadySink {
    pub async fn init(sink: Arc<dyn BatchSink>) -> Result<Self, EngineError> {
        sink.init().await.map_err(|source| EngineError::SinkInit {
            sink: sink.name().to_string(),
            source,
        })?;
        tracing::info!(sink = %sink.name(), "sink ready");
        Ok(Self(sink))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn sink(&self) -> &Arc<dyn BatchSink> {
        &self.0
    }
}

/// Counters of one finished pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames received on the inbound channel.
    pub frames: u64,
    /// Frames with a foreign tag, ignored.
    pub skipped: u64,
    /// Records decoded and offered to the window.
    pub decoded: u64,
    /// Frames with the record tag that failed to decode, dropped.
    pub malformed: u64,
    /// Windows persisted successfully.
    pub stored: u64,
    /// Windows whose persist failed.
    pub failed: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Pipeline: inbound frames → window → sink → status frames
// ═══════════════════════════════════════════════════════════════

pub struct Pipeline {
    config: PipelineConfig,
    sink: ReadySink,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, sink: ReadySink) -> Self {
        Self { config, sink }
    }

    pub fn spawn(
        self,
        inbound: mpsc::Receiver<RawFrame>,
        outbound: mpsc::Sender<RawFrame>,
        token: CancellationToken,
    ) -> JoinHandle<PipelineStats> {
        tokio::spawn(self.run(inbound, outbound, token))
    }

    /// Run until `inbound` closes or `token` is cancelled. On cancel, frames
    /// already queued in `inbound` are still ingested. Either way the
    /// open window is drained, every closed window is persisted and its
    /// status frame is sent before this returns.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<RawFrame>,
        outbound: mpsc::Sender<RawFrame>,
        token: CancellationToken,
    ) -> PipelineStats {
        let name = self.config.name.clone();
        let decoder = RecordDecoder::new(self.config.tag);

        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::channel(RESULT_BUFFER);

        let window = Arc::new(WindowAccumulator::new(self.config.window, batch_tx));
        let timer = window.spawn_timer();
        let worker = FlushWorker::new(name.clone(), self.sink.sink().clone(), self.config.retry)
            .spawn(batch_rx, result_tx);
        let forwarder = tokio::spawn(forward_results(
            name.clone(),
            StatusEncoder::new(self.config.tag),
            result_rx,
            outbound,
        ));

        tracing::info!(
            pipeline = %name,
            sink = %self.sink.name(),
            tag = self.config.tag,
            max_count = self.config.window.max_count(),
            max_duration = ?self.config.window.max_duration(),
            "pipeline started"
        );

        let mut stats = PipelineStats::default();
        loop {
            let frame = tokio::select! {
                biased;
                frame = inbound.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                _ = token.cancelled() => {
                    // Кадры, уже лежащие в канале, тоже должны попасть в окно.
                    inbound.close();
                    let mut queued = 0u64;
                    while let Some(frame) = inbound.recv().await {
                        queued += 1;
                        if !ingest(&name, &decoder, &window, frame, &mut stats).await {
                            break;
                        }
                    }
                    tracing::info!(pipeline = %name, queued, "cancelled, draining");
                    break;
                }
            };
            if !ingest(&name, &decoder, &window, frame, &mut stats).await {
                break;
            }
        }

        if let Some(seq) = window.drain().await {
            tracing::debug!(pipeline = %name, window = seq, "window closed by drain");
        }

        if let Err(e) = timer.await {
            tracing::error!(pipeline = %name, error = %e, "window timer task failed");
        }
        if let Err(e) = worker.await {
            tracing::error!(pipeline = %name, error = %e, "flush worker task failed");
        }
        match forwarder.await {
            Ok((stored, failed)) => {
                stats.stored = stored;
                stats.failed = failed;
            }
            Err(e) => tracing::error!(pipeline = %name, error = %e, "result forwarder task failed"),
        }

        tracing::info!(
            pipeline = %name,
            frames = stats.frames,
            decoded = stats.decoded,
            skipped = stats.skipped,
            malformed = stats.malformed,
            stored = stats.stored,
            failed = stats.failed,
            "pipeline stopped"
        );
        stats
    }
}

/// Decode one inbound frame and offer the record to the window.
/// Returns `false` once the window no longer accepts records.
async fn ingest(
    pipeline: &str,
    decoder: &RecordDecoder,
    window: &WindowAccumulator,
    frame: RawFrame,
    stats: &mut PipelineStats,
) -> bool {
    stats.frames += 1;

    if frame.tag != decoder.tag() {
        stats.skipped += 1;
        tracing::debug!(pipeline, tag = frame.tag, "skipping frame with foreign tag");
        return true;
    }

    let record = match decoder.decode(frame) {
        Ok(record) => record,
        Err(e) => {
            stats.malformed += 1;
            tracing::warn!(pipeline, error = %e, "dropping malformed frame");
            return true;
        }
    };
    stats.decoded += 1;

    match window.offer(record).await {
        Ok(Offer::Closed { window: seq, records }) => {
            tracing::debug!(pipeline, window = seq, records, "window closed by count");
            true
        }
        Ok(Offer::Buffered { .. }) => true,
        Err(e) => {
            tracing::error!(pipeline, error = %e, "window rejected record");
            false
        }
    }
}

/// Log each flush result and send its status frame downstream.
/// Returns (stored, failed) window counts.
async fn forward_results(
    pipeline: String,
    encoder: StatusEncoder,
    mut results: mpsc::Receiver<FlushResult>,
    outbound: mpsc::Sender<RawFrame>,
) -> (u64, u64) {
    let mut stored = 0;
    let mut failed = 0;
    let mut downstream_open = true;

    while let Some(result) = results.recv().await {
        let line = status_line(&result);
        match &result.outcome {
            Ok(_) => {
                stored += 1;
                tracing::info!(pipeline = %pipeline, window = result.window, records = result.records, "{line}");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(
                    pipeline = %pipeline,
                    window = result.window,
                    records = result.records,
                    kind = ?e.kind,
                    "{line}"
                );
            }
        }

        if downstream_open && outbound.send(encoder.encode(&result)).await.is_err() {
            downstream_open = false;
            tracing::warn!(pipeline = %pipeline, "downstream closed, status frames are no longer sent");
        }
    }

    (stored, failed)
}
