use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use ripple_api::BatchSink;
use ripple_codec::FrameCodec;
use ripple_engine::{PipelineStats, ReadySink};
use ripple_storage_memory::MemorySink;
use ripple_storage_postgres::PostgresSink;

use super::connection::{self, ConnectionContext};
use crate::config::{ServeArgs, ServerConfig, StorageConfig};
use crate::error::ServerError;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("ripple-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(config = %args.config, "loaded config");
    let pipeline = config.pipeline_config()?;

    // --- Sink: без успешного init сервер не стартует ---
    let sink = ReadySink::init(build_sink(&config.storage)?).await?;

    let listener = TcpListener::bind(&config.listen)
        .await
        .map_err(|source| ServerError::Bind { addr: config.listen.clone(), source })?;

    let ctx = ConnectionContext {
        pipeline,
        sink,
        codec: FrameCodec::new(config.max_frame),
        buffer: config.channel_buffer,
    };
    let token = CancellationToken::new();
    let mut connections: JoinSet<PipelineStats> = JoinSet::new();

    tracing::info!(
        addr = %config.listen,
        sink = %ctx.sink.name(),
        max_count = ctx.pipeline.window.max_count(),
        max_duration = ?ctx.pipeline.window.max_duration(),
        "server ready"
    );

    // --- Accept loop until Ctrl+C ---
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::info!(%peer, "new connection");
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%peer, error = %e, "set_nodelay failed");
                    }
                    let (reader, writer) = stream.into_split();
                    connections.spawn(connection::handle(peer, reader, writer, ctx.clone(), token.child_token()));
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept error");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(joined) = connections.join_next() => log_finished(joined),
            signal = &mut ctrl_c => {
                signal.map_err(ServerError::Signal)?;
                break;
            }
        }
    }

    tracing::info!(open = connections.len(), "shutting down...");
    drop(listener);

    // Signal all pipelines to drain
    token.cancel();

    let grace = Duration::from_millis(config.shutdown_grace_ms);
    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = connections.join_next().await {
            log_finished(joined);
        }
    })
    .await;

    // Abort anything still running
    if drained.is_err() {
        tracing::warn!(open = connections.len(), grace = ?grace, "grace period elapsed, aborting connections");
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn build_sink(storage: &StorageConfig) -> Result<Arc<dyn BatchSink>, ServerError> {
    let sink: Arc<dyn BatchSink> = match storage {
        StorageConfig::Postgres(pg) => {
            tracing::info!(table = %pg.table, "using postgres storage");
            Arc::new(PostgresSink::new(pg.clone())?)
        }
        StorageConfig::Memory(mem) => {
            tracing::info!(max_records = mem.max_records, "using memory storage");
            Arc::new(MemorySink::new(mem))
        }
    };
    Ok(sink)
}

fn log_finished(joined: Result<PipelineStats, tokio::task::JoinError>) {
    match joined {
        Ok(stats) => tracing::info!(
            decoded = stats.decoded,
            stored = stats.stored,
            failed = stats.failed,
            "connection closed"
        ),
        Err(e) => tracing::error!(error = %e, "connection task failed"),
    }
}
