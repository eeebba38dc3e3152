use ripple_api::SinkError;
use ripple_codec::FrameError;
use ripple_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("sink: {0}")]
    Sink(#[from] SinkError),

    #[error("bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },

    #[error("connect {addr}: {source}")]
    Connect { addr: String, source: std::io::Error },

    #[error("framing: {0}")]
    Frame(#[from] FrameError),

    #[error("stream ended inside a frame ({0} bytes buffered)")]
    Truncated(usize),

    #[error("signal: {0}")]
    Signal(#[source] std::io::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("task: {0}")]
    Task(#[from] tokio::task::JoinError),
}
