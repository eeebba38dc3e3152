use ripple_api::SinkError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("sink '{sink}' failed to initialize: {source}")]
    SinkInit { sink: String, source: SinkError },
}

impl EngineError {
    /// Add context to the error.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            EngineError::SinkInit { sink, source } => EngineError::SinkInit {
                sink,
                source: source.with_context(ctx),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("window accumulator is drained, no further records accepted")]
    Drained,
}
