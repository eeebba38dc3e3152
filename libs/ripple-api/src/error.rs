use std::fmt;

/// Error kind for sink errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    /// Invalid sink configuration (bad table name, bad DSN).
    Config,
    /// Could not reach the store.
    Connect,
    /// The store rejected the statement (constraint violation, type mismatch, ...).
    Query,
    /// The sink was used before `init()` or after its connection went away.
    Closed,
}

/// Error returned by all `BatchSink` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    pub kind: SinkErrorKind,
    pub message: String,
}

impl SinkError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: SinkErrorKind::Config, message: msg.into() }
    }

    pub fn connect(msg: impl Into<String>) -> Self {
        Self { kind: SinkErrorKind::Connect, message: msg.into() }
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self { kind: SinkErrorKind::Query, message: msg.into() }
    }

    pub fn closed(msg: impl Into<String>) -> Self {
        Self { kind: SinkErrorKind::Closed, message: msg.into() }
    }

    /// Add context to the error, preserving the original kind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for SinkError {}
