use std::future::Future;
use std::pin::Pin;

use crate::error::SinkError;
use crate::record::Batch;

/// Successful persistence of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    /// Number of rows written.
    pub count: usize,
    /// Human-readable destination (table name, "memory", ...).
    pub target: String,
}

/// Outcome of flushing one window. Exactly one per batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushResult {
    /// Sequence number of the flushed window.
    pub window: u64,
    /// Number of records in the flushed batch.
    pub records: usize,
    pub outcome: Result<Stored, SinkError>,
}

/// Durable destination for closed windows.
///
/// The engine does not know concrete implementations. Calls with disjoint
/// batches are independent; there is no cross-batch transaction. A single
/// pipeline never calls `persist` concurrently, but several pipelines may
/// share one sink, so implementations guard their own connection.
pub trait BatchSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Connect / prepare. Called once before the first `persist`.
    /// A pipeline must not start if this fails.
    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;

    /// Persist all records of `batch` atomically: either every row is stored
    /// or an error is returned.
    fn persist<'a>(
        &'a self,
        batch: &'a Batch,
    ) -> Pin<Box<dyn Future<Output = Result<Stored, SinkError>> + Send + 'a>>;
}
