use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ripple_api::{Batch, BatchSink, FlushResult, SinkErrorKind};

use crate::config::RetryPolicy;

/// Closed windows waiting for the sink before a backlog warning is logged.
const BACKLOG_WARN: usize = 64;

/// Tracks the flush-queue depth and reports when it first crosses the
/// threshold. Re-arms after the queue falls back below half of it.
#[derive(Debug)]
struct Backlog {
    warn_at: usize,
    warned: bool,
}

impl Backlog {
    fn new(warn_at: usize) -> Self {
        Self { warn_at, warned: false }
    }

    fn observe(&mut self, depth: usize) -> bool {
        if self.warned {
            if depth < self.warn_at / 2 {
                self.warned = false;
            }
            return false;
        }
        self.warned = depth >= self.warn_at;
        self.warned
    }
}

// ═══════════════════════════════════════════════════════════════
//  Flush worker: closed windows → sink.persist() → FlushResult
// ═══════════════════════════════════════════════════════════════

/// Persists closed windows one at a time, in the order they were closed.
///
/// Один worker на pipeline: следующий batch не начинается, пока не завершён
/// предыдущий (включая все повторы), поэтому результаты идут в порядке окон.
pub struct FlushWorker {
    pipeline: String,
    sink: Arc<dyn BatchSink>,
    retry: RetryPolicy,
}

impl FlushWorker {
    pub fn new(pipeline: impl Into<String>, sink: Arc<dyn BatchSink>, retry: RetryPolicy) -> Self {
        Self {
            pipeline: pipeline.into(),
            sink,
            retry,
        }
    }

    /// Persist one batch, retrying per policy. Never fails: a sink error
    /// becomes the outcome of the returned result.
    pub async fn persist(&self, batch: &Batch) -> FlushResult {
        let mut attempt = 1;
        let outcome = loop {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.sink.persist(batch).await {
                Ok(stored) => break Ok(stored),
                Err(e) if e.kind == SinkErrorKind::Config || attempt >= self.retry.max_attempts() => {
                    break Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        pipeline = %self.pipeline,
                        sink = %self.sink.name(),
                        window = batch.window(),
                        attempt,
                        error = %e,
                        "persist failed, retrying"
                    );
                    attempt += 1;
                }
            }
        };

        FlushResult {
            window: batch.window(),
            records: batch.len(),
            outcome,
        }
    }

    /// Run until the batch queue closes (after drain) and every queued batch
    /// has produced its result.
    pub fn spawn(
        self,
        mut batches: mpsc::UnboundedReceiver<Batch>,
        results: mpsc::Sender<FlushResult>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backlog = Backlog::new(BACKLOG_WARN);
            while let Some(batch) = batches.recv().await {
                // Очередь окон не ограничена: закрытие окна не ждёт sink.
                let depth = batches.len();
                if backlog.observe(depth) {
                    tracing::warn!(
                        pipeline = %self.pipeline,
                        sink = %self.sink.name(),
                        depth,
                        "flush queue is growing, sink or downstream is falling behind"
                    );
                }
                let result = self.persist(&batch).await;
                if results.send(result).await.is_err() {
                    // Forwarder is gone; keep persisting, nobody reads results.
                    tracing::debug!(pipeline = %self.pipeline, window = batch.window(), "result dropped");
                }
            }
            tracing::debug!(pipeline = %self.pipeline, sink = %self.sink.name(), "flush worker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    use ripple_api::{Record, SinkError, Stored};

    use super::*;

    /// Fails the first `fail` calls with `kind`, then stores.
    struct Flaky {
        fail: usize,
        kind: SinkErrorKind,
        calls: Mutex<Vec<u64>>,
    }

    impl Flaky {
        fn new(fail: usize, kind: SinkErrorKind) -> Arc<Self> {
            Arc::new(Self { fail, kind, calls: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> Vec<u64> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl BatchSink for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn persist<'a>(
            &'a self,
            batch: &'a Batch,
        ) -> Pin<Box<dyn Future<Output = Result<Stored, SinkError>> + Send + 'a>> {
            Box::pin(async move {
                let mut calls = self.calls.lock().unwrap();
                calls.push(batch.window());
                if calls.len() <= self.fail {
                    return Err(SinkError { kind: self.kind, message: "boom".into() });
                }
                Ok(Stored { count: batch.len(), target: "flaky".into() })
            })
        }
    }

    fn batch(window: u64, n: usize) -> Batch {
        let records = (0..n)
            .map(|i| Record { value: i as f32, timestamp: i as i64, source: "t".into() })
            .collect();
        Batch::new(window, records).unwrap()
    }

    #[tokio::test]
    async fn single_attempt_by_default() {
        let sink = Flaky::new(1, SinkErrorKind::Connect);
        let worker = FlushWorker::new("p", sink.clone(), RetryPolicy::none());

        let result = worker.persist(&batch(1, 2)).await;
        assert_eq!(result.window, 1);
        assert_eq!(result.records, 2);
        assert_eq!(result.outcome.unwrap_err().message, "boom");
        assert_eq!(sink.calls(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let sink = Flaky::new(2, SinkErrorKind::Connect);
        let retry = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1)).unwrap();
        let worker = FlushWorker::new("p", sink.clone(), retry);

        let started = tokio::time::Instant::now();
        let result = worker.persist(&batch(7, 3)).await;
        assert_eq!(result.outcome, Ok(Stored { count: 3, target: "flaky".into() }));
        assert_eq!(sink.calls(), vec![7, 7, 7]);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn config_errors_are_not_retried() {
        let sink = Flaky::new(5, SinkErrorKind::Config);
        let retry = RetryPolicy::new(5, Duration::ZERO, Duration::ZERO).unwrap();
        let worker = FlushWorker::new("p", sink.clone(), retry);

        let result = worker.persist(&batch(1, 1)).await;
        assert_eq!(result.outcome.unwrap_err().kind, SinkErrorKind::Config);
        assert_eq!(sink.calls().len(), 1);
    }

    #[test]
    fn backlog_warns_once_per_crossing() {
        let mut backlog = Backlog::new(4);
        let seen: Vec<bool> = [1, 3, 4, 6, 9, 3, 2, 1, 5].into_iter().map(|d| backlog.observe(d)).collect();
        assert_eq!(seen, vec![false, false, true, false, false, false, false, false, true]);
    }

    #[tokio::test]
    async fn worker_reports_in_queue_order_and_stops_on_close() {
        let sink = Flaky::new(0, SinkErrorKind::Connect);
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (result_tx, mut result_rx) = mpsc::channel(8);
        let handle = FlushWorker::new("p", sink, RetryPolicy::none()).spawn(batch_rx, result_tx);

        for w in 1..=3 {
            batch_tx.send(batch(w, w as usize)).unwrap();
        }
        drop(batch_tx);
        handle.await.unwrap();

        let mut windows = Vec::new();
        while let Some(r) = result_rx.recv().await {
            windows.push((r.window, r.records));
        }
        assert_eq!(windows, vec![(1, 1), (2, 2), (3, 3)]);
    }
}
