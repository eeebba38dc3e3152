use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use ripple_api::{Batch, BatchSink, Record, SinkError, Stored};

// ═══════════════════════════════════════════════════════════════
//  MemorySinkConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_records() -> usize {
    100_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemorySinkConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for MemorySinkConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemorySink
// ═══════════════════════════════════════════════════════════════

/// In-memory ring-buffer sink. Для локального запуска без базы и для
/// тестов: хранит последние `max_records` записей.
pub struct MemorySink {
    records: RwLock<VecDeque<Record>>,
    max_records: usize,
    ready: AtomicBool,
}

impl MemorySink {
    pub fn new(config: &MemorySinkConfig) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(config.max_records.min(65536))),
            max_records: config.max_records,
            ready: AtomicBool::new(false),
        }
    }

    /// Copy of the retained records, oldest first.
    pub async fn snapshot(&self) -> Vec<Record> {
        self.records.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl BatchSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async {
            if self.max_records == 0 {
                return Err(SinkError::config("memory sink max_records must be greater than 0"));
            }
            self.ready.store(true, Ordering::Release);
            Ok(())
        })
    }

    fn persist<'a>(
        &'a self,
        batch: &'a Batch,
    ) -> Pin<Box<dyn Future<Output = Result<Stored, SinkError>> + Send + 'a>> {
        Box::pin(async move {
            if !self.ready.load(Ordering::Acquire) {
                return Err(SinkError::closed("memory sink used before init"));
            }
            // Один write-lock на весь batch: читатели не видят его частично.
            let mut buf = self.records.write().await;
            for record in batch.records() {
                if buf.len() >= self.max_records {
                    buf.pop_front();
                }
                buf.push_back(record.clone());
            }
            Ok(Stored {
                count: batch.len(),
                target: "memory".into(),
            })
        })
    }
}
