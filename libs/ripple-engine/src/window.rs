use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use ripple_api::{Batch, Record};

use crate::config::WindowConfig;
use crate::error::WindowError;

/// What happened to an offered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Appended; the window now holds `len` records.
    Buffered { len: usize },
    /// Appended and the window reached `max_count`: it was closed and
    /// handed to the flush queue before `offer` returned.
    Closed { window: u64, records: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collecting,
    Drained,
}

/// What the timer task should be waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    /// No open window.
    Idle,
    Armed { window: u64, deadline: Instant },
    Stopped,
}

struct Window {
    seq: u64,
    records: Vec<Record>,
}

struct State {
    phase: Phase,
    /// `Some` only while the window holds at least one record.
    window: Option<Window>,
    next_seq: u64,
    /// Flush queue, unbounded; the flush worker warns when it backs up.
    /// Dropped on drain, which ends the flush worker.
    batches: Option<mpsc::UnboundedSender<Batch>>,
}

/// Time-or-count window state machine.
///
/// Все триггеры (offer, таймер, drain) закрывают окно под одним mutex'ом,
/// поэтому одно окно не может быть закрыто дважды. A window opens on the
/// first record after a close; the timer is armed for that window only, so
/// an idle stream never produces empty batches.
pub struct WindowAccumulator {
    config: WindowConfig,
    state: Mutex<State>,
    timer: watch::Sender<Timer>,
}

impl WindowAccumulator {
    /// Closed windows are sent to `batches` in close order.
    pub fn new(config: WindowConfig, batches: mpsc::UnboundedSender<Batch>) -> Self {
        let (timer, _) = watch::channel(Timer::Idle);
        Self {
            config,
            state: Mutex::new(State {
                phase: Phase::Collecting,
                window: None,
                next_seq: 1,
                batches: Some(batches),
            }),
            timer,
        }
    }

    /// Append a record to the current window, opening one if needed.
    pub async fn offer(&self, record: Record) -> Result<Offer, WindowError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.phase == Phase::Drained {
            return Err(WindowError::Drained);
        }

        let next_seq = &mut state.next_seq;
        let window = state.window.get_or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            self.timer.send_replace(Timer::Armed {
                window: seq,
                deadline: Instant::now() + self.config.max_duration(),
            });
            Window {
                seq,
                records: Vec::with_capacity(self.config.max_count().min(4096)),
            }
        });
        window.records.push(record);

        let len = window.records.len();
        if len < self.config.max_count() {
            return Ok(Offer::Buffered { len });
        }

        match self.close(state) {
            Some(window) => Ok(Offer::Closed { window, records: len }),
            None => Ok(Offer::Buffered { len }),
        }
    }

    /// Close the current window now if it holds anything.
    /// Returns the closed window's sequence number.
    pub async fn flush(&self) -> Option<u64> {
        let mut guard = self.state.lock().await;
        if guard.phase == Phase::Drained {
            return None;
        }
        self.close(&mut guard)
    }

    /// Final flush at end of input. Only the first call does anything;
    /// afterwards `offer` fails and the flush queue is closed.
    pub async fn drain(&self) -> Option<u64> {
        let mut guard = self.state.lock().await;
        if guard.phase == Phase::Drained {
            return None;
        }
        let closed = self.close(&mut guard);
        guard.phase = Phase::Drained;
        guard.batches = None;
        self.timer.send_replace(Timer::Stopped);
        closed
    }

    /// Number of records in the open window.
    pub async fn pending(&self) -> usize {
        let guard = self.state.lock().await;
        guard.window.as_ref().map_or(0, |w| w.records.len())
    }

    /// Spawn the time trigger. The task ends after `drain()`.
    pub fn spawn_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut rx = self.timer.subscribe();
        tokio::spawn(async move {
            loop {
                let timer = *rx.borrow_and_update();
                match timer {
                    Timer::Stopped => break,
                    Timer::Idle => {
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                    Timer::Armed { window, deadline } => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline) => {
                                if let Some(seq) = this.expire(window).await {
                                    tracing::debug!(window = seq, "window closed by timer");
                                }
                            }
                            changed = rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Timer fired for `window`. A count-triggered close may have won the
    /// race; then the open window (if any) is a newer one and is left alone.
    async fn expire(&self, window: u64) -> Option<u64> {
        let mut guard = self.state.lock().await;
        if guard.phase == Phase::Drained {
            return None;
        }
        let open = guard.window.as_ref().map(|w| w.seq);
        if open != Some(window) {
            return None;
        }
        self.close(&mut guard)
    }

    /// Snapshot + reset + enqueue, all inside the caller's critical section,
    /// so queue order equals close order.
    fn close(&self, state: &mut State) -> Option<u64> {
        let window = state.window.take()?;
        self.timer.send_replace(Timer::Idle);

        let seq = window.seq;
        let batch = Batch::new(seq, window.records)?;
        match &state.batches {
            Some(tx) => {
                if tx.send(batch).is_err() {
                    tracing::warn!(window = seq, "flush queue closed, window dropped");
                }
            }
            None => tracing::warn!(window = seq, "no flush queue, window dropped"),
        }
        Some(seq)
    }
}
