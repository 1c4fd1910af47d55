//! Answer sync queue
//!
//! Debounces answer edits before they reach the backend:
//! - Collapsing edits per question (last-write-wins between ticks)
//! - Flushing on a fixed interval instead of per keystroke
//! - Updating rows that already exist, inserting the rest
//!
//! Flushes are fire-and-forget. A failed write is logged and dropped; the
//! next edit of that question queues it again.

use crate::client::RowWriter;
use crate::responses::{AnswerPayload, Response, ResponseChange, ResponseLink, ResponseStore};
use crate::types::Sheet;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Configuration for the sync queue
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Flush interval in milliseconds
    pub flush_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 3000,
        }
    }
}

impl SyncConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// How a queued question was dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Update,
    Insert,
}

/// Result of one flush tick
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Question ids with the dispatch chosen for each
    pub dispatched: Vec<(String, Dispatch)>,
    /// Queued questions whose response had no fields set
    pub skipped: usize,
    tasks: Vec<JoinHandle<()>>,
}

impl FlushReport {
    pub fn updates(&self) -> usize {
        self.dispatched.iter().filter(|(_, d)| *d == Dispatch::Update).count()
    }

    pub fn inserts(&self) -> usize {
        self.dispatched.iter().filter(|(_, d)| *d == Dispatch::Insert).count()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatched.is_empty()
    }

    /// Wait for every write of this tick to settle
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Answer write task did not finish: {}", e);
            }
        }
    }
}

/// Pending answer writes keyed by question id
///
/// # Example
///
/// ```rust,ignore
/// use survey_sync::{SyncQueue, SyncConfig};
///
/// let queue = SyncQueue::new(SyncConfig::default());
///
/// // Queue an edit
/// queue.record(change).await;
///
/// // Flush on the next tick
/// let report = queue.flush(&store, writer.clone(), &answers).await;
/// ```
#[derive(Clone)]
pub struct SyncQueue {
    config: SyncConfig,
    pending: Arc<Mutex<HashMap<String, Response>>>,
}

impl SyncQueue {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue a change.
    ///
    /// Replaces any earlier pending snapshot for the question. Changes with
    /// no fields set are ignored.
    pub async fn record(&self, change: ResponseChange) -> bool {
        if !change.values.is_populated() {
            return false;
        }

        let mut pending = self.pending.lock().await;
        tracing::trace!("Queued answer for question {}", change.question_id);
        pending.insert(change.question_id, change.values);
        true
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Take everything pending, leaving the queue empty
    pub async fn take_pending(&self) -> HashMap<String, Response> {
        std::mem::take(&mut *self.pending.lock().await)
    }

    /// Dispatch one write per pending question.
    ///
    /// Questions with an edit link are updated, the rest inserted into
    /// `answers`. The payload is built from the question's current response.
    pub async fn flush(
        &self,
        store: &Arc<Mutex<ResponseStore>>,
        writer: Arc<dyn RowWriter>,
        answers: &Arc<Sheet>,
    ) -> FlushReport {
        let pending = self.take_pending().await;
        let mut report = FlushReport::default();
        if pending.is_empty() {
            return report;
        }

        let mut writes = Vec::with_capacity(pending.len());
        {
            let store = store.lock().await;
            for (question_id, snapshot) in pending {
                let response = store.get(&question_id).unwrap_or(&snapshot);
                if !response.is_populated() {
                    report.skipped += 1;
                    continue;
                }

                let payload = AnswerPayload::new(&question_id, response);
                let edit_url = store.link(&question_id).and_then(|l| l.edit()).map(str::to_string);
                writes.push((question_id, payload, edit_url));
            }
        }

        for (question_id, payload, edit_url) in writes {
            let values = match serde_json::to_value(&payload) {
                Ok(values) => values,
                Err(e) => {
                    tracing::error!("Failed to encode answer for {}: {}", question_id, e);
                    continue;
                }
            };

            let dispatch = if edit_url.is_some() {
                Dispatch::Update
            } else {
                Dispatch::Insert
            };
            report.dispatched.push((question_id.clone(), dispatch));

            let writer = writer.clone();
            let store = store.clone();
            let answers = answers.clone();
            report.tasks.push(tokio::spawn(async move {
                let result = match edit_url {
                    Some(url) => writer.update(&url, values).await,
                    None => writer.insert(&answers, values).await,
                };

                match result {
                    Ok(outcome) => {
                        // Later edits of a freshly inserted answer go to its new row
                        if let Some(url) = outcome.row_url() {
                            let mut store = store.lock().await;
                            if store.link(&question_id).and_then(|l| l.edit()).is_none() {
                                store.set_link(&question_id, ResponseLink::from_edit_url(url));
                            }
                        }
                    }
                    Err(e) if e.is_cancelled() => {
                        tracing::debug!("Write for question {} cancelled", question_id);
                    }
                    Err(e) => {
                        tracing::warn!("Dropping answer write for question {}: {}", question_id, e);
                    }
                }
            }));
        }

        tracing::debug!(
            updates = report.updates(),
            inserts = report.inserts(),
            skipped = report.skipped,
            "Flushed answer queue"
        );

        report
    }

    /// Get the queue configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

/// Flush `queue` every interval until the task is aborted.
///
/// Ticks never wait for the writes of the previous tick.
pub fn spawn_flush_task(
    queue: SyncQueue,
    store: Arc<Mutex<ResponseStore>>,
    writer: Arc<dyn RowWriter>,
    answers: Arc<Sheet>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(queue.config().flush_interval());
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            queue.flush(&store, writer.clone(), &answers).await;
        }
    })
}
