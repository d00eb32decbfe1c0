//! In-memory registry of batches started through the API.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use streambatch_core::{BatchEvent, BatchState, BatchSummary, ProgressState};

use crate::metrics::BATCHES_ACTIVE;

/// Progress events buffered between a run and the registry.
const EVENT_BUFFER_SIZE: usize = 256;

/// Finished batches kept when no explicit limit is given.
pub const DEFAULT_RETAINED_BATCHES: usize = 1000;

/// Where a batch delivers its archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Streamed to the HTTP client.
    #[default]
    Stream,
    /// Written below the configured output directory.
    File,
}

/// Externally visible view of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub batch_id: String,
    pub state: BatchState,
    pub destination: Destination,
    pub progress: ProgressState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BatchSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_line: Option<String>,
}

struct BatchRecord {
    status: BatchStatus,
    cancel: CancellationToken,
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The batch was running and has been asked to stop.
    Cancelling,
    /// The batch had already reached a terminal state.
    AlreadyFinished,
    NotFound,
}

/// Shared registry keyed by batch id.
///
/// Unfinished batches are always kept. Once more than `retained` batches
/// have finished, the oldest finished records are evicted.
#[derive(Clone)]
pub struct BatchRegistry {
    inner: Arc<RwLock<HashMap<String, BatchRecord>>>,
    runs: TaskTracker,
    retained: usize,
}

impl Default for BatchRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_BATCHES)
    }
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retained: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            runs: TaskTracker::new(),
            retained: retained.max(1),
        }
    }

    /// Spawns a batch run that [`shutdown`](Self::shutdown) waits for.
    pub fn spawn_run<F>(&self, run: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runs.spawn(run);
    }

    /// Number of spawned runs that have not completed.
    pub fn running(&self) -> usize {
        self.runs.len()
    }

    /// Cancels every unfinished batch and waits for the runs to wind down.
    ///
    /// Returns `false` if some run was still going after `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let cancelled = self.cancel_all().await;
        self.runs.close();
        info!(cancelled, running = self.runs.len(), "Waiting for batch runs to stop");

        match tokio::time::timeout(grace, self.runs.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    running = self.runs.len(),
                    grace_secs = grace.as_secs(),
                    "Batch runs still active after grace period"
                );
                false
            }
        }
    }

    /// Registers a new batch and returns the token that cancels it.
    pub async fn register(
        &self,
        batch_id: &str,
        destination: Destination,
        total: usize,
        location: Option<String>,
    ) -> CancellationToken {
        let cancel = CancellationToken::new();
        let record = BatchRecord {
            status: BatchStatus {
                batch_id: batch_id.to_string(),
                state: BatchState::Idle,
                destination,
                progress: ProgressState::new(total),
                created_at: Utc::now(),
                location,
                summary: None,
                status_line: None,
            },
            cancel: cancel.clone(),
        };

        self.inner.write().await.insert(batch_id.to_string(), record);
        BATCHES_ACTIVE.inc();
        debug!(batch_id, ?destination, total, "Registered batch");
        cancel
    }

    /// Spawns a task folding the run's progress events into the registry.
    ///
    /// The task ends when every clone of the returned sender is dropped.
    pub fn track(&self, batch_id: &str) -> mpsc::Sender<BatchEvent> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let registry = self.clone();
        let batch_id = batch_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                registry.apply(&batch_id, &event).await;
            }
        });
        tx
    }

    /// Applies one progress event.
    pub async fn apply(&self, batch_id: &str, event: &BatchEvent) {
        if let BatchEvent::Finished { summary } = event {
            self.finish(summary.clone()).await;
            return;
        }

        let mut batches = self.inner.write().await;
        let Some(record) = batches.get_mut(batch_id) else {
            return;
        };
        let status = &mut record.status;
        if status.state.is_terminal() {
            return;
        }

        match event {
            BatchEvent::Confirming { item_count, .. } => {
                status.state = BatchState::Confirming;
                status.progress.total = *item_count;
            }
            BatchEvent::Declined => status.state = BatchState::Aborted,
            BatchEvent::Started { total } => {
                status.state = BatchState::Running;
                status.progress.total = *total;
            }
            BatchEvent::ItemFinished {
                processed, total, ..
            } => {
                status.progress = ProgressState {
                    processed: *processed,
                    total: *total,
                };
            }
            BatchEvent::Finalizing => status.state = BatchState::Finalizing,
            BatchEvent::Finished { .. } => {}
        }
    }

    /// Records the terminal summary of a batch. Repeated calls are no-ops.
    pub async fn finish(&self, summary: BatchSummary) {
        let mut batches = self.inner.write().await;
        let Some(record) = batches.get_mut(&summary.batch_id) else {
            return;
        };
        if record.status.summary.is_some() {
            return;
        }

        BATCHES_ACTIVE.dec();
        let status = &mut record.status;
        status.state = if summary.aborted {
            BatchState::Aborted
        } else {
            BatchState::Done
        };
        status.progress = ProgressState {
            processed: summary.processed(),
            total: summary.total,
        };
        if let Some(location) = summary.archive.as_ref().and_then(|a| a.location.clone()) {
            status.location = Some(location);
        }
        status.status_line = Some(summary.status_line());
        info!(
            batch_id = %summary.batch_id,
            state = %status.state,
            "{}",
            summary.status_line()
        );
        status.summary = Some(summary);
        evict_finished(&mut batches, self.retained);
    }

    pub async fn get(&self, batch_id: &str) -> Option<BatchStatus> {
        self.inner
            .read()
            .await
            .get(batch_id)
            .map(|r| r.status.clone())
    }

    /// All batches, oldest first.
    pub async fn list(&self) -> Vec<BatchStatus> {
        let mut batches: Vec<BatchStatus> = self
            .inner
            .read()
            .await
            .values()
            .map(|r| r.status.clone())
            .collect();
        batches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        batches
    }

    pub async fn cancel(&self, batch_id: &str) -> CancelOutcome {
        let batches = self.inner.read().await;
        match batches.get(batch_id) {
            None => CancelOutcome::NotFound,
            Some(record) if record.status.summary.is_some() => CancelOutcome::AlreadyFinished,
            Some(record) => {
                record.cancel.cancel();
                info!(batch_id, "Batch cancellation requested");
                CancelOutcome::Cancelling
            }
        }
    }

    /// Cancels every unfinished batch, returning how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let batches = self.inner.read().await;
        let mut cancelled = 0;
        for record in batches.values().filter(|r| r.status.summary.is_none()) {
            record.cancel.cancel();
            cancelled += 1;
        }
        cancelled
    }
}

/// Drops the oldest finished records beyond `retained`.
fn evict_finished(batches: &mut HashMap<String, BatchRecord>, retained: usize) {
    let mut finished: Vec<(DateTime<Utc>, String)> = batches
        .values()
        .filter(|r| r.status.summary.is_some())
        .map(|r| (r.status.created_at, r.status.batch_id.clone()))
        .collect();
    if finished.len() <= retained {
        return;
    }

    finished.sort();
    let excess = finished.len() - retained;
    for (_, batch_id) in finished.into_iter().take(excess) {
        batches.remove(&batch_id);
        debug!(batch_id = %batch_id, "Evicted finished batch");
    }
}
