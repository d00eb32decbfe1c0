//! Types for the batch module.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::sink::SinkReport;

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Confirming,
    Running,
    Finalizing,
    Done,
    Aborted,
}

impl BatchState {
    /// Whether moving from `self` to `next` is a legal step.
    pub fn can_transition_to(&self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Idle, Confirming)
                | (Confirming, Running)
                | (Confirming, Aborted)
                | (Running, Finalizing)
                | (Running, Aborted)
                | (Finalizing, Done)
                | (Finalizing, Aborted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Done | BatchState::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Idle => "idle",
            BatchState::Confirming => "confirming",
            BatchState::Running => "running",
            BatchState::Finalizing => "finalizing",
            BatchState::Done => "done",
            BatchState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one item from the batch's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Succeeded => "succeeded",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }
}

/// Items handled so far out of the batch total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub processed: usize,
    pub total: usize,
}

impl ProgressState {
    pub fn new(total: usize) -> Self {
        Self {
            processed: 0,
            total,
        }
    }

    /// Rounded completion percentage; an empty batch is complete.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed as f64 / self.total as f64) * 100.0).round() as u8
    }
}

/// Why a run ended without a usable archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The confirmation step was refused.
    Declined,
    /// The caller cancelled the run.
    Cancelled,
    /// The destination failed.
    SinkFailure { message: String },
    /// The encoder was misused.
    ProtocolViolation { message: String },
}

impl AbortReason {
    /// Whether this is a critical failure rather than a user decision.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            AbortReason::SinkFailure { .. } | AbortReason::ProtocolViolation { .. }
        )
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Declined => f.write_str("declined"),
            AbortReason::Cancelled => f.write_str("cancelled"),
            AbortReason::SinkFailure { message } => write!(f, "sink failure: {message}"),
            AbortReason::ProtocolViolation { message } => {
                write!(f, "archive protocol violation: {message}")
            }
        }
    }
}

/// Terminal result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
    /// Archive bytes accepted by the sink.
    pub bytes_written: u64,
    pub duration_ms: u64,
    /// Sink report of a completed archive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<SinkReport>,
}

impl BatchSummary {
    /// Items that reached a terminal per-item outcome.
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// One-line final status for a user interface.
    pub fn status_line(&self) -> String {
        match &self.abort_reason {
            None => format!(
                "{} succeeded / {} failed, archive saved",
                self.succeeded, self.failed
            ),
            Some(AbortReason::Declined) => "Batch declined, nothing was processed".to_string(),
            Some(AbortReason::Cancelled) => format!(
                "Batch cancelled after {} of {} items, no usable archive",
                self.processed(),
                self.total
            ),
            Some(reason) => format!("Critical failure, no usable archive: {reason}"),
        }
    }
}

/// Progress notification emitted while a run advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Confirming {
        item_count: usize,
        total_bytes: u64,
    },
    Declined,
    Started {
        total: usize,
    },
    ItemFinished {
        identifier: String,
        status: ItemStatus,
        processed: usize,
        total: usize,
    },
    Finalizing,
    Finished {
        summary: BatchSummary,
    },
}

/// What to run: identity and the policy applied to every item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub batch_id: String,
    pub policy: String,
}

impl BatchJob {
    pub fn new(batch_id: impl Into<String>, policy: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            policy: policy.into(),
        }
    }
}

/// Caller-side hooks for one run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub progress: Option<mpsc::Sender<BatchEvent>>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: mpsc::Sender<BatchEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(abort_reason: Option<AbortReason>) -> BatchSummary {
        BatchSummary {
            batch_id: "b1".to_string(),
            total: 5,
            succeeded: 2,
            failed: 1,
            skipped: 0,
            aborted: abort_reason.is_some(),
            abort_reason,
            bytes_written: 0,
            duration_ms: 0,
            archive: None,
        }
    }

    #[test]
    fn test_legal_transitions() {
        use BatchState::*;
        assert!(Idle.can_transition_to(Confirming));
        assert!(Confirming.can_transition_to(Aborted));
        assert!(Running.can_transition_to(Aborted));
        assert!(Finalizing.can_transition_to(Done));

        assert!(!Idle.can_transition_to(Running));
        assert!(!Confirming.can_transition_to(Finalizing));
        assert!(!Done.can_transition_to(Aborted));
        assert!(!Aborted.can_transition_to(Running));
    }

    #[test]
    fn test_percent() {
        assert_eq!(ProgressState::new(0).percent(), 100);
        assert_eq!(
            ProgressState {
                processed: 1,
                total: 3
            }
            .percent(),
            33
        );
        assert_eq!(
            ProgressState {
                processed: 2,
                total: 3
            }
            .percent(),
            67
        );
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(
            summary(None).status_line(),
            "2 succeeded / 1 failed, archive saved"
        );
        assert!(summary(Some(AbortReason::SinkFailure {
            message: "disk full".to_string()
        }))
        .status_line()
        .starts_with("Critical failure, no usable archive"));
        assert!(summary(Some(AbortReason::Cancelled))
            .status_line()
            .contains("3 of 5"));
    }

    #[test]
    fn test_event_serialization() {
        let event = BatchEvent::ItemFinished {
            identifier: "a.dcm".to_string(),
            status: ItemStatus::Failed,
            processed: 1,
            total: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "item_finished");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["processed"], 1);
    }

    #[test]
    fn test_abort_reason_serialization() {
        let json = serde_json::to_value(AbortReason::SinkFailure {
            message: "gone".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "sink_failure");
        assert_eq!(json["message"], "gone");
    }
}
