//! Batch module: the orchestrator tying source, transformer, encoder and sink.
//!
//! A run moves through `Idle -> Confirming -> Running -> Finalizing -> Done`,
//! or ends in `Aborted` when the confirmation gate declines, the caller
//! cancels, or the sink fails. Per-item failures never abort a run; they are
//! collected in an [`ErrorLedger`] and written as the last archive entry.

mod config;
mod confirm;
mod error;
mod filter;
mod ledger;
mod orchestrator;
mod types;

pub use config::BatchConfig;
pub use confirm::{AutoConfirm, ConfirmationGate, LimitGate, RequestConfirmation};
pub use error::BatchError;
pub use filter::ItemFilter;
pub use ledger::{unique_log_name, ErrorLedger, LedgerEntry};
pub use orchestrator::BatchOrchestrator;
pub use types::{
    AbortReason, BatchEvent, BatchJob, BatchState, BatchSummary, ItemStatus, ProgressState,
    RunContext,
};
