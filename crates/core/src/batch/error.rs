//! Error types for the batch module.

use thiserror::Error;

use super::types::BatchState;
use crate::archive::ArchiveError;
use crate::sink::SinkError;

/// Conditions that end a run early. Item failures are never `BatchError`s.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The run was cancelled by the caller.
    #[error("Batch cancelled")]
    Cancelled,

    /// The sink refused a write or failed to close.
    #[error("Sink failure: {0}")]
    Sink(#[from] SinkError),

    /// The encoder was driven out of order.
    #[error("Archive protocol violation: {0}")]
    Protocol(#[from] ArchiveError),

    /// The state machine was asked to make an illegal move.
    #[error("Invalid batch state transition from {from} to {to}")]
    InvalidTransition { from: BatchState, to: BatchState },
}
