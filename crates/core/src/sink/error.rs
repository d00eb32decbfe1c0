//! Error types for the sink module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while delivering archive bytes.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Refusing to overwrite an existing archive.
    #[error("Destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    /// The consumer went away.
    #[error("Archive consumer disconnected")]
    Disconnected,

    /// Write or close after the sink was closed or aborted.
    #[error("Sink is already closed")]
    Closed,

    /// I/O error while writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
