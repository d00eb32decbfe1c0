//! Error types for the source module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while listing or reading batch items.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The batch root does not exist.
    #[error("Batch root not found: {path}")]
    RootNotFound { path: PathBuf },

    /// The batch root is not a directory.
    #[error("Batch root is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Listing the batch failed.
    #[error("Failed to list {path}: {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A listed path does not lie below the batch root.
    #[error("Path is outside the batch root: {path}")]
    InvalidPath { path: PathBuf },

    /// The item is not part of this source.
    #[error("Unknown item: {identifier}")]
    UnknownItem { identifier: String },

    /// Reading one item failed.
    #[error("Failed to read {identifier}: {source}")]
    Read {
        identifier: String,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    /// Whether the error concerns a single item rather than the whole batch.
    pub fn is_item_level(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::UnknownItem { .. })
    }
}
