//! Error types for the transformer module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while transforming one item.
///
/// These never escape the gateway: they become the diagnostic text of a
/// `TransformOutcome::Failure`.
#[derive(Debug, Error)]
pub enum TransformerError {
    /// The transformer rejected the content or the policy.
    #[error("{reason}")]
    Rejected { reason: String },

    /// Transformer program not found.
    #[error("Transformer program not found: {path}")]
    ProgramNotFound { path: PathBuf },

    /// Transformer program exited unsuccessfully.
    #[error("Transformer exited with {}: {stderr}", status.map(|c| format!("status {c}")).unwrap_or_else(|| "a signal".to_string()))]
    CommandFailed { status: Option<i32>, stderr: String },

    /// The program succeeded but left no output file.
    #[error("Transformed output not found: {path}")]
    OutputMissing { path: PathBuf },

    /// The call took too long.
    #[error("Transformation timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The transformer panicked.
    #[error("Transformer panicked: {message}")]
    Panicked { message: String },

    /// Setting up or tearing down the scratch directory failed.
    #[error("Scratch directory error: {source}")]
    Scratch {
        #[source]
        source: std::io::Error,
    },

    /// The backend is missing configuration.
    #[error("Transformer not configured: {reason}")]
    NotConfigured { reason: String },

    /// The gateway no longer accepts calls.
    #[error("Transformer unavailable")]
    Unavailable,

    /// I/O error during transformation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransformerError {
    /// Creates a rejection with the transformer's diagnostic text.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Creates a not-configured error.
    pub fn not_configured(reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            reason: reason.into(),
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::ProgramNotFound { .. } => "program_not_found",
            Self::CommandFailed { .. } => "command_failed",
            Self::OutputMissing { .. } => "output_missing",
            Self::Timeout { .. } => "timeout",
            Self::Panicked { .. } => "panicked",
            Self::Scratch { .. } => "scratch",
            Self::NotConfigured { .. } => "not_configured",
            Self::Unavailable => "unavailable",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_displays_reason_verbatim() {
        let err = TransformerError::rejected("bad format");
        assert_eq!(err.to_string(), "bad format");
    }

    #[test]
    fn test_command_failed_display() {
        let err = TransformerError::CommandFailed {
            status: Some(3),
            stderr: "invalid tag".to_string(),
        };
        assert_eq!(err.to_string(), "Transformer exited with status 3: invalid tag");

        let err = TransformerError::CommandFailed {
            status: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("a signal"));
    }
}
