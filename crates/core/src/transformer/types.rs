//! Types for the transformer module.

use std::path::Path;

/// Input handed to a [`Transformer`](super::Transformer) for one item.
#[derive(Debug)]
pub struct TransformRequest<'a> {
    /// Identifier of the item, for diagnostics and output naming.
    pub identifier: &'a str,
    /// Raw item content. Ownership moves to the transformer for the call.
    pub content: Vec<u8>,
    /// Transformation policy (recipe), identical for every item of a batch.
    pub policy: &'a str,
    /// Private scratch directory, removed after the call returns.
    pub scratch_dir: &'a Path,
}

/// Normalized result of transforming one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The transformer produced output bytes (possibly empty).
    Success { name: String, bytes: Vec<u8> },
    /// The transformer failed; `message` is the diagnostic text.
    Failure { name: String, message: String },
}

impl TransformOutcome {
    pub fn success(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Success {
            name: name.into(),
            bytes,
        }
    }

    pub fn failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Identifier of the item this outcome belongs to.
    pub fn name(&self) -> &str {
        match self {
            Self::Success { name, .. } | Self::Failure { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
