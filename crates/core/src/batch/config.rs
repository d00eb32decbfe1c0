//! Configuration for the batch module.

use serde::{Deserialize, Serialize};

/// Per-run policy of the batch orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Only transform items with these extensions (case-insensitive).
    /// Empty means every item is processed.
    #[serde(default)]
    pub include_extensions: Vec<String>,

    /// Skip items whose path contains a dot-prefixed component.
    #[serde(default)]
    pub skip_hidden: bool,

    /// Archive entry name for the consolidated error log.
    #[serde(default = "default_error_log_name")]
    pub error_log_name: String,

    /// Longest diagnostic kept per failed item.
    #[serde(default = "default_max_error_message_bytes")]
    pub max_error_message_bytes: usize,

    /// Decline batches with more items than this.
    #[serde(default)]
    pub max_items: Option<usize>,

    /// Decline batches larger than this many input bytes.
    #[serde(default)]
    pub max_total_bytes: Option<u64>,
}

fn default_error_log_name() -> String {
    "processing_errors.log".to_string()
}

fn default_max_error_message_bytes() -> usize {
    4096
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            include_extensions: Vec::new(),
            skip_hidden: false,
            error_log_name: default_error_log_name(),
            max_error_message_bytes: default_max_error_message_bytes(),
            max_items: None,
            max_total_bytes: None,
        }
    }
}

impl BatchConfig {
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    pub fn with_error_log_name(mut self, name: impl Into<String>) -> Self {
        self.error_log_name = name.into();
        self
    }

    pub fn with_max_error_message_bytes(mut self, max: usize) -> Self {
        self.max_error_message_bytes = max;
        self
    }

    pub fn with_limits(mut self, max_items: Option<usize>, max_total_bytes: Option<u64>) -> Self {
        self.max_items = max_items;
        self.max_total_bytes = max_total_bytes;
        self
    }
}
