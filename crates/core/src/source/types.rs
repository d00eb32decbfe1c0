//! Types for the source module.

use serde::{Deserialize, Serialize};

/// Identifier and size of an item, known before its content is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Relative, `/`-separated path unique within the batch.
    pub identifier: String,
    /// Size of the item content in bytes.
    pub size: u64,
    /// Position in the source's processing order.
    #[serde(default)]
    pub index: usize,
}

impl ItemDescriptor {
    pub fn new(identifier: impl Into<String>, size: u64) -> Self {
        Self {
            identifier: identifier.into(),
            size,
            index: 0,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// File extension of the last path component, if any.
    pub fn extension(&self) -> Option<&str> {
        let file_name = self.identifier.rsplit('/').next()?;
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }

    /// Whether any path component starts with a dot.
    pub fn is_hidden(&self) -> bool {
        self.identifier
            .split('/')
            .any(|part| part.starts_with('.') && part.len() > 1)
    }
}

/// One batch item with its content loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub identifier: String,
    pub content: Vec<u8>,
    pub size: u64,
}

impl BatchItem {
    pub fn new(identifier: impl Into<String>, content: Vec<u8>) -> Self {
        let size = content.len() as u64;
        Self {
            identifier: identifier.into(),
            content,
            size,
        }
    }
}

/// Batch totals presented for confirmation before a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preflight {
    pub item_count: usize,
    pub total_bytes: u64,
}

impl Preflight {
    /// Human readable size in megabytes, as shown in confirmation prompts.
    pub fn total_megabytes(&self) -> f64 {
        self.total_bytes as f64 / 1024.0 / 1024.0
    }
}
