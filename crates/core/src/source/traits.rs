//! Trait definitions for the source module.

use async_trait::async_trait;

use super::error::SourceError;
use super::types::{BatchItem, ItemDescriptor, Preflight};

/// An ordered, fully enumerated set of batch items.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// All items in processing order.
    fn descriptors(&self) -> &[ItemDescriptor];

    /// Reads the content of one item.
    async fn load(&self, descriptor: &ItemDescriptor) -> Result<BatchItem, SourceError>;

    /// Number of items in the batch.
    fn total_count(&self) -> usize {
        self.descriptors().len()
    }

    /// Sum of all item sizes.
    fn total_bytes(&self) -> u64 {
        self.descriptors().iter().map(|d| d.size).sum()
    }

    /// Totals for the confirmation step.
    fn preflight(&self) -> Preflight {
        Preflight {
            item_count: self.total_count(),
            total_bytes: self.total_bytes(),
        }
    }
}
