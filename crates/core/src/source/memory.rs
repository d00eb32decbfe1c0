//! In-memory item source.

use async_trait::async_trait;

use super::error::SourceError;
use super::traits::ItemSource;
use super::types::{BatchItem, ItemDescriptor};

/// Source backed by owned `(identifier, bytes)` pairs.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    descriptors: Vec<ItemDescriptor>,
    contents: Vec<Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item; items are processed in insertion order.
    pub fn with_item(mut self, identifier: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.push(identifier, content);
        self
    }

    /// Appends an item.
    pub fn push(&mut self, identifier: impl Into<String>, content: impl Into<Vec<u8>>) {
        let content = content.into();
        let index = self.descriptors.len();
        self.descriptors
            .push(ItemDescriptor::new(identifier, content.len() as u64).with_index(index));
        self.contents.push(content);
    }
}

impl<I, C> FromIterator<(I, C)> for MemorySource
where
    I: Into<String>,
    C: Into<Vec<u8>>,
{
    fn from_iter<T: IntoIterator<Item = (I, C)>>(iter: T) -> Self {
        let mut source = Self::new();
        for (identifier, content) in iter {
            source.push(identifier, content);
        }
        source
    }
}

#[async_trait]
impl ItemSource for MemorySource {
    fn descriptors(&self) -> &[ItemDescriptor] {
        &self.descriptors
    }

    async fn load(&self, descriptor: &ItemDescriptor) -> Result<BatchItem, SourceError> {
        let content = self
            .descriptors
            .get(descriptor.index)
            .filter(|d| d.identifier == descriptor.identifier)
            .and_then(|_| self.contents.get(descriptor.index))
            .ok_or_else(|| SourceError::UnknownItem {
                identifier: descriptor.identifier.clone(),
            })?;

        Ok(BatchItem::new(descriptor.identifier.clone(), content.clone()))
    }
}
