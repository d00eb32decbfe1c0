//! Item sources enumerate the files of a batch.
//!
//! A source exposes the complete ordered list of item descriptors (identifier
//! and size) before any processing starts, so the orchestrator can report the
//! batch size up front. Item content is only read when an item is loaded, one
//! item at a time.

mod directory;
mod error;
mod memory;
mod traits;
mod types;

pub use directory::DirectorySource;
pub use error::SourceError;
pub use memory::MemorySource;
pub use traits::ItemSource;
pub use types::{BatchItem, ItemDescriptor, Preflight};
