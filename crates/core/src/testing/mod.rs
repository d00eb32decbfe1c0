//! Testing utilities and mock implementations.
//!
//! This module provides a scriptable transformer and an in-memory sink so
//! the whole pipeline can be exercised without external programs or disks.
//!
//! # Example
//!
//! ```rust,ignore
//! use streambatch_core::testing::{MemorySink, MockTransformer};
//!
//! let transformer = MockTransformer::new()
//!     .with_output("a.dcm", b"AAA".to_vec())
//!     .with_error("b.dcm", "bad format");
//! let mut sink = MemorySink::new().failing_after_bytes(10_000);
//!
//! // Run a batch, then inspect
//! let calls = transformer.recorded_calls().await;
//! let archive = sink.bytes();
//! ```

mod memory_sink;
mod mock_transformer;

pub use memory_sink::MemorySink;
pub use mock_transformer::{MockTransformer, RecordedCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::source::MemorySource;

    /// A source of `count` items named `item-000.bin`, `item-001.bin`, ...
    /// each holding `size` bytes derived from its index.
    pub fn numbered_source(count: usize, size: usize) -> MemorySource {
        (0..count)
            .map(|i| {
                let content: Vec<u8> = (0..size).map(|b| ((i + b) % 251) as u8).collect();
                (format!("item-{i:03}.bin"), content)
            })
            .collect()
    }

    /// A small study-like hierarchy with a hidden file and a non-image file.
    pub fn study_source() -> MemorySource {
        MemorySource::new()
            .with_item("study/series1/img001.dcm", b"DICM-1".to_vec())
            .with_item("study/series1/img002.dcm", b"DICM-2".to_vec())
            .with_item("study/series2/img001.dcm", b"DICM-3".to_vec())
            .with_item("study/.DS_Store", b"junk".to_vec())
            .with_item("study/README.txt", b"notes".to_vec())
    }
}

#[cfg(test)]
pub(crate) use archive_reader::read_archive;

#[cfg(test)]
mod archive_reader {
    use std::io::{Cursor, Read};

    /// Reads every entry of a ZIP archive with an independent decoder.
    pub(crate) fn read_archive(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }
}
