//! Trait definitions for the sink module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::SinkError;

/// Acknowledgement of one accepted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAck {
    /// Total bytes accepted so far.
    pub bytes_written: u64,
}

/// What a sink reports once the archive is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkReport {
    /// Where the archive can be found, if it was persisted.
    pub location: Option<String>,
    pub bytes_written: u64,
    /// Hex SHA-256 of the archive bytes, when the sink computes one.
    pub sha256: Option<String>,
}

/// Destination accepting archive chunks in order.
///
/// A write that returns an error is terminal for the batch. `close` is called
/// exactly once after the last chunk; `abort` is called instead when the
/// batch stops early and must leave no complete-looking archive behind.
#[async_trait]
pub trait ArchiveSink: Send {
    /// Returns the name of this sink implementation.
    fn name(&self) -> &str;

    /// Accepts the next chunk. Waits while the consumer is behind.
    async fn write(&mut self, chunk: Vec<u8>) -> Result<WriteAck, SinkError>;

    /// Finalizes the archive.
    async fn close(&mut self) -> Result<SinkReport, SinkError>;

    /// Discards the partial archive, telling the consumer why.
    async fn abort(&mut self, reason: &str);
}
