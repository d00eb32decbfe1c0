//! In-memory sink for testing.

use async_trait::async_trait;
use std::io;

use crate::sink::{ArchiveSink, SinkError, SinkReport, WriteAck};

/// Sink that keeps every chunk in memory.
///
/// Can simulate a destination that runs out of space, or one that fails when
/// closed.
#[derive(Debug, Default)]
pub struct MemorySink {
    writes: Vec<Vec<u8>>,
    bytes_written: u64,
    capacity: Option<u64>,
    fail_on_close: bool,
    closed: bool,
    abort_reason: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse any write that would take the total past `limit` bytes.
    pub fn failing_after_bytes(mut self, limit: u64) -> Self {
        self.capacity = Some(limit);
        self
    }

    /// Fail when the archive is closed.
    pub fn failing_on_close(mut self) -> Self {
        self.fail_on_close = true;
        self
    }

    /// Accepted chunks in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// All accepted bytes concatenated.
    pub fn bytes(&self) -> Vec<u8> {
        self.writes.concat()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    fn ensure_open(&self) -> Result<(), SinkError> {
        if self.closed || self.abort_reason.is_some() {
            Err(SinkError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ArchiveSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&mut self, chunk: Vec<u8>) -> Result<WriteAck, SinkError> {
        self.ensure_open()?;
        let next = self.bytes_written + chunk.len() as u64;
        if self.capacity.is_some_and(|limit| next > limit) {
            return Err(SinkError::Io(io::Error::other("simulated storage full")));
        }
        self.bytes_written = next;
        self.writes.push(chunk);
        Ok(WriteAck {
            bytes_written: self.bytes_written,
        })
    }

    async fn close(&mut self) -> Result<SinkReport, SinkError> {
        self.ensure_open()?;
        if self.fail_on_close {
            return Err(SinkError::Io(io::Error::other("simulated close failure")));
        }
        self.closed = true;
        Ok(SinkReport {
            location: None,
            bytes_written: self.bytes_written,
            sha256: None,
        })
    }

    async fn abort(&mut self, reason: &str) {
        self.abort_reason = Some(reason.to_string());
    }
}
