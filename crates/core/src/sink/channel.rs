//! Sink forwarding chunks to an in-process consumer.

use async_trait::async_trait;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

use super::error::SinkError;
use super::traits::{ArchiveSink, SinkReport, WriteAck};

type Chunk = Result<Vec<u8>, io::Error>;

/// Sends chunks over a bounded channel; writes wait while the channel is full.
///
/// Aborting delivers an error item so the consumer can tell a truncated
/// archive from a complete one.
pub struct ChannelSink {
    sender: Option<mpsc::Sender<Chunk>>,
    bytes_written: u64,
}

/// Receiving half of a [`ChannelSink`].
pub struct ArchiveStream {
    receiver: mpsc::Receiver<Chunk>,
}

impl ChannelSink {
    /// Creates a sink and its stream with room for `capacity` chunks.
    pub fn new(capacity: usize) -> (Self, ArchiveStream) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
                bytes_written: 0,
            },
            ArchiveStream { receiver },
        )
    }
}

#[async_trait]
impl ArchiveSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn write(&mut self, chunk: Vec<u8>) -> Result<WriteAck, SinkError> {
        let sender = self.sender.as_ref().ok_or(SinkError::Closed)?;
        let len = chunk.len() as u64;
        sender
            .send(Ok(chunk))
            .await
            .map_err(|_| SinkError::Disconnected)?;
        self.bytes_written += len;
        Ok(WriteAck {
            bytes_written: self.bytes_written,
        })
    }

    async fn close(&mut self) -> Result<SinkReport, SinkError> {
        let sender = self.sender.take().ok_or(SinkError::Closed)?;
        let disconnected = sender.is_closed();
        drop(sender);
        if disconnected {
            return Err(SinkError::Disconnected);
        }
        Ok(SinkReport {
            location: None,
            bytes_written: self.bytes_written,
            sha256: None,
        })
    }

    async fn abort(&mut self, reason: &str) {
        if let Some(sender) = self.sender.take() {
            let error = io::Error::new(io::ErrorKind::Interrupted, reason.to_string());
            // The consumer may already be gone.
            let _ = sender.send(Err(error)).await;
            debug!(reason, "Channel sink aborted");
        }
    }
}

impl ArchiveStream {
    /// Receives the next chunk, or `None` once the sink is closed.
    pub async fn recv(&mut self) -> Option<Chunk> {
        self.receiver.recv().await
    }
}

impl Stream for ArchiveStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
