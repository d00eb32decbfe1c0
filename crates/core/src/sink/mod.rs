//! Sink module: the destination of archive bytes.
//!
//! A sink receives the encoder's chunks in order. `FileSink` writes to a
//! partial file that is renamed into place on close; `ChannelSink` forwards
//! chunks to a bounded channel, typically drained by an HTTP response body.

mod channel;
mod config;
mod error;
mod file;
mod traits;

pub use channel::{ArchiveStream, ChannelSink};
pub use config::SinkConfig;
pub use error::SinkError;
pub use file::FileSink;
pub use traits::{ArchiveSink, SinkReport, WriteAck};
