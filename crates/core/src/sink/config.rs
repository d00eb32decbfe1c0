//! Configuration for the sink module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory where file-mode archives are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Chunks buffered between the encoder and a streaming consumer.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer_chunks: usize,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_stream_buffer() -> usize {
    4
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            stream_buffer_chunks: default_stream_buffer(),
        }
    }
}

impl SinkConfig {
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_stream_buffer(mut self, chunks: usize) -> Self {
        self.stream_buffer_chunks = chunks;
        self
    }
}
