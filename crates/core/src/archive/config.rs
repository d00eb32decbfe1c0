//! Configuration for the archive encoder.

use serde::{Deserialize, Serialize};

/// How entry payloads are stored inside the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMethod {
    /// Payload bytes are copied verbatim (ZIP method 0).
    #[default]
    Stored,
    /// Payload bytes are deflated (ZIP method 8).
    Deflate,
}

impl CompressionMethod {
    /// ZIP method code written into the headers.
    pub fn code(&self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 8,
        }
    }
}

/// Configuration for the streaming archive encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Size at which buffered output is cut into a chunk and emitted.
    #[serde(default = "default_block_threshold")]
    pub block_threshold_bytes: usize,

    /// Compression applied to entry payloads.
    #[serde(default)]
    pub compression: CompressionMethod,

    /// Deflate level (0-9), ignored for stored entries.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Stamp entries with the local time instead of the DOS epoch.
    ///
    /// Leaving this off makes repeated runs over the same input produce
    /// byte-identical archives.
    #[serde(default)]
    pub use_current_time: bool,

    /// File name offered to clients downloading a streamed archive.
    #[serde(default = "default_download_name")]
    pub download_name: String,
}

fn default_block_threshold() -> usize {
    64 * 1024
}

fn default_compression_level() -> u32 {
    6
}

fn default_download_name() -> String {
    "processed_output.zip".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            block_threshold_bytes: default_block_threshold(),
            compression: CompressionMethod::default(),
            compression_level: default_compression_level(),
            use_current_time: false,
            download_name: default_download_name(),
        }
    }
}

impl ArchiveConfig {
    /// Sets the block threshold.
    pub fn with_block_threshold(mut self, bytes: usize) -> Self {
        self.block_threshold_bytes = bytes;
        self
    }

    /// Sets the compression method.
    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the deflate level.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Enables wall-clock timestamps.
    pub fn with_current_time(mut self, enabled: bool) -> Self {
        self.use_current_time = enabled;
        self
    }
}
