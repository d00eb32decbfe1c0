//! Streaming ZIP archive encoder.
//!
//! The encoder never seeks: every entry is written as a local header followed
//! by its payload and a trailing data descriptor, and the central directory is
//! appended by [`ArchiveEncoder::finish`]. Encoded bytes are cut into chunks of
//! at most `block_threshold_bytes` and handed out through
//! [`ArchiveEncoder::take_chunks`] as soon as a block fills up.
//!
//! # Example
//!
//! ```ignore
//! use streambatch_core::archive::{ArchiveConfig, ArchiveEncoder};
//!
//! let mut encoder = ArchiveEncoder::new(ArchiveConfig::default());
//! let entry = encoder.open("scans/0001.dcm")?;
//! encoder.push(&entry, &cleaned_bytes)?;
//! encoder.close(entry)?;
//! encoder.finish()?;
//!
//! for chunk in encoder.take_chunks() {
//!     sink.write(chunk).await?;
//! }
//! ```

mod config;
mod encoder;
mod error;
mod format;

pub use config::{ArchiveConfig, CompressionMethod};
pub use encoder::{
    is_valid_entry_name, ArchiveEncoder, EntryHandle, MAX_ENTRY_BYTES, MAX_ENTRY_NAME_BYTES,
};
pub use error::ArchiveError;
pub use format::DosDateTime;
