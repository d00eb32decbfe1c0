//! Error types for the archive encoder.

use thiserror::Error;

/// Errors raised by [`ArchiveEncoder`](super::ArchiveEncoder).
///
/// Apart from `Codec`, every variant is a usage-protocol violation by the
/// caller and indicates a defect in the driving code.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// `open` was called while another entry was still open.
    #[error("Entry '{open}' is still open, cannot open '{requested}'")]
    EntryAlreadyOpen { open: String, requested: String },

    /// The handle does not refer to the currently open entry.
    #[error("Entry handle {id} is not open on this encoder")]
    UnknownEntry { id: u64 },

    /// `finish` was called while an entry was open.
    #[error("Cannot finish archive while entry '{name}' is open")]
    EntryStillOpen { name: String },

    /// The archive was already finished.
    #[error("Archive already finished")]
    AlreadyFinished,

    /// Entries must have a name.
    #[error("Entry name must not be empty")]
    EmptyEntryName,

    /// Entry name does not fit the 16-bit length field of a header.
    #[error("Entry name of {len} bytes exceeds the maximum of {limit} bytes")]
    EntryNameTooLong { len: usize, limit: usize },

    /// Entry payload exceeds what a single entry can describe.
    #[error("Entry '{name}' exceeds the maximum entry size of {limit} bytes")]
    EntryTooLarge { name: String, limit: u64 },

    /// The compression codec failed.
    #[error("Compression codec error: {0}")]
    Codec(#[from] std::io::Error),
}

impl ArchiveError {
    /// Whether this error is a misuse of the open/push/close/finish protocol.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, Self::Codec(_))
    }
}
