//! Incremental ZIP encoder.

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use std::collections::VecDeque;
use std::io::Write;
use tracing::debug;

use super::config::{ArchiveConfig, CompressionMethod};
use super::error::ArchiveError;
use super::format::{self, CentralRecord, DosDateTime};

/// Largest payload a single entry may carry.
///
/// Entries use 32-bit data descriptors, so payloads stay below 4 GiB with
/// headroom for deflate expansion of incompressible input.
pub const MAX_ENTRY_BYTES: u64 = 0xFFFF_FFFF - 16 * 1024 * 1024;

/// Longest entry name, in bytes, after normalization.
pub const MAX_ENTRY_NAME_BYTES: usize = u16::MAX as usize;

/// Handle to the entry currently open on an [`ArchiveEncoder`].
///
/// Handles are consumed by [`ArchiveEncoder::close`], so a closed entry
/// cannot be pushed to again.
#[derive(Debug)]
pub struct EntryHandle {
    id: u64,
}

impl EntryHandle {
    /// Identifier of the entry on its encoder.
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct OpenEntry {
    id: u64,
    name: String,
    header_offset: u64,
    crc: Crc,
    uncompressed_size: u64,
    compressed_size: u64,
    deflater: Option<DeflateEncoder<Vec<u8>>>,
}

/// Streaming ZIP writer that emits fixed-size output chunks.
pub struct ArchiveEncoder {
    config: ArchiveConfig,
    stamp: DosDateTime,
    block: Vec<u8>,
    ready: VecDeque<Vec<u8>>,
    /// Bytes produced so far (emitted plus buffered).
    offset: u64,
    emitted: u64,
    open: Option<OpenEntry>,
    records: Vec<CentralRecord>,
    next_id: u64,
    finished: bool,
}

impl ArchiveEncoder {
    /// Creates an encoder with the given configuration.
    pub fn new(config: ArchiveConfig) -> Self {
        let stamp = if config.use_current_time {
            DosDateTime::from_naive(chrono::Local::now().naive_local())
        } else {
            DosDateTime::epoch()
        };
        let threshold = config.block_threshold_bytes.max(1);

        Self {
            config,
            stamp,
            block: Vec::with_capacity(threshold),
            ready: VecDeque::new(),
            offset: 0,
            emitted: 0,
            open: None,
            records: Vec::new(),
            next_id: 0,
            finished: false,
        }
    }

    /// Creates an encoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ArchiveConfig::default())
    }

    fn threshold(&self) -> usize {
        self.config.block_threshold_bytes.max(1)
    }

    /// Opens a new entry. Only one entry may be open at a time.
    pub fn open(&mut self, name: &str) -> Result<EntryHandle, ArchiveError> {
        if self.finished {
            return Err(ArchiveError::AlreadyFinished);
        }
        if let Some(open) = &self.open {
            return Err(ArchiveError::EntryAlreadyOpen {
                open: open.name.clone(),
                requested: name.to_string(),
            });
        }

        let name = normalize_name(name);
        if name.is_empty() {
            return Err(ArchiveError::EmptyEntryName);
        }
        if name.len() > MAX_ENTRY_NAME_BYTES {
            return Err(ArchiveError::EntryNameTooLong {
                len: name.len(),
                limit: MAX_ENTRY_NAME_BYTES,
            });
        }

        let id = self.next_id;
        self.next_id += 1;

        let method = self.config.compression.code();
        let header_offset = self.offset;
        let header = format::local_header(&name, method, self.stamp);
        self.write_raw(&header);

        let deflater = match self.config.compression {
            CompressionMethod::Stored => None,
            CompressionMethod::Deflate => Some(DeflateEncoder::new(
                Vec::new(),
                Compression::new(self.config.compression_level.min(9)),
            )),
        };

        debug!(entry = %name, id, offset = header_offset, "Opened archive entry");

        self.open = Some(OpenEntry {
            id,
            name,
            header_offset,
            crc: Crc::new(),
            uncompressed_size: 0,
            compressed_size: 0,
            deflater,
        });

        Ok(EntryHandle { id })
    }

    /// Appends payload bytes to the open entry.
    pub fn push(&mut self, handle: &EntryHandle, data: &[u8]) -> Result<(), ArchiveError> {
        let entry = self.open_entry_mut(handle.id)?;

        let new_size = entry.uncompressed_size + data.len() as u64;
        if new_size > MAX_ENTRY_BYTES {
            return Err(ArchiveError::EntryTooLarge {
                name: entry.name.clone(),
                limit: MAX_ENTRY_BYTES,
            });
        }
        entry.uncompressed_size = new_size;
        entry.crc.update(data);

        let encoded = match entry.deflater.as_mut() {
            Some(deflater) => {
                deflater.write_all(data)?;
                Some(std::mem::take(deflater.get_mut()))
            }
            None => None,
        };

        match encoded {
            Some(compressed) => {
                entry.compressed_size += compressed.len() as u64;
                self.write_raw(&compressed);
            }
            None => {
                entry.compressed_size += data.len() as u64;
                self.write_raw(data);
            }
        }

        Ok(())
    }

    /// Ends the open entry, writing its data descriptor.
    pub fn close(&mut self, handle: EntryHandle) -> Result<(), ArchiveError> {
        self.open_entry_mut(handle.id)?;
        let Some(mut entry) = self.open.take() else {
            return Err(ArchiveError::UnknownEntry { id: handle.id });
        };

        if let Some(deflater) = entry.deflater.take() {
            let tail = deflater.finish()?;
            entry.compressed_size += tail.len() as u64;
            self.write_raw(&tail);
        }

        let crc = entry.crc.sum();
        let descriptor =
            format::data_descriptor(crc, entry.compressed_size, entry.uncompressed_size);
        self.write_raw(&descriptor);

        debug!(
            entry = %entry.name,
            id = entry.id,
            bytes = entry.uncompressed_size,
            "Closed archive entry"
        );

        self.records.push(CentralRecord {
            name: entry.name,
            method: self.config.compression.code(),
            crc,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
            header_offset: entry.header_offset,
        });

        Ok(())
    }

    /// Writes the central directory and flushes all remaining bytes.
    pub fn finish(&mut self) -> Result<(), ArchiveError> {
        if self.finished {
            return Err(ArchiveError::AlreadyFinished);
        }
        if let Some(open) = &self.open {
            return Err(ArchiveError::EntryStillOpen {
                name: open.name.clone(),
            });
        }

        let directory_offset = self.offset;
        let records = std::mem::take(&mut self.records);
        for record in &records {
            let header = format::central_header(record, self.stamp);
            self.write_raw(&header);
        }
        let directory_size = self.offset - directory_offset;
        let entries = records.len() as u64;
        self.records = records;

        if format::needs_zip64_trailer(entries, directory_size, directory_offset) {
            let record_offset = self.offset;
            let trailer =
                format::zip64_trailer(entries, directory_size, directory_offset, record_offset);
            self.write_raw(&trailer);
        }
        let end = format::end_record(entries, directory_size, directory_offset);
        self.write_raw(&end);

        if !self.block.is_empty() {
            let chunk = std::mem::take(&mut self.block);
            self.emit(chunk);
        }
        self.finished = true;

        debug!(entries, total_bytes = self.offset, "Finished archive");
        Ok(())
    }

    /// Drains chunks that are ready to be written downstream, in order.
    pub fn take_chunks(&mut self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.ready.drain(..)
    }

    /// Whether a closed entry already uses `name`.
    pub fn has_entry(&self, name: &str) -> bool {
        let name = normalize_name(name);
        self.records.iter().any(|r| r.name == name)
    }

    /// Number of closed entries.
    pub fn entry_count(&self) -> usize {
        self.records.len()
    }

    /// Whether an entry is currently open.
    pub fn has_open_entry(&self) -> bool {
        self.open.is_some()
    }

    /// Whether `finish` has completed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Total bytes handed out through emitted chunks.
    pub fn bytes_emitted(&self) -> u64 {
        self.emitted
    }

    fn open_entry_mut(&mut self, id: u64) -> Result<&mut OpenEntry, ArchiveError> {
        if self.finished {
            return Err(ArchiveError::AlreadyFinished);
        }
        match self.open.as_mut() {
            Some(entry) if entry.id == id => Ok(entry),
            _ => Err(ArchiveError::UnknownEntry { id }),
        }
    }

    fn write_raw(&mut self, mut data: &[u8]) {
        self.offset += data.len() as u64;
        let threshold = self.threshold();

        while !data.is_empty() {
            let room = threshold - self.block.len();
            let take = room.min(data.len());
            self.block.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.block.len() >= threshold {
                let chunk = std::mem::replace(&mut self.block, Vec::with_capacity(threshold));
                self.emit(chunk);
            }
        }
    }

    fn emit(&mut self, chunk: Vec<u8>) {
        self.emitted += chunk.len() as u64;
        self.ready.push_back(chunk);
    }
}

/// Whether `name` can be opened as an entry.
pub fn is_valid_entry_name(name: &str) -> bool {
    let name = normalize_name(name);
    !name.is_empty() && name.len() <= MAX_ENTRY_NAME_BYTES
}

/// Archive names always use forward slashes and never start with one.
fn normalize_name(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn drain(encoder: &mut ArchiveEncoder) -> Vec<u8> {
        encoder.take_chunks().flatten().collect()
    }

    fn build(config: ArchiveConfig, entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut encoder = ArchiveEncoder::new(config);
        let mut out = Vec::new();
        for (name, data) in entries {
            let handle = encoder.open(name).unwrap();
            encoder.push(&handle, data).unwrap();
            encoder.close(handle).unwrap();
            out.extend(drain(&mut encoder));
        }
        encoder.finish().unwrap();
        out.extend(drain(&mut encoder));
        out
    }

    fn read_entries(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            entries.push((file.name().to_string(), content));
        }
        entries
    }

    #[test]
    fn test_empty_archive_is_bare_end_record() {
        let bytes = build(ArchiveConfig::default(), &[]);
        assert_eq!(bytes.len(), 22);
        assert!(read_entries(bytes).is_empty());
    }

    #[test]
    fn test_entries_readable_in_open_order() {
        let bytes = build(
            ArchiveConfig::default(),
            &[("b.txt", b"second"), ("a/one.txt", b"first"), ("empty", b"")],
        );
        let entries = read_entries(bytes);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], ("b.txt".to_string(), b"second".to_vec()));
        assert_eq!(entries[1], ("a/one.txt".to_string(), b"first".to_vec()));
        assert_eq!(entries[2], ("empty".to_string(), Vec::new()));
    }

    #[test]
    fn test_deflate_entries_round_trip_through_reader() {
        let payload = b"abcabcabcabcabcabcabcabcabcabcabc".repeat(500);
        let config = ArchiveConfig::default().with_compression(CompressionMethod::Deflate);
        let bytes = build(config, &[("data.bin", &payload)]);
        assert!(bytes.len() < payload.len());

        let entries = read_entries(bytes);
        assert_eq!(entries[0].1, payload);
    }

    #[test]
    fn test_chunks_never_exceed_threshold() {
        let mut encoder = ArchiveEncoder::new(ArchiveConfig::default().with_block_threshold(1024));
        let payload = vec![7u8; 10_000];
        let handle = encoder.open("big.bin").unwrap();
        encoder.push(&handle, &payload).unwrap();

        let chunks: Vec<Vec<u8>> = encoder.take_chunks().collect();
        assert!(!chunks.is_empty(), "full blocks are emitted before close");
        assert!(chunks.iter().all(|c| c.len() == 1024));

        encoder.close(handle).unwrap();
        encoder.finish().unwrap();
        let rest: Vec<Vec<u8>> = encoder.take_chunks().collect();
        assert!(rest.iter().all(|c| c.len() <= 1024));

        let total: u64 = chunks.iter().chain(rest.iter()).map(|c| c.len() as u64).sum();
        assert_eq!(total, encoder.bytes_emitted());
    }

    #[test]
    fn test_small_output_waits_for_threshold() {
        let mut encoder = ArchiveEncoder::with_defaults();
        let handle = encoder.open("tiny").unwrap();
        encoder.push(&handle, b"x").unwrap();
        encoder.close(handle).unwrap();
        assert_eq!(encoder.take_chunks().count(), 0);

        encoder.finish().unwrap();
        assert_eq!(encoder.take_chunks().count(), 1);
    }

    #[test]
    fn test_output_is_deterministic() {
        let entries: &[(&str, &[u8])] = &[("a", b"AAA"), ("c", b"")];
        let first = build(ArchiveConfig::default(), entries);
        let second = build(ArchiveConfig::default(), entries);
        assert_eq!(first, second);
    }

    #[test]
    fn test_open_while_open_is_rejected() {
        let mut encoder = ArchiveEncoder::with_defaults();
        let _first = encoder.open("one").unwrap();
        let err = encoder.open("two").unwrap_err();
        assert!(matches!(err, ArchiveError::EntryAlreadyOpen { .. }));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_foreign_handle_is_rejected() {
        let mut encoder = ArchiveEncoder::with_defaults();
        let _ours = encoder.open("ours").unwrap();
        let foreign = EntryHandle { id: 42 };
        assert!(matches!(
            encoder.push(&foreign, b"data"),
            Err(ArchiveError::UnknownEntry { id: 42 })
        ));
        assert!(matches!(
            encoder.close(foreign),
            Err(ArchiveError::UnknownEntry { id: 42 })
        ));
    }

    #[test]
    fn test_finish_with_open_entry_is_rejected() {
        let mut encoder = ArchiveEncoder::with_defaults();
        let _handle = encoder.open("pending").unwrap();
        assert!(matches!(
            encoder.finish(),
            Err(ArchiveError::EntryStillOpen { .. })
        ));
    }

    #[test]
    fn test_operations_after_finish_are_rejected() {
        let mut encoder = ArchiveEncoder::with_defaults();
        encoder.finish().unwrap();
        assert!(matches!(encoder.open("late"), Err(ArchiveError::AlreadyFinished)));
        assert!(matches!(encoder.finish(), Err(ArchiveError::AlreadyFinished)));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut encoder = ArchiveEncoder::with_defaults();
        assert!(matches!(encoder.open("/"), Err(ArchiveError::EmptyEntryName)));
    }

    #[test]
    fn test_overlong_name_is_rejected() {
        let mut encoder = ArchiveEncoder::with_defaults();
        let name = "n".repeat(70_000);
        assert!(!is_valid_entry_name(&name));
        assert!(matches!(
            encoder.open(&name),
            Err(ArchiveError::EntryNameTooLong { len: 70_000, .. })
        ));
        assert!(!encoder.has_open_entry());

        let longest = "n".repeat(MAX_ENTRY_NAME_BYTES);
        assert!(is_valid_entry_name(&format!("/{longest}")));
        let handle = encoder.open(&longest).unwrap();
        encoder.close(handle).unwrap();
        encoder.finish().unwrap();

        let entries = read_entries(drain(&mut encoder));
        assert_eq!(entries[0].0.len(), MAX_ENTRY_NAME_BYTES);
    }

    #[test]
    fn test_names_are_normalized() {
        let mut encoder = ArchiveEncoder::with_defaults();
        let handle = encoder.open("\\dir\\file.txt").unwrap();
        encoder.close(handle).unwrap();
        assert!(encoder.has_entry("dir/file.txt"));
        assert!(!encoder.has_entry("file.txt"));
    }

    #[test]
    fn test_many_entries_switch_to_zip64_trailer() {
        let mut encoder = ArchiveEncoder::new(ArchiveConfig::default().with_block_threshold(1 << 20));
        let mut out = Vec::new();
        let count = 70_000;
        for i in 0..count {
            let handle = encoder.open(&format!("{i}")).unwrap();
            encoder.close(handle).unwrap();
            out.extend(drain(&mut encoder));
        }
        encoder.finish().unwrap();
        out.extend(drain(&mut encoder));

        let archive = zip::ZipArchive::new(Cursor::new(out)).unwrap();
        assert_eq!(archive.len(), count);
    }
}
