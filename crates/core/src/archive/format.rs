//! ZIP record layout (APPNOTE 6.3) for a non-seeking writer.

use chrono::{Datelike, NaiveDateTime, Timelike};

pub(super) const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
pub(super) const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;
pub(super) const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
pub(super) const ZIP64_END_SIGNATURE: u32 = 0x0606_4b50;
pub(super) const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
pub(super) const END_SIGNATURE: u32 = 0x0605_4b50;

/// Sizes and CRC follow the payload in a data descriptor.
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// Entry names are UTF-8.
const FLAG_UTF8: u16 = 1 << 11;
const GENERAL_FLAGS: u16 = FLAG_DATA_DESCRIPTOR | FLAG_UTF8;

const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;
/// Upper byte 3 = UNIX, so `external_attributes` carries a file mode.
const VERSION_MADE_BY: u16 = (3 << 8) | VERSION_ZIP64;
/// Regular file, rw-r--r--.
const UNIX_FILE_ATTRIBUTES: u32 = 0o100644 << 16;

const ZIP64_EXTRA_ID: u16 = 0x0001;
pub(super) const U16_LIMIT: u64 = 0xFFFF;
pub(super) const U32_LIMIT: u64 = 0xFFFF_FFFF;

/// MS-DOS date and time as stored in ZIP headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    pub fn epoch() -> Self {
        Self {
            time: 0,
            date: (1 << 5) | 1,
        }
    }

    /// Converts a calendar time, clamping years outside 1980..=2107.
    pub fn from_naive(value: NaiveDateTime) -> Self {
        if value.year() < 1980 {
            return Self::epoch();
        }
        let year = (value.year().min(2107) - 1980) as u16;
        let date = (year << 9) | ((value.month() as u16) << 5) | value.day() as u16;
        let time = ((value.hour() as u16) << 11)
            | ((value.minute() as u16) << 5)
            | (value.second() as u16 / 2);
        Self { time, date }
    }
}

/// Everything the central directory needs to remember about a closed entry.
#[derive(Debug, Clone)]
pub(super) struct CentralRecord {
    pub name: String,
    pub method: u16,
    pub crc: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub header_offset: u64,
}

trait PutLe {
    fn put_u16(&mut self, value: u16);
    fn put_u32(&mut self, value: u32);
    fn put_u64(&mut self, value: u64);
}

impl PutLe for Vec<u8> {
    fn put_u16(&mut self, value: u16) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.extend_from_slice(&value.to_le_bytes());
    }
}

fn clamp_u32(value: u64) -> u32 {
    value.min(U32_LIMIT) as u32
}

fn clamp_u16(value: u64) -> u16 {
    value.min(U16_LIMIT) as u16
}

/// Local file header with zeroed CRC and sizes (bit 3 set).
pub(super) fn local_header(name: &str, method: u16, stamp: DosDateTime) -> Vec<u8> {
    let mut out = Vec::with_capacity(30 + name.len());
    out.put_u32(LOCAL_HEADER_SIGNATURE);
    out.put_u16(VERSION_DEFAULT);
    out.put_u16(GENERAL_FLAGS);
    out.put_u16(method);
    out.put_u16(stamp.time);
    out.put_u16(stamp.date);
    out.put_u32(0);
    out.put_u32(0);
    out.put_u32(0);
    out.put_u16(name.len() as u16);
    out.put_u16(0);
    out.extend_from_slice(name.as_bytes());
    out
}

/// Data descriptor trailing an entry payload. Sizes must fit in 32 bits.
pub(super) fn data_descriptor(crc: u32, compressed_size: u64, uncompressed_size: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.put_u32(DATA_DESCRIPTOR_SIGNATURE);
    out.put_u32(crc);
    out.put_u32(clamp_u32(compressed_size));
    out.put_u32(clamp_u32(uncompressed_size));
    out
}

/// Central directory file header, with a ZIP64 extra field when the local
/// header lies beyond the 4 GiB mark.
pub(super) fn central_header(record: &CentralRecord, stamp: DosDateTime) -> Vec<u8> {
    let needs_zip64 = record.header_offset >= U32_LIMIT;
    let extra_len: u16 = if needs_zip64 { 12 } else { 0 };

    let mut out = Vec::with_capacity(46 + record.name.len() + extra_len as usize);
    out.put_u32(CENTRAL_HEADER_SIGNATURE);
    out.put_u16(VERSION_MADE_BY);
    out.put_u16(if needs_zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT });
    out.put_u16(GENERAL_FLAGS);
    out.put_u16(record.method);
    out.put_u16(stamp.time);
    out.put_u16(stamp.date);
    out.put_u32(record.crc);
    out.put_u32(clamp_u32(record.compressed_size));
    out.put_u32(clamp_u32(record.uncompressed_size));
    out.put_u16(record.name.len() as u16);
    out.put_u16(extra_len);
    out.put_u16(0); // comment length
    out.put_u16(0); // disk number start
    out.put_u16(0); // internal attributes
    out.put_u32(UNIX_FILE_ATTRIBUTES);
    out.put_u32(clamp_u32(record.header_offset));
    out.extend_from_slice(record.name.as_bytes());
    if needs_zip64 {
        out.put_u16(ZIP64_EXTRA_ID);
        out.put_u16(8);
        out.put_u64(record.header_offset);
    }
    out
}

/// ZIP64 end of central directory record followed by its locator.
pub(super) fn zip64_trailer(
    entries: u64,
    directory_size: u64,
    directory_offset: u64,
    record_offset: u64,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(56 + 20);
    out.put_u32(ZIP64_END_SIGNATURE);
    out.put_u64(44); // size of the remaining record
    out.put_u16(VERSION_MADE_BY);
    out.put_u16(VERSION_ZIP64);
    out.put_u32(0); // this disk
    out.put_u32(0); // disk with central directory
    out.put_u64(entries);
    out.put_u64(entries);
    out.put_u64(directory_size);
    out.put_u64(directory_offset);

    out.put_u32(ZIP64_LOCATOR_SIGNATURE);
    out.put_u32(0);
    out.put_u64(record_offset);
    out.put_u32(1); // total disks
    out
}

/// Classic end of central directory record, saturated for ZIP64 archives.
pub(super) fn end_record(entries: u64, directory_size: u64, directory_offset: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(22);
    out.put_u32(END_SIGNATURE);
    out.put_u16(0);
    out.put_u16(0);
    out.put_u16(clamp_u16(entries));
    out.put_u16(clamp_u16(entries));
    out.put_u32(clamp_u32(directory_size));
    out.put_u32(clamp_u32(directory_offset));
    out.put_u16(0);
    out
}

/// Whether the trailer has to carry ZIP64 records.
pub(super) fn needs_zip64_trailer(entries: u64, directory_size: u64, directory_offset: u64) -> bool {
    entries >= U16_LIMIT || directory_size >= U32_LIMIT || directory_offset >= U32_LIMIT
}
