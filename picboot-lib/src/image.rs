//! In-memory firmware image and its Intel HEX (I32HEX) form.
//!
//! Record addresses count device address units, not bytes. With `bytes_per_addr = 2` a data
//! record at offset `0x0010` holds the words at addresses `0x10`, `0x11`, ...

use crate::device::AddressRange;
use crate::log::{LogSinkArc, Logger, no_op_log_sink};
use crate::{Error, Result};
use ihex::Record;
use std::fmt;
use std::fs;
use std::path::Path;

/// Bytes carried by one data record.
const LINE_BYTES: u32 = 16;

/// `:` + count + address + type + checksum.
const MIN_LINE_LEN: usize = 11;

const DATA_RECORD: u8 = 0x00;
const EOF_RECORD: u8 = 0x01;
const ELA_RECORD: u8 = 0x04;

/// One contiguous memory region of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    pub first_addr: u32,
    pub data: Vec<u8>,
}

impl MemoryBlock {
    pub fn new(first_addr: u32, data: Vec<u8>) -> Self {
        Self { first_addr, data }
    }

    /// Erased block covering `range`.
    pub fn for_range(range: AddressRange, bytes_per_addr: u32) -> Self {
        let len = range.units() as usize * bytes_per_addr as usize;
        Self::new(range.first, vec![0xFF; len])
    }

    /// Address units covered by this block.
    pub fn units(&self, bytes_per_addr: u32) -> u32 {
        self.data.len() as u32 / bytes_per_addr
    }

    fn contains(&self, address: u32, bytes_per_addr: u32) -> bool {
        address >= self.first_addr && address - self.first_addr < self.units(bytes_per_addr)
    }
}

/// What went wrong on one line of a HEX file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexIssueKind {
    /// Shorter than the smallest possible record
    TooShort,
    /// Line length does not match the byte count
    BadLength,
    /// Non-hexadecimal character
    BadDigit,
    /// Checksum mismatch; the data was still applied
    BadChecksum,
    UnknownRecord(u8),
}

/// A non-fatal problem found while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexIssue {
    /// 1-based line number
    pub line: usize,
    pub kind: HexIssueKind,
    pub text: String,
}

impl fmt::Display for HexIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            HexIssueKind::TooShort => write!(f, "Ignoring line [{}]: {}", self.line, self.text),
            HexIssueKind::BadLength => write!(
                f,
                "Invalid data-field length @line [{}]: {}",
                self.line, self.text
            ),
            HexIssueKind::BadDigit => {
                write!(f, "Invalid hex digit @line [{}]: {}", self.line, self.text)
            }
            HexIssueKind::BadChecksum => {
                write!(f, "Invalid checksum @line [{}]: {}", self.line, self.text)
            }
            HexIssueKind::UnknownRecord(kind) => write!(
                f,
                "Unknown record type 0x{:02X} @line [{}]: {}",
                kind, self.line, self.text
            ),
        }
    }
}

/// Result of a tolerant load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub issues: Vec<HexIssue>,
}

impl LoadReport {
    /// `true` when every line parsed without problems.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Firmware image made of non-overlapping memory blocks.
pub struct HexImage {
    pub blocks: Vec<MemoryBlock>,
    log: Logger,
}

impl HexImage {
    pub fn new(blocks: Vec<MemoryBlock>) -> Self {
        Self {
            blocks,
            log: Logger::new(no_op_log_sink()),
        }
    }

    /// Erased image with one block per range.
    pub fn for_ranges(ranges: &[AddressRange], bytes_per_addr: u32) -> Self {
        Self::new(
            ranges
                .iter()
                .map(|r| MemoryBlock::for_range(*r, bytes_per_addr))
                .collect(),
        )
    }

    pub fn with_log_sink(mut self, sink: LogSinkArc) -> Self {
        self.log = Logger::new(sink);
        self
    }

    /// Serialize every block as I32HEX text.
    pub fn to_ihex(&self, bytes_per_addr: u32) -> Result<String> {
        check_width(bytes_per_addr)?;
        let words_per_line = LINE_BYTES / bytes_per_addr;
        let mut records = Vec::new();

        for block in &self.blocks {
            let mut address = block.first_addr;
            records.push(Record::ExtendedLinearAddress((address >> 16) as u16));

            let data = &block.data;
            let mut index = 0usize;
            while index < data.len() {
                let start = index;
                let mut words = 0u32;
                while words < words_per_line {
                    index += bytes_per_addr as usize;
                    words += 1;
                    if index >= data.len() || crosses_64k(address, words) {
                        break;
                    }
                }
                records.push(Record::Data {
                    offset: (address & 0xFFFF) as u16,
                    value: data[start..index.min(data.len())].to_vec(),
                });
                let next = address as u64 + words as u64;
                // no ELA past the top of the 32-bit space
                if crosses_64k(address, words) && next <= u32::MAX as u64 {
                    records.push(Record::ExtendedLinearAddress((next >> 16) as u16));
                }
                address = address.wrapping_add(words);
            }
        }
        records.push(Record::EndOfFile);

        let mut text = ihex::create_object_file_representation(&records)?;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }

    /// Fill the blocks from I32HEX text.
    ///
    /// Every block is reset to `0xFF` first. Malformed lines are reported and skipped, lines with
    /// a bad checksum are reported but still applied. A data record that does not fit inside a
    /// single block aborts the load.
    pub fn load_ihex(&mut self, text: &str, bytes_per_addr: u32) -> Result<LoadReport> {
        check_width(bytes_per_addr)?;
        for block in &mut self.blocks {
            block.data.fill(0xFF);
        }

        let mut report = LoadReport::default();
        let mut address: u32 = 0;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || !line.starts_with(':') {
                continue;
            }

            let record = match parse_line(line) {
                Ok(record) => record,
                Err(kind) => {
                    self.issue(&mut report, line_no, kind, line);
                    continue;
                }
            };
            if !record.checksum_ok {
                self.issue(&mut report, line_no, HexIssueKind::BadChecksum, line);
            }

            match record.kind {
                DATA_RECORD => {
                    address = (address & 0xFFFF_0000) | record.offset as u32;
                    let found = self.block_index(address, record.data.len(), bytes_per_addr);
                    let block = match found {
                        Ok(i) => &mut self.blocks[i],
                        Err(e) => {
                            self.log.error(e.to_string());
                            return Err(e);
                        }
                    };
                    let start = (address - block.first_addr) as usize * bytes_per_addr as usize;
                    block.data[start..start + record.data.len()].copy_from_slice(&record.data);
                    address = address.wrapping_add(record.data.len() as u32 / bytes_per_addr);
                }
                EOF_RECORD => break,
                ELA_RECORD if record.data.len() >= 2 => {
                    address = (record.data[0] as u32) << 24 | (record.data[1] as u32) << 16;
                }
                other => {
                    self.issue(&mut report, line_no, HexIssueKind::UnknownRecord(other), line);
                }
            }
        }

        Ok(report)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>, bytes_per_addr: u32) -> Result<()> {
        fs::write(path, self.to_ihex(bytes_per_addr)?)?;
        Ok(())
    }

    pub fn load_from_file(
        &mut self,
        path: impl AsRef<Path>,
        bytes_per_addr: u32,
    ) -> Result<LoadReport> {
        let text = fs::read_to_string(path)?;
        self.load_ihex(&text, bytes_per_addr)
    }

    /// Index of the block holding `len` bytes starting at `address`.
    fn block_index(&self, address: u32, len: usize, bytes_per_addr: u32) -> Result<usize> {
        let index = self
            .blocks
            .iter()
            .position(|b| b.contains(address, bytes_per_addr))
            .ok_or(Error::UnmappedAddress(address))?;
        let block = &self.blocks[index];
        let start = (address - block.first_addr) as usize * bytes_per_addr as usize;
        if start + len > block.data.len() {
            return Err(Error::UnmappedAddress(
                block.first_addr.wrapping_add(block.units(bytes_per_addr)),
            ));
        }
        Ok(index)
    }

    fn issue(&self, report: &mut LoadReport, line: usize, kind: HexIssueKind, text: &str) {
        let issue = HexIssue {
            line,
            kind,
            text: text.to_string(),
        };
        if kind == HexIssueKind::TooShort {
            self.log.info(issue.to_string());
        } else {
            self.log.error(issue.to_string());
        }
        report.issues.push(issue);
    }
}

/// `true` when `address + words` lies in another 64K segment than `address`.
fn crosses_64k(address: u32, words: u32) -> bool {
    (address as u64 >> 16) != ((address as u64 + words as u64) >> 16)
}

fn check_width(bytes_per_addr: u32) -> Result<()> {
    if bytes_per_addr == 0 || LINE_BYTES % bytes_per_addr != 0 {
        return Err(Error::parameter(format!(
            "Unsupported word width: {} bytes per address",
            bytes_per_addr
        )));
    }
    Ok(())
}

struct RawRecord {
    kind: u8,
    offset: u16,
    data: Vec<u8>,
    checksum_ok: bool,
}

fn parse_line(line: &str) -> std::result::Result<RawRecord, HexIssueKind> {
    let bytes = line.as_bytes();
    if bytes.len() < MIN_LINE_LEN {
        return Err(HexIssueKind::TooShort);
    }
    let count = hex_byte(bytes, 1)?;
    if bytes.len() != 2 * count as usize + MIN_LINE_LEN {
        return Err(HexIssueKind::BadLength);
    }

    let offset_hi = hex_byte(bytes, 3)?;
    let offset_lo = hex_byte(bytes, 5)?;
    let kind = hex_byte(bytes, 7)?;
    let data = (0..count as usize)
        .map(|i| hex_byte(bytes, 9 + 2 * i))
        .collect::<std::result::Result<Vec<u8>, _>>()?;
    let checksum = hex_byte(bytes, bytes.len() - 2)?;

    let sum = data
        .iter()
        .fold(count.wrapping_add(offset_hi).wrapping_add(offset_lo).wrapping_add(kind), |acc, b| {
            acc.wrapping_add(*b)
        })
        .wrapping_add(checksum);

    Ok(RawRecord {
        kind,
        offset: u16::from_be_bytes([offset_hi, offset_lo]),
        data,
        checksum_ok: sum == 0,
    })
}

fn hex_byte(bytes: &[u8], pos: usize) -> std::result::Result<u8, HexIssueKind> {
    let nibble = |c: u8| (c as char).to_digit(16).ok_or(HexIssueKind::BadDigit);
    let hi = nibble(*bytes.get(pos).ok_or(HexIssueKind::BadLength)?)?;
    let lo = nibble(*bytes.get(pos + 1).ok_or(HexIssueKind::BadLength)?)?;
    Ok((hi << 4 | lo) as u8)
}
