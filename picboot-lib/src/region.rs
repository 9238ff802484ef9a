//! Region operations: erase, read and write program memory, start the application.
//!
//! Each operation splits an address range into chunks that fit one command, then runs the
//! commands one after another. The first failing chunk ends the whole operation. Nothing is
//! rolled back.

use crate::bootloader::Bootloader;
use crate::command::{Command, HEADER_LEN, MAX_ADDRESS, Opcode};
use crate::device::{AddressRange, DeviceProfile};
use crate::progress::ProgressHandler;
use crate::session::ExecutionStatus;
use crate::{Error, Result};

/// Largest block count the one-byte length field can carry.
pub const MAX_CHUNK_BLOCKS: u32 = u8::MAX as u32;

/// Response bytes that are not read data: the 5-byte header and the checksum byte.
const READ_RESPONSE_OVERHEAD: usize = 6;

/// Splits a block count into command-sized chunks.
///
/// Yields `ceil(total / cap)` lengths; all but the last equal `cap`.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    remaining: u32,
    cap: u32,
}

impl ChunkPlan {
    /// `cap` is clamped to `1..=255`.
    pub fn new(total_blocks: u32, cap: u32) -> Self {
        Self {
            remaining: total_blocks,
            cap: cap.clamp(1, MAX_CHUNK_BLOCKS),
        }
    }
}

impl Iterator for ChunkPlan {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        let chunk = self.remaining.min(self.cap);
        self.remaining -= chunk;
        Some(chunk as u8)
    }
}

impl Bootloader {
    /// Erase every whole erase page of `range`.
    pub fn erase_region(&mut self, profile: &DeviceProfile, range: AddressRange) -> Result<()> {
        self.check_range(range)?;
        self.handle.clear_cancel();
        self.check_block(profile.erase_block, "erase_block")?;

        let pages = range.units() / profile.erase_block;
        let bar = self
            .progress
            .create_bar(pages as u64, format!("Erasing 0x{:X}...", range.first));

        let mut address = range.first;
        for chunk in ChunkPlan::new(pages, MAX_CHUNK_BLOCKS) {
            self.handle.set_status(ExecutionStatus::Busy);
            self.log.info(format!("Erasing from: 0x{:X}", address));
            let command = Command::new(Opcode::EraseProg, chunk, address, &[])?;
            self.run_chunk(&command, &bar)?;
            address += chunk as u32 * profile.erase_block;
        }

        bar.finish_with_message("Erase complete");
        Ok(())
    }

    /// Read `range` from program memory.
    ///
    /// The whole image is discarded if any chunk fails.
    pub fn read_region(&mut self, profile: &DeviceProfile, range: AddressRange) -> Result<Vec<u8>> {
        self.check_range(range)?;
        self.handle.clear_cancel();
        self.check_block(profile.read_block, "read_block")?;
        self.check_block(profile.bytes_per_addr, "bytes_per_addr")?;
        let cap = profile.max_read_blocks();
        if cap == 0 {
            return self.reject(Error::parameter(format!(
                "max_pkt_size {} cannot hold one read block",
                profile.max_pkt_size
            )));
        }

        let mut data = vec![0u8; range.units() as usize * profile.bytes_per_addr as usize];
        let blocks = range.units() / profile.read_block;
        let bar = self
            .progress
            .create_bar(blocks as u64, format!("Reading 0x{:X}...", range.first));

        let mut address = range.first;
        let mut offset = 0usize;
        for chunk in ChunkPlan::new(blocks, cap) {
            let expected =
                chunk as usize * profile.read_block as usize * profile.bytes_per_addr as usize;
            self.handle.set_status(ExecutionStatus::Busy);
            self.log.info(format!("Reading from: 0x{:X}", address));
            let command = Command::new(Opcode::ReadProg, chunk, address, &[])?;
            self.run_chunk(&command, &bar)?;

            let received = self.last_response_len();
            if received.checked_sub(READ_RESPONSE_OVERHEAD) != Some(expected) {
                let err = Error::LengthMismatch {
                    expected,
                    actual: received.saturating_sub(READ_RESPONSE_OVERHEAD),
                };
                self.handle.set_status(ExecutionStatus::Error);
                self.handle.set_error(err.to_string());
                self.log.error(err.to_string());
                bar.finish_with_message("Aborted");
                return Err(err);
            }
            data[offset..offset + expected]
                .copy_from_slice(&self.last_response()[HEADER_LEN..HEADER_LEN + expected]);

            offset += expected;
            address += chunk as u32 * profile.read_block;
        }

        bar.finish_with_message("Read complete");
        Ok(data)
    }

    /// Write `data` to `range`. Only whole write blocks are sent.
    pub fn write_region(
        &mut self,
        profile: &DeviceProfile,
        range: AddressRange,
        data: &[u8],
    ) -> Result<()> {
        self.check_range(range)?;
        self.handle.clear_cancel();
        self.check_block(profile.write_block, "write_block")?;
        self.check_block(profile.bytes_per_addr, "bytes_per_addr")?;

        let needed = range.units() as usize * profile.bytes_per_addr as usize;
        if data.len() < needed {
            return self.reject(Error::parameter(format!(
                "Not enough data for region {}: need {} bytes, got {}",
                range,
                needed,
                data.len()
            )));
        }
        let cap = profile.max_write_blocks();
        if cap == 0 {
            return self.reject(Error::parameter(format!(
                "max_pkt_size {} cannot hold one write block",
                profile.max_pkt_size
            )));
        }

        let blocks = range.units() / profile.write_block;
        let bar = self
            .progress
            .create_bar(blocks as u64, format!("Writing 0x{:X}...", range.first));

        let mut address = range.first;
        let mut offset = 0usize;
        for chunk in ChunkPlan::new(blocks, cap) {
            let len =
                chunk as usize * profile.write_block as usize * profile.bytes_per_addr as usize;
            self.handle.set_status(ExecutionStatus::Busy);
            self.log.info(format!("Writing to: 0x{:X}", address));
            let command =
                Command::new(Opcode::WriteProg, chunk, address, &data[offset..offset + len])?;
            self.run_chunk(&command, &bar)?;

            offset += len;
            address += chunk as u32 * profile.write_block;
        }

        bar.finish_with_message("Write complete");
        Ok(())
    }

    /// Mark the application valid and reset into it.
    ///
    /// A zero byte goes to the last data memory address, then RESET is sent whether or not that
    /// write succeeded. The first error is returned.
    pub fn start_app(&mut self, profile: &DeviceProfile) -> Result<()> {
        self.handle.clear_cancel();
        if !self.is_open() {
            let err = Error::NotOpen;
            self.handle.set_status(ExecutionStatus::Error);
            return self.reject(err);
        }

        self.handle.set_status(ExecutionStatus::Busy);
        self.log.info("Starting application code...");

        let marker = [0u8];
        let marked = Command::new(Opcode::WriteData, 1, profile.data_range.last, &marker)
            .and_then(|command| self.execute(&command));
        if let Err(e) = &marked {
            self.log.error(e.to_string());
        }

        let reset = self.execute(&Command::new(Opcode::Reset, 0, 0, &[])?);
        if let Err(e) = &reset {
            self.log.error(e.to_string());
        }

        marked.and(reset)
    }

    fn run_chunk(&mut self, command: &Command, bar: &ProgressHandler) -> Result<()> {
        if let Err(e) = self.execute(command) {
            self.log.error(e.to_string());
            bar.set_message(format!("{} failed", command.opcode));
            return Err(e);
        }
        bar.inc(command.length as u64);
        Ok(())
    }

    fn check_range(&mut self, range: AddressRange) -> Result<()> {
        if !range.is_valid() {
            return self.reject(Error::parameter(format!(
                "Bad program memory region: {}",
                range
            )));
        }
        if range.last > MAX_ADDRESS {
            return self.reject(Error::parameter(format!(
                "Program memory region {} exceeds 24-bit addressing",
                range
            )));
        }
        Ok(())
    }

    fn check_block(&mut self, value: u32, name: &str) -> Result<()> {
        if value == 0 {
            return self.reject(Error::parameter(format!("{} must be non-zero", name)));
        }
        Ok(())
    }
}
