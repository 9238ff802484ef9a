use crate::command::MAX_ADDRESS;
use crate::{Error, Result};
use std::fmt;
use std::time::Duration;

/// Inclusive address range in device address units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub first: u32,
    pub last: u32,
}

impl AddressRange {
    pub fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    pub fn is_valid(&self) -> bool {
        self.first <= self.last
    }

    /// Number of address units covered. Only meaningful for valid ranges.
    pub fn units(&self) -> u32 {
        self.last - self.first + 1
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X} .. 0x{:X}", self.first, self.last)
    }
}

/// Bootloader parameters of one device family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub name: String,
    /// Recommended baud rate
    pub baud: u32,
    /// Per-byte UART read timeout
    pub timeout: Duration,
    /// Program memory is written in multiples of this many address units
    pub write_block: u32,
    /// Program memory is read in multiples of this many address units
    pub read_block: u32,
    /// Erase page size in address units
    pub erase_block: u32,
    /// Largest payload one packet may carry, in bytes
    pub max_pkt_size: u32,
    /// Width of one program memory word
    pub bytes_per_addr: u32,
    /// Program memory (flash) regions
    pub prog_ranges: Vec<AddressRange>,
    /// Data memory (EEPROM) region
    pub data_range: AddressRange,
}

impl DeviceProfile {
    pub const MIN_BAUD: u32 = 300;
    pub const MAX_BAUD: u32 = 1_000_000;
    pub const DEFAULT_BAUD: u32 = 115_200;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

    /// Check the parameters are usable by the region operations.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::config(format!("device '{}': {}", self.name, msg)));

        if self.name.trim().is_empty() {
            return Err(Error::config("device name must not be empty"));
        }
        if !(Self::MIN_BAUD..=Self::MAX_BAUD).contains(&self.baud) {
            return fail(format!(
                "baud {} outside {}..={}",
                self.baud,
                Self::MIN_BAUD,
                Self::MAX_BAUD
            ));
        }
        if self.timeout.is_zero() {
            return fail("timeout must be non-zero".to_string());
        }
        for (field, value) in [
            ("write_block", self.write_block),
            ("read_block", self.read_block),
            ("erase_block", self.erase_block),
            ("bytes_per_addr", self.bytes_per_addr),
        ] {
            if value == 0 {
                return fail(format!("{} must be non-zero", field));
            }
        }
        if 16 % self.bytes_per_addr != 0 {
            return fail(format!(
                "bytes_per_addr {} must divide 16",
                self.bytes_per_addr
            ));
        }
        if self.max_pkt_size < self.read_block * self.bytes_per_addr {
            return fail(format!(
                "max_pkt_size {} cannot hold one read block",
                self.max_pkt_size
            ));
        }
        if self.max_pkt_size < self.write_block * self.bytes_per_addr {
            return fail(format!(
                "max_pkt_size {} cannot hold one write block",
                self.max_pkt_size
            ));
        }
        if self.prog_ranges.is_empty() {
            return fail("at least one program memory range is required".to_string());
        }
        for range in self.prog_ranges.iter().chain(std::iter::once(&self.data_range)) {
            if !range.is_valid() {
                return fail(format!("bad memory region: {}", range));
            }
            if range.last > MAX_ADDRESS {
                return fail(format!("memory region {} exceeds 24-bit addressing", range));
            }
        }
        Ok(())
    }

    /// Largest number of read blocks one RD_PROG may request.
    pub fn max_read_blocks(&self) -> u32 {
        Self::blocks_per_packet(self.max_pkt_size, self.read_block, self.bytes_per_addr)
    }

    /// Largest number of write blocks one WR_PROG may carry.
    pub fn max_write_blocks(&self) -> u32 {
        Self::blocks_per_packet(self.max_pkt_size, self.write_block, self.bytes_per_addr)
    }

    fn blocks_per_packet(max_pkt_size: u32, block: u32, bytes_per_addr: u32) -> u32 {
        match block.checked_mul(bytes_per_addr) {
            Some(0) | None => 0,
            Some(bytes) => (max_pkt_size / bytes).min(u8::MAX as u32),
        }
    }
}
