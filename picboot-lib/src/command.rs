use crate::{Error, Result};
use strum::Display;

/// Highest address a command header can carry.
pub const MAX_ADDRESS: u32 = 0x00FF_FFFF;

/// Size of the `[opcode, length, addr_lo, addr_mid, addr_hi]` header.
pub const HEADER_LEN: usize = 5;

/// Bootloader opcodes.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Read bootloader version
    #[strum(serialize = "RD_VER")]
    ReadVersion = 0x00,
    /// Read program memory
    #[strum(serialize = "RD_PROG")]
    ReadProg = 0x01,
    /// Write program memory
    #[strum(serialize = "WR_PROG")]
    WriteProg = 0x02,
    /// Erase program memory
    #[strum(serialize = "ER_PROG")]
    EraseProg = 0x03,
    /// Read data memory (EEPROM)
    #[strum(serialize = "RD_DATA")]
    ReadData = 0x04,
    /// Write data memory (EEPROM)
    #[strum(serialize = "WR_DATA")]
    WriteData = 0x05,
    #[strum(serialize = "RESET")]
    Reset = 0xFF,
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> Self {
        opcode as Self
    }
}

/// One bootloader request.
///
/// `length` is always expressed in the device's block units for the opcode (read, write or
/// erase blocks), never in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    pub opcode: Opcode,
    pub length: u8,
    pub address: u32,
    pub payload: &'a [u8],
}

impl<'a> Command<'a> {
    pub fn new(opcode: Opcode, length: u8, address: u32, payload: &'a [u8]) -> Result<Self> {
        if address > MAX_ADDRESS {
            return Err(Error::parameter(format!(
                "Address 0x{:X} does not fit in 24 bits",
                address
            )));
        }
        Ok(Self {
            opcode,
            length,
            address,
            payload,
        })
    }

    /// Raw request bytes, before framing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.push(self.opcode.into());
        bytes.push(self.length);
        bytes.push(self.address as u8);
        bytes.push((self.address >> 8) as u8);
        bytes.push((self.address >> 16) as u8);
        bytes.extend_from_slice(self.payload);
        bytes
    }
}

impl std::fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {{ length: {}, address: {:#08X}, payload: {} bytes }}",
            self.opcode,
            self.length,
            self.address,
            self.payload.len()
        )
    }
}
