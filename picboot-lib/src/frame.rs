//! Byte-stuffed frame codec used on the bootloader UART.
//!
//! ```text
//! <STX><STX><PAYLOAD...><CHKSUM><ETX>
//! ```
//!
//! Any payload or checksum byte equal to `STX`, `ETX` or `DLE` goes on the wire prefixed by a
//! single `DLE`. The checksum is the two's complement of the 8-bit sum of the unescaped payload,
//! so a well-formed frame sums to zero once the checksum byte is included.

use crate::Error;
use std::fmt;
use std::io::{ErrorKind, Read};

pub const STX: u8 = 0x0F;
pub const ETX: u8 = 0x04;
pub const DLE: u8 = 0x05;

const INITIAL_BUFFER_SIZE: usize = 256;

fn is_control(byte: u8) -> bool {
    matches!(byte, STX | ETX | DLE)
}

fn push_escaped(out: &mut Vec<u8>, byte: u8) {
    if is_control(byte) {
        out.push(DLE);
    }
    out.push(byte);
}

/// Two's complement of the 8-bit sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |sum, &b| sum.wrapping_add(b))
        .wrapping_neg()
}

/// Wrap `payload` into a complete wire frame.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    // worst case every byte is escaped
    let mut out = Vec::with_capacity(2 * payload.len() + 5);
    out.push(STX);
    out.push(STX);
    for &byte in payload {
        push_escaped(&mut out, byte);
    }
    push_escaped(&mut out, checksum(payload));
    out.push(ETX);
    out
}

#[derive(Debug)]
pub enum FrameError {
    /// Frame terminated but its bytes did not sum to zero.
    Checksum { sum: u8 },
    /// No byte arrived within the port timeout.
    Timeout,
    Read(std::io::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Checksum { sum } => write!(f, "checksum mismatch (sum {:#04X})", sum),
            FrameError::Timeout => write!(f, "timeout waiting for response"),
            FrameError::Read(e) => write!(f, "read error: {}", e),
        }
    }
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Read(e) => Error::from(e),
            other => Error::protocol(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    WaitStx1,
    WaitStx2,
    Payload,
    Escaped,
}

/// Incremental frame decoder.
///
/// The decoder keeps every unescaped byte of the last good frame, checksum included, until the
/// next frame starts. The buffer only ever grows.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    buffer: Vec<u8>,
    sum: u8,
    frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::WaitStx1,
            buffer: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            sum: 0,
            frame_len: 0,
        }
    }

    /// Feed one raw byte.
    ///
    /// Returns `Some(Ok(len))` when a valid frame of `len` unescaped bytes (checksum included)
    /// has been completed, `Some(Err(..))` when a frame ended with a bad checksum, and `None`
    /// while more bytes are needed.
    pub fn push(&mut self, byte: u8) -> Option<Result<usize, FrameError>> {
        match self.state {
            DecodeState::WaitStx1 => {
                if byte == STX {
                    self.state = DecodeState::WaitStx2;
                }
            }
            DecodeState::WaitStx2 => {
                if byte == STX {
                    self.buffer.clear();
                    self.sum = 0;
                    self.frame_len = 0;
                    self.state = DecodeState::Payload;
                } else {
                    self.state = DecodeState::WaitStx1;
                }
            }
            DecodeState::Payload => match byte {
                STX => self.state = DecodeState::WaitStx2,
                DLE => self.state = DecodeState::Escaped,
                ETX => {
                    self.state = DecodeState::WaitStx1;
                    if self.sum == 0 {
                        self.frame_len = self.buffer.len();
                        return Some(Ok(self.frame_len));
                    }
                    let sum = self.sum;
                    self.buffer.clear();
                    return Some(Err(FrameError::Checksum { sum }));
                }
                _ => self.store(byte),
            },
            DecodeState::Escaped => {
                self.store(byte);
                self.state = DecodeState::Payload;
            }
        }
        None
    }

    fn store(&mut self, byte: u8) {
        self.buffer.push(byte);
        self.sum = self.sum.wrapping_add(byte);
    }

    /// Read bytes from `reader` until one frame completes.
    ///
    /// Timeouts and read errors end the attempt; they are not retried here.
    pub fn read_frame<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<usize, FrameError> {
        self.state = DecodeState::WaitStx1;
        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte) {
                Ok(0) => return Err(FrameError::Timeout),
                Ok(_) => {
                    if let Some(result) = self.push(byte[0]) {
                        return result;
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Err(FrameError::Timeout);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(FrameError::Read(e)),
            }
        }
    }

    /// Unescaped bytes of the last valid frame, checksum byte included.
    pub fn frame(&self) -> &[u8] {
        &self.buffer[..self.frame_len]
    }

    /// Length of the last valid frame, checksum byte included.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Payload of the last valid frame, without the trailing checksum byte.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.frame_len.saturating_sub(1)]
    }

    /// Decode a complete byte sequence, returning the payload of the first frame found.
    pub fn decode(bytes: &[u8]) -> Option<Result<Vec<u8>, FrameError>> {
        let mut decoder = Self::new();
        for &byte in bytes {
            match decoder.push(byte) {
                Some(Ok(_)) => return Some(Ok(decoder.payload().to_vec())),
                Some(Err(e)) => return Some(Err(e)),
                None => {}
            }
        }
        None
    }
}
