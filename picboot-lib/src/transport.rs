use crate::Result;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

/// Byte stream the bootloader talks over.
///
/// Reads are expected to block for at most the configured timeout and then fail with
/// [`std::io::ErrorKind::TimedOut`].
pub trait Transport: Read + Write + Send {
    /// Drop anything received but not yet read.
    fn discard_input(&mut self) -> std::io::Result<()>;
}

impl Transport for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> std::io::Result<()> {
        self.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

/// Open a serial port with 8N1 framing and the given per-read timeout.
pub fn open_serial(port_name: &str, baud: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    tracing::debug!("opening {} at {} baud, timeout {:?}", port_name, baud, timeout);
    let port = serialport::new(port_name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .timeout(timeout)
        .open()?;
    Ok(port)
}
