use thiserror::Error;

/// Convenient result type for `picboot-lib`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serial(#[from] serialport::Error),

    #[error("Intel HEX write error: {0}")]
    HexWrite(#[from] ihex::WriterError),

    #[error("{0}")]
    Parameter(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("Target did not respond correctly.")]
    Unresponsive,

    #[error("Invalid length of response: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Aborted by user.")]
    Aborted,

    #[error("Port is closed.")]
    NotOpen,

    #[error("Port already opened.")]
    AlreadyOpen,

    #[error("Address 0x{0:X} not found in memory regions.")]
    UnmappedAddress(u32),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::Parameter(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
