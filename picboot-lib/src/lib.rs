pub mod bootloader;
pub mod command;
pub mod device;
pub mod error;
pub mod frame;
pub mod image;
pub mod log;
pub mod progress;
pub mod region;
pub mod session;
pub mod transport;
pub mod utils;

pub use bootloader::{Bootloader, DEFAULT_RETRIES};
pub use command::{Command, Opcode};
pub use device::{AddressRange, DeviceProfile};
pub use error::{Error, Result};
pub use image::{HexImage, LoadReport, MemoryBlock};
pub use log::{LogReceiver, LogSink, LogSinkArc, QueueLogSink, log_queue};
pub use session::{ExecutionStatus, SessionHandle};
pub use transport::Transport;
