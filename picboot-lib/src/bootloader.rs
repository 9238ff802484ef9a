use crate::command::Command;
use crate::frame::{self, FrameDecoder};
use crate::log::{LogSinkArc, Logger, no_op_log_sink};
use crate::progress::{ProgressCallbackArc, ProgressHelper, no_op_progress_callback};
use crate::session::{ExecutionStatus, SessionHandle};
use crate::transport::{self, Transport};
use crate::{Error, Result};
use std::time::Duration;

/// Number of times a command is sent before the device is declared unresponsive.
pub const DEFAULT_RETRIES: usize = 3;

/// One bootloader session over a single transport.
pub struct Bootloader {
    port: Option<Box<dyn Transport>>,
    pub(crate) handle: SessionHandle,
    decoder: FrameDecoder,
    retries: usize,
    pub(crate) log: Logger,
    pub(crate) progress: ProgressHelper,
}

impl Bootloader {
    pub fn new(log_sink: LogSinkArc) -> Self {
        Self {
            port: None,
            handle: SessionHandle::new(),
            decoder: FrameDecoder::new(),
            retries: DEFAULT_RETRIES,
            log: Logger::new(log_sink),
            progress: ProgressHelper::new(no_op_progress_callback(), 0),
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallbackArc) -> Self {
        self.progress = ProgressHelper::new(callback, 0);
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Handle for observing this session from another thread.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.handle.status()
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Open a serial port for this session.
    pub fn open(&mut self, port_name: &str, baud: u32, timeout: Duration) -> Result<()> {
        if self.is_open() {
            let err = Error::AlreadyOpen;
            self.handle.set_error(err.to_string());
            return Err(err);
        }
        match transport::open_serial(port_name, baud, timeout) {
            Ok(port) => {
                self.attach(Box::new(port));
                Ok(())
            }
            Err(e) => {
                self.handle.set_status(ExecutionStatus::Error);
                self.handle.set_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Use an already opened transport. Any previous transport is dropped.
    pub fn attach(&mut self, port: Box<dyn Transport>) {
        self.port = Some(port);
        self.handle.set_status(ExecutionStatus::Idle);
    }

    /// Close the port unless a command sequence is running.
    ///
    /// Returns `true` when the port is closed afterwards.
    pub fn try_close(&mut self) -> bool {
        if self.port.is_some() && self.handle.status() != ExecutionStatus::Busy {
            self.port = None;
        }
        if self.port.is_none() {
            self.handle.set_status(ExecutionStatus::Error);
            return true;
        }
        false
    }

    /// Unescaped bytes of the last response, checksum byte included.
    pub fn last_response(&self) -> &[u8] {
        self.decoder.frame()
    }

    /// Length of the last response frame, checksum byte included.
    pub fn last_response_len(&self) -> usize {
        self.decoder.frame_len()
    }

    /// Send one command and wait for its response, retrying on bad or missing responses.
    ///
    /// Any failure leaves the session in `Error` with the port closed.
    pub fn execute(&mut self, command: &Command) -> Result<()> {
        tracing::debug!("command: {}", command);
        let request = frame::encode(&command.to_bytes());

        for attempt in 1..=self.retries {
            if self.handle.take_cancel() {
                return self.fail(Error::Aborted);
            }
            let Some(port) = self.port.as_mut() else {
                return self.fail(Error::NotOpen);
            };

            let sent = port
                .discard_input()
                .and_then(|_| port.write_all(&request))
                .and_then(|_| port.flush());
            if let Err(e) = sent {
                return self.fail(e.into());
            }

            match self.decoder.read_frame(port.as_mut()) {
                Ok(len) => {
                    tracing::debug!("response: {} bytes {:02X?}", len, self.decoder.frame());
                    self.handle.set_status(ExecutionStatus::Idle);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "{} attempt {}/{} failed: {}",
                        command.opcode,
                        attempt,
                        self.retries,
                        e
                    );
                }
            }
        }
        self.fail(Error::Unresponsive)
    }

    /// Record `err`, mark the session failed and close the port.
    pub(crate) fn fail<T>(&mut self, err: Error) -> Result<T> {
        self.handle.set_error(err.to_string());
        self.handle.set_status(ExecutionStatus::Error);
        self.port = None;
        Err(err)
    }

    /// Record a parameter problem without touching the port.
    pub(crate) fn reject<T>(&mut self, err: Error) -> Result<T> {
        self.handle.set_error(err.to_string());
        self.log.error(err.to_string());
        Err(err)
    }
}

impl Default for Bootloader {
    fn default() -> Self {
        Self::new(no_op_log_sink())
    }
}
