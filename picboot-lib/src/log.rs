//! Human-readable operation log.
//!
//! Library code reports what it is doing through a [`LogSink`]. The sink is fire-and-forget:
//! implementations must never block the caller. [`QueueLogSink`] keeps a bounded queue and drops
//! lines once it is full, so a slow observer cannot stall an operation.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// Receives log lines from a running session.
pub trait LogSink: Send + Sync {
    fn push(&self, line: String);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NoOpLogSink;

impl LogSink for NoOpLogSink {
    fn push(&self, _line: String) {}
}

pub type LogSinkArc = Arc<dyn LogSink>;

pub fn no_op_log_sink() -> LogSinkArc {
    Arc::new(NoOpLogSink)
}

/// Bounded queue sink. Lines that do not fit are dropped; accepted lines keep their order.
#[derive(Debug)]
pub struct QueueLogSink {
    sender: SyncSender<String>,
}

impl LogSink for QueueLogSink {
    fn push(&self, line: String) {
        match self.sender.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(line)) => tracing::trace!("log queue full, dropped: {}", line),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Receiving end of a [`QueueLogSink`].
#[derive(Debug)]
pub struct LogReceiver {
    receiver: Receiver<String>,
}

impl LogReceiver {
    /// Take every line queued so far without blocking.
    pub fn drain(&self) -> Vec<String> {
        self.receiver.try_iter().collect()
    }
}

/// Create a bounded log queue holding at most `capacity` pending lines.
pub fn log_queue(capacity: usize) -> (Arc<QueueLogSink>, LogReceiver) {
    let (sender, receiver) = mpsc::sync_channel(capacity);
    (Arc::new(QueueLogSink { sender }), LogReceiver { receiver })
}

/// Writes each line both to `tracing` and to the session's sink.
#[derive(Clone)]
pub(crate) struct Logger {
    sink: LogSinkArc,
}

impl Logger {
    pub(crate) fn new(sink: LogSinkArc) -> Self {
        Self { sink }
    }

    pub(crate) fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.sink.push(message);
    }

    pub(crate) fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.sink.push(format!("ERROR: {}", message));
    }
}
