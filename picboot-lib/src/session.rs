//! State shared between the thread driving a session and its observers.
//!
//! Status, the one-shot error message and the cancellation flag sit behind a single mutex. Every
//! access is short, so nothing finer grained is needed.

use std::sync::{Arc, Mutex, MutexGuard};
use strum::Display;

/// Execution status of a session.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Port open, nothing in progress.
    Idle,
    /// A command sequence is running.
    Busy,
    /// Port closed, or the last command failed (which also closes the port).
    Error,
}

impl ExecutionStatus {
    /// Numeric form: 0 idle, positive busy, negative error.
    pub fn code(self) -> i32 {
        match self {
            ExecutionStatus::Idle => 0,
            ExecutionStatus::Busy => 1,
            ExecutionStatus::Error => -1,
        }
    }
}

#[derive(Debug)]
struct SharedState {
    status: ExecutionStatus,
    last_error: Option<String>,
    cancel: bool,
}

/// Cloneable handle onto a session's shared state.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<SharedState>>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    /// A fresh handle starts in `Error`: no port is open yet.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedState {
                status: ExecutionStatus::Error,
                last_error: None,
                cancel: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        // the state stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> ExecutionStatus {
        self.lock().status
    }

    pub fn set_status(&self, status: ExecutionStatus) {
        self.lock().status = status;
    }

    /// Take the last recorded error message. Reading clears it.
    pub fn take_error(&self) -> Option<String> {
        self.lock().last_error.take()
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.lock().last_error = Some(message.into());
    }

    /// Ask the running operation to stop at its next command attempt.
    pub fn request_cancel(&self) {
        self.lock().cancel = true;
    }

    pub fn clear_cancel(&self) {
        self.lock().cancel = false;
    }

    /// Consume a pending cancellation request.
    pub fn take_cancel(&self) -> bool {
        std::mem::take(&mut self.lock().cancel)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.lock().cancel
    }
}
