//! Progress callback system
//!
//! Defines the abstract progress interface so that front ends (CLI, GUI, ...) can render
//! region operations their own way.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Progress indicator kind
#[derive(Debug, Clone)]
pub enum ProgressType {
    /// Bar with a known total, counted in device blocks
    Bar { total: u64 },
}

/// Initial state of a progress indicator
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub progress_type: ProgressType,
    /// Step prefix, a hexadecimal step number
    pub prefix: String,
    pub message: String,
    /// Starting position
    pub current: Option<u64>,
}

/// Progress callback trait
///
/// Implement this to control how progress is displayed.
pub trait ProgressCallback: Send + Sync {
    /// Start a new indicator and return its id for later updates.
    fn start(&self, info: ProgressInfo) -> ProgressId;

    fn update_message(&self, id: ProgressId, message: String);

    /// Advance a bar by `delta` units.
    fn increment(&self, id: ProgressId, delta: u64);

    fn finish(&self, id: ProgressId, final_message: String);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressId(pub u64);

/// Callback that renders nothing.
#[derive(Debug, Default)]
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn start(&self, _info: ProgressInfo) -> ProgressId {
        ProgressId(0)
    }

    fn update_message(&self, _id: ProgressId, _message: String) {}

    fn increment(&self, _id: ProgressId, _delta: u64) {}

    fn finish(&self, _id: ProgressId, _final_message: String) {}
}

pub type ProgressCallbackArc = Arc<dyn ProgressCallback>;

pub fn no_op_progress_callback() -> ProgressCallbackArc {
    Arc::new(NoOpProgressCallback)
}

/// Hands out numbered progress indicators.
pub struct ProgressHelper {
    callback: ProgressCallbackArc,
    step_counter: AtomicI32,
}

impl ProgressHelper {
    pub fn new(callback: ProgressCallbackArc, initial_step: i32) -> Self {
        Self {
            callback,
            step_counter: AtomicI32::new(initial_step),
        }
    }

    fn next_step(&self) -> i32 {
        self.step_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn create_bar(&self, total: u64, message: impl Into<String>) -> ProgressHandler {
        let step = self.next_step();
        let info = ProgressInfo {
            progress_type: ProgressType::Bar { total },
            prefix: format!("0x{:02X}", step),
            message: message.into(),
            current: Some(0),
        };
        let id = self.callback.start(info);
        ProgressHandler {
            callback: Arc::clone(&self.callback),
            id,
        }
    }
}

/// One live progress indicator.
pub struct ProgressHandler {
    callback: ProgressCallbackArc,
    id: ProgressId,
}

impl ProgressHandler {
    pub fn set_message(&self, message: impl Into<String>) {
        self.callback.update_message(self.id, message.into());
    }

    pub fn inc(&self, delta: u64) {
        self.callback.increment(self.id, delta);
    }

    pub fn finish_with_message(self, message: impl Into<String>) {
        self.callback.finish(self.id, message.into());
    }
}
