//! CLI progress rendering
//!
//! Region operations report progress in device blocks. On a terminal they are drawn with
//! indicatif bars; otherwise a plain percentage line is printed whenever it changes.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use picboot_lib::progress::{ProgressCallback, ProgressId, ProgressInfo, ProgressType};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct PercentProgressState {
    total: u64,
    current: u64,
    last_percent: u64,
}

/// Percentage output for pipes and log files
pub struct PercentProgressCallback {
    progress_states: Mutex<HashMap<u64, PercentProgressState>>,
    next_id: AtomicU64,
}

impl PercentProgressCallback {
    pub fn new() -> Self {
        Self {
            progress_states: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn print_line(&self, line: &str) {
        let mut stdout = io::stdout();
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }

    fn calculate_percent(current: u64, total: u64) -> u64 {
        if total == 0 {
            return 100;
        }
        (current.saturating_mul(100) / total).min(100)
    }
}

impl Default for PercentProgressCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for PercentProgressCallback {
    fn start(&self, info: ProgressInfo) -> ProgressId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let ProgressType::Bar { total } = info.progress_type;
        let current = info.current.unwrap_or(0);
        let percent = Self::calculate_percent(current, total);
        self.print_line(&format!("{} {}%", info.message, percent));
        let state = PercentProgressState {
            total,
            current,
            last_percent: percent,
        };

        if let Ok(mut states) = self.progress_states.lock() {
            states.insert(id, state);
        }
        ProgressId(id)
    }

    fn update_message(&self, _id: ProgressId, message: String) {
        self.print_line(&message);
    }

    fn increment(&self, id: ProgressId, delta: u64) {
        let mut percent_to_print = None;
        if let Ok(mut states) = self.progress_states.lock()
            && let Some(PercentProgressState {
                total,
                current,
                last_percent,
            }) = states.get_mut(&id.0)
        {
            *current = current.saturating_add(delta);
            let percent = Self::calculate_percent(*current, *total);
            if percent != *last_percent {
                *last_percent = percent;
                percent_to_print = Some(percent);
            }
        }

        if let Some(percent) = percent_to_print {
            self.print_line(&format!("{}%", percent));
        }
    }

    fn finish(&self, id: ProgressId, final_message: String) {
        let state = match self.progress_states.lock() {
            Ok(mut states) => states.remove(&id.0),
            Err(_) => None,
        };
        if state.is_some() {
            self.print_line(&final_message);
        }
    }
}

/// indicatif bars sharing the terminal with the log output
pub struct IndicatifProgressCallback {
    multi_progress: MultiProgress,
    progress_bars: Mutex<HashMap<u64, ProgressBar>>,
    next_id: AtomicU64,
}

impl IndicatifProgressCallback {
    pub fn new(multi_progress: MultiProgress) -> Self {
        Self {
            multi_progress,
            progress_bars: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl ProgressCallback for IndicatifProgressCallback {
    fn start(&self, info: ProgressInfo) -> ProgressId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let ProgressType::Bar { total } = info.progress_type;
        let bar = self.multi_progress.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::with_template(&format!(
                "[{}] {{msg}} {{wide_bar}} {{pos}}/{{len}} blocks {{percent}}%",
                info.prefix
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        bar.set_message(info.message);
        if let Some(current) = info.current {
            bar.set_position(current);
        }

        if let Ok(mut bars) = self.progress_bars.lock() {
            bars.insert(id, bar);
        }
        ProgressId(id)
    }

    fn update_message(&self, id: ProgressId, message: String) {
        if let Ok(bars) = self.progress_bars.lock()
            && let Some(bar) = bars.get(&id.0)
        {
            bar.set_message(message);
        }
    }

    fn increment(&self, id: ProgressId, delta: u64) {
        if let Ok(bars) = self.progress_bars.lock()
            && let Some(bar) = bars.get(&id.0)
        {
            bar.inc(delta);
        }
    }

    fn finish(&self, id: ProgressId, final_message: String) {
        if let Ok(mut bars) = self.progress_bars.lock()
            && let Some(bar) = bars.remove(&id.0)
        {
            bar.finish_with_message(final_message);
        }
    }
}

/// Bars when a terminal is attached, percentage lines otherwise.
pub fn create_progress_callback(
    multi_progress: Option<&MultiProgress>,
) -> Arc<dyn ProgressCallback> {
    match multi_progress {
        Some(multi) => Arc::new(IndicatifProgressCallback::new(multi.clone())),
        None => Arc::new(PercentProgressCallback::new()),
    }
}
