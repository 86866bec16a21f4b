//! Progress bar utilities for displaying tile throughput

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: &'static str,
    pub animation: Animation,
}

impl ProgressBarConfig {
    pub fn new(total: usize, desc: &'static str, animation: Animation) -> Self {
        Self {
            total,
            desc,
            animation,
        }
    }
}

/// Create a progress bar with the given configuration
pub fn create_progress_bar(config: ProgressBarConfig) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation,
        unit = " tiles"
    )))
}

/// Advance the bar by `n`. Blocks on the lock: batches are counted, never skipped.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if n == 0 {
        return;
    }
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.update(n);
    }
}

/// Force a refresh of the bar (e.g. after the last worker flushed).
pub fn refresh_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.refresh();
    }
}

/// Per-worker tally that touches the shared bar once every `batch` tiles.
pub struct BatchedProgress {
    bar: Option<ProgressBar>,
    pending: usize,
    batch: usize,
}

impl BatchedProgress {
    pub fn new(bar: Option<ProgressBar>, batch: usize) -> Self {
        Self {
            bar,
            pending: 0,
            batch: batch.max(1),
        }
    }

    pub fn tick(&mut self) {
        self.pending += 1;
        if self.pending >= self.batch {
            self.flush();
        }
    }

    /// Push the remainder to the bar.
    pub fn flush(&mut self) {
        if let Some(bar) = &self.bar {
            update_progress_bar(bar, self.pending);
        }
        self.pending = 0;
    }
}

impl Drop for BatchedProgress {
    fn drop(&mut self) {
        self.flush();
    }
}
