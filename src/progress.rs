//! Multi-row progress display shared by all transfers in a batch.
//!
//! One row per transfer unit, created lazily on the unit's first progress
//! event so a transfer that starts mid-way shows its real position instead
//! of a bar that jumps from zero. All updates go through this type; indicatif
//! serializes the actual frame drawing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;

pub struct ProgressAggregator {
    multi: MultiProgress,
    rows: Mutex<HashMap<usize, ProgressBar>>,
    stopped: AtomicBool,
}

impl ProgressAggregator {
    /// Display drawing to stderr.
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Display that tracks state without drawing (tests, --quiet).
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            rows: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    fn row_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg} |{bar:40.cyan/blue}| {pos:>3}%")
            .expect("progress template is valid")
            .progress_chars("=> ")
    }

    /// Create-or-update the row for `unit_id`.
    ///
    /// The first report creates the row at `percent` rather than zero.
    /// Percentages are clamped to [0, 100] and a row never moves backward.
    pub fn report(&self, unit_id: usize, percent: f64, label: &str) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let position = percent.clamp(0.0, 100.0).round() as u64;

        let mut rows = self.rows.lock();
        match rows.get(&unit_id) {
            Some(row) => {
                if !row.is_finished() && position > row.position() {
                    row.set_position(position);
                }
            }
            None => {
                let row = self.multi.add(ProgressBar::new(100));
                row.set_style(Self::row_style());
                row.set_message(label.to_string());
                row.set_position(position);
                rows.insert(unit_id, row);
            }
        }
    }

    /// Finalize every row and release the display. Rows stay visible at
    /// their last position so the outcome remains readable after exit.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let rows = self.rows.lock();
        for row in rows.values() {
            if !row.is_finished() {
                row.abandon();
            }
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn position(&self, unit_id: usize) -> Option<u64> {
        self.rows.lock().get(&unit_id).map(|row| row.position())
    }
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgressAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_created_once_per_unit() {
        let agg = ProgressAggregator::hidden();
        agg.report(0, 30.0, "f");
        agg.report(0, 30.0, "f");
        assert_eq!(agg.row_count(), 1);
    }

    #[test]
    fn test_row_starts_at_first_reported_percent() {
        let agg = ProgressAggregator::hidden();
        agg.report(7, 42.0, "resumed.bin");
        assert_eq!(agg.position(7), Some(42));
    }

    #[test]
    fn test_rows_never_move_backward() {
        let agg = ProgressAggregator::hidden();
        agg.report(1, 80.0, "f");
        agg.report(1, 30.0, "f");
        assert_eq!(agg.position(1), Some(80));
    }

    #[test]
    fn test_percent_clamped_to_bounds() {
        let agg = ProgressAggregator::hidden();
        agg.report(0, 150.0, "over");
        agg.report(1, -5.0, "under");
        assert_eq!(agg.position(0), Some(100));
        assert_eq!(agg.position(1), Some(0));
    }

    #[test]
    fn test_stop_freezes_rows() {
        let agg = ProgressAggregator::hidden();
        agg.report(0, 50.0, "f");
        agg.stop();
        agg.report(0, 90.0, "f");
        agg.report(1, 10.0, "late");
        assert_eq!(agg.position(0), Some(50));
        assert_eq!(agg.row_count(), 1);
    }
}
