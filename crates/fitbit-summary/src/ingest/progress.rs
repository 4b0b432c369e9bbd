//! Progress tracking for the aggregation phase with atomic counters

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Progress of the per-group extraction
#[derive(Debug)]
pub struct IngestProgress {
    /// Groups to process
    total: AtomicU32,
    /// Groups that produced a row
    completed: AtomicU32,
    /// Groups excluded because extraction failed
    failed: AtomicU32,
    /// Last processed group
    last_item: Mutex<String>,
    /// Print a status line after every group
    print: bool,
    start_time: Instant,
}

impl IngestProgress {
    pub fn new(print: bool) -> Self {
        Self {
            total: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            failed: AtomicU32::new(0),
            last_item: Mutex::new(String::new()),
            print,
            start_time: Instant::now(),
        }
    }

    /// Progress that never prints
    pub fn silent() -> Self {
        Self::new(false)
    }

    pub fn set_total(&self, total: u32) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Record a group that produced a row
    pub fn complete_one(&self, desc: String) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.finish_item(desc);
    }

    /// Record a group that was excluded
    pub fn fail_one(&self, desc: String) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.finish_item(desc);
    }

    fn finish_item(&self, desc: String) {
        *self.last_item.lock().unwrap_or_else(PoisonError::into_inner) = desc;
        if self.print {
            self.print_simple_status();
        }
    }

    pub fn get_last_item(&self) -> String {
        self.last_item
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_total(&self) -> u32 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn get_completed(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn get_failed(&self) -> u32 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Groups processed so far, successful or not
    pub fn processed(&self) -> u32 {
        self.get_completed() + self.get_failed()
    }

    /// Get completion percentage (0-100)
    pub fn percent(&self) -> u16 {
        let total = self.get_total();
        if total == 0 {
            return 0;
        }
        ((self.processed() as f64 / total as f64) * 100.0) as u16
    }

    pub fn is_complete(&self) -> bool {
        self.processed() >= self.get_total()
    }

    /// Get elapsed time as formatted string
    pub fn elapsed_str(&self) -> String {
        let secs = self.start_time.elapsed().as_secs();
        let mins = secs / 60;
        if mins > 0 {
            format!("{}m {}s", mins, secs % 60)
        } else {
            format!("{}s", secs)
        }
    }

    /// Print simple status line
    pub fn print_simple_status(&self) {
        print!(
            "\rAggregating: {}/{} ({}%) | failed: {} | {} | {} ",
            self.processed(),
            self.get_total(),
            self.percent(),
            self.get_failed(),
            self.get_last_item(),
            self.elapsed_str(),
        );
        let _ = std::io::Write::flush(&mut std::io::stdout());
    }
}

impl Default for IngestProgress {
    fn default() -> Self {
        Self::silent()
    }
}

/// Shared progress wrapped in Arc for parallel access
pub type SharedProgress = Arc<IngestProgress>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_counts() {
        let progress = IngestProgress::silent();
        progress.set_total(4);
        assert_eq!(progress.percent(), 0);

        progress.complete_one("S1 2024-08-09".to_string());
        progress.fail_one("S1 2024-08-10".to_string());

        assert_eq!(progress.get_completed(), 1);
        assert_eq!(progress.get_failed(), 1);
        assert_eq!(progress.percent(), 50);
        assert_eq!(progress.get_last_item(), "S1 2024-08-10");
        assert!(!progress.is_complete());

        progress.complete_one("S2 2024-08-09".to_string());
        progress.complete_one("S2 2024-08-10".to_string());
        assert!(progress.is_complete());
    }

    #[test]
    fn test_empty_progress_is_complete() {
        let progress = IngestProgress::silent();
        assert_eq!(progress.percent(), 0);
        assert!(progress.is_complete());
    }
}
