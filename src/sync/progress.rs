//! Progress display for the fetch stage

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

/// Counts finished collection fetches, optionally behind a progress bar
pub struct ProgressTracker {
    completed: AtomicU64,
    start_time: Instant,
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// # Arguments
    /// * `total` - Number of collections to fetch
    /// * `enable_bar` - Draw a bar on stderr
    pub fn new(total: u64, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new(total);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} collections {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            bar.set_style(style);
            bar
        });

        Self {
            completed: AtomicU64::new(0),
            start_time: Instant::now(),
            bar,
        }
    }

    /// Record one more finished fetch
    pub fn advance(&self, collection: &str) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(bar) = &self.bar {
            bar.set_position(done);
            bar.set_message(collection.to_string());
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Clear the bar; returns elapsed seconds
    pub fn finish(&self) -> f64 {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        self.start_time.elapsed().as_secs_f64()
    }
}
