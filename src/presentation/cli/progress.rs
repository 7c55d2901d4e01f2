//! indicatif adapter for the core's `(message, fraction)` callbacks.

use indicatif::{ProgressBar, ProgressStyle};

/// Resolution of the progress bar; fractions map onto 0..=1000.
const BAR_TICKS: u64 = 1_000;

pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(BAR_TICKS);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent}%")
                .expect("static progress template"),
        );
        bar.set_message(message.to_string());
        Self { bar }
    }

    /// Applies one core progress event. Negative fractions update the
    /// message without advancing the bar.
    pub fn update(&self, message: &str, fraction: f32) {
        self.bar.set_message(message.to_string());
        if fraction >= 0.0 {
            let position = (fraction.clamp(0.0, 1.0) * BAR_TICKS as f32) as u64;
            self.bar.set_position(position);
        }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
