//! Progress UI (spinner) for batch runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner showing `[n/N] <title>` while a batch runs. Disabled in quiet mode.
pub(crate) struct BatchProgress {
    spinner: Option<ProgressBar>,
}

impl BatchProgress {
    pub(crate) fn new(enabled: bool) -> Self {
        if !enabled {
            return Self { spinner: None };
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        Self {
            spinner: Some(spinner),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.spinner.is_some()
    }

    pub(crate) fn start(&self, position: usize, total: usize, title: &str) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(progress_message(position, total, title));
        }
    }

    pub(crate) fn finish(self) {
        if let Some(spinner) = self.spinner {
            spinner.finish_and_clear();
        }
    }
}

pub(crate) fn progress_message(position: usize, total: usize, title: &str) -> String {
    format!("[{}/{}] {}", position.min(total), total, title)
}
