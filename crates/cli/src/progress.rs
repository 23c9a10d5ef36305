//! Terminal notifier: log lines plus a spinner counting entries

use indicatif::{ProgressBar, ProgressStyle};
use lb_core::{Notifier, TracingNotifier};
use std::time::Duration;

pub struct ProgressNotifier {
    bar: ProgressBar,
    inner: TracingNotifier,
}

impl ProgressNotifier {
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            bar,
            inner: TracingNotifier,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Notifier for ProgressNotifier {
    fn notice(&self, message: &str) {
        self.bar.suspend(|| self.inner.notice(message));
    }

    fn warning(&self, message: &str) {
        self.bar.suspend(|| self.inner.warning(message));
    }

    fn error(&self, message: &str) {
        self.bar.suspend(|| self.inner.error(message));
    }

    fn progress(&self, entries_done: u64) {
        self.bar.set_message(format!("{} entries", entries_done));
    }
}

impl Drop for ProgressNotifier {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
