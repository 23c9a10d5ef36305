//! Notification sink for notices, warnings and errors
//!
//! The tracker and walker report through a `&dyn Notifier` handed to them at
//! construction. Nothing they do depends on what the sink does with an event.

use parking_lot::Mutex;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Notice,
    Warning,
    Error,
}

/// A recorded notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub message: String,
}

/// Sink for user-facing notifications
pub trait Notifier: Send + Sync {
    fn notice(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);

    /// Called after each entry the walker finishes
    fn progress(&self, _entries_done: u64) {}
}

/// Forwards notifications to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notice(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Messages at exactly `level`
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }

    fn push(&self, level: Level, message: &str) {
        self.events.lock().push(Event {
            level,
            message: message.to_string(),
        });
    }
}

impl Notifier for RecordingNotifier {
    fn notice(&self, message: &str) {
        self.push(Level::Notice, message);
    }

    fn warning(&self, message: &str) {
        self.push(Level::Warning, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }
}
