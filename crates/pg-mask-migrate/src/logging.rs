//! Per-run log buffer.
//!
//! Every line written through a [`RunLog`] is emitted as a `tracing` event and
//! also kept in order, so the caller gets the complete transcript of the run
//! back without any global buffer.

use std::fmt::Write as FmtWrite;
use std::sync::{Arc, Mutex};

use tracing::Level;

/// Ordered, cloneable log buffer for one invocation.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.record(Level::INFO, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.record(Level::WARN, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.record(Level::ERROR, message.as_ref());
    }

    fn record(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!("{}", message),
            Level::WARN => tracing::warn!("{}", message),
            _ => tracing::info!("{}", message),
        }

        let mut line = String::new();
        let now = chrono::Local::now();
        let _ = write!(line, "{} [{:5}] {}", now.format("%H:%M:%S"), level, message);

        // A poisoned buffer still holds every line written before the panic.
        let mut lines = match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push(line);
    }

    /// Snapshot of the lines recorded so far.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// All lines joined by newlines.
    pub fn transcript(&self) -> String {
        self.lines().join("\n")
    }

    /// Whether any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}
