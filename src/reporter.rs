//! Logging capability passed to every component.
//!
//! `main` builds one reporter and hands it down; no component configures
//! logging on its own.

use std::error::Error as StdError;
use std::sync::Mutex;

use tracing::{debug, error, info};

/// Sink for progress and failure messages.
pub trait Reporter: Send + Sync {
    fn info(&self, msg: &str);

    fn error(&self, msg: &str, cause: &dyn StdError);

    fn debug(&self, _msg: &str) {}
}

/// Forwards to `tracing`. In debug mode errors carry their full source chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter {
    pub(crate) verbose_errors: bool,
}

impl TracingReporter {
    pub fn new(verbose_errors: bool) -> Self {
        Self { verbose_errors }
    }
}

impl Reporter for TracingReporter {
    fn info(&self, msg: &str) {
        info!("{}", msg);
    }

    fn error(&self, msg: &str, cause: &dyn StdError) {
        if self.verbose_errors {
            error!("{}: {}", msg, error_chain(cause));
        } else {
            error!("{}: {}", msg, cause);
        }
    }

    fn debug(&self, msg: &str) {
        debug!("{}", msg);
    }
}

/// Render an error and all of its sources, outermost first.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str("\n  caused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
    Debug,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub level: Level,
    pub message: String,
}

/// Collects messages in memory; used by tests and by callers that want to
/// inspect what a run reported.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    fn push(&self, level: Level, message: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Entry { level, message });
        }
    }
}

impl Reporter for MemoryReporter {
    fn info(&self, msg: &str) {
        self.push(Level::Info, msg.to_string());
    }

    fn error(&self, msg: &str, cause: &dyn StdError) {
        self.push(Level::Error, format!("{}: {}", msg, cause));
    }

    fn debug(&self, msg: &str) {
        self.push(Level::Debug, msg.to_string());
    }
}
