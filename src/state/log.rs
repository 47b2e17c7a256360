//! Append-only session log.
//!
//! This is the user-visible record of what happened in the session. Every
//! entry is mirrored to `tracing` as well.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// Kind of log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    System,
    Move,
    Engine,
    Phase,
    Error,
    GameOver,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Move => "move",
            Self::Engine => "engine",
            Self::Phase => "phase",
            Self::Error => "error",
            Self::GameOver => "game_over",
        }
    }
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
    pub actor: Option<String>,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            actor: None,
            at: chrono::Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Shared handle to the session log. Clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: LogEntry) {
        match entry.kind {
            LogKind::Error => tracing::warn!(kind = entry.kind.as_str(), "{}", entry.message),
            _ => tracing::debug!(kind = entry.kind.as_str(), "{}", entry.message),
        }
        self.entries.lock().push(entry);
    }

    /// Shorthand for `push(LogEntry::new(kind, message))`.
    pub fn record(&self, kind: LogKind, message: impl Into<String>) {
        self.push(LogEntry::new(kind, message));
    }

    /// Copy of all entries in order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Check if any entry's message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|e| e.message.contains(needle))
    }
}
