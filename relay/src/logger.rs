//! Leveled logging for relay diagnostics.
//!
//! The relay reports protocol violations, callback panics and dispatch
//! failures through a [`Logger`] chosen by the embedding application:
//!
//! - [`TracingLogger`] forwards to `tracing` (target `agent_relay`)
//! - [`MemoryLogger`] keeps a bounded in-memory history that a UI can display
//!   or a test can inspect
//!
//! # Example
//!
//! ```
//! use agent_relay::logger::{LogLevel, Logger, MemoryLogger};
//!
//! let logger = MemoryLogger::new(100).with_level(LogLevel::Info);
//! logger.debug("dropped");
//! logger.warn("kept");
//! assert_eq!(logger.entries().len(), 1);
//! ```

use agent_relay_core::environment::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Severity of a log entry, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics
    Debug,
    /// Normal operation
    #[default]
    Info,
    /// Something unexpected that the relay recovered from
    Warn,
    /// A failure visible to the user
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Error parsing a [`LogLevel`] from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid log level: {0} (expected debug, info, warn or error)")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

/// A recorded log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was logged
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Human-readable message
    pub message: String,
}

impl LogEntry {
    /// Format as a single line: `<timestamp> <LEVEL> <message>`
    #[must_use]
    pub fn format_line(&self) -> String {
        format!(
            "{} {} {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.level,
            self.message
        )
    }
}

/// Sink for relay diagnostics.
///
/// Must be `Send + Sync`: the relay logs from inside its store, which may run
/// on any runtime worker.
pub trait Logger: Send + Sync {
    /// Record `message` at `level`
    fn log(&self, level: LogLevel, message: &str);

    /// Record at [`LogLevel::Debug`]
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Record at [`LogLevel::Info`]
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Record at [`LogLevel::Warn`]
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Record at [`LogLevel::Error`]
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Forwards every entry to `tracing` under the `agent_relay` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "agent_relay", "{message}"),
            LogLevel::Info => tracing::info!(target: "agent_relay", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "agent_relay", "{message}"),
            LogLevel::Error => tracing::error!(target: "agent_relay", "{message}"),
        }
    }
}

struct MemoryLog {
    entries: VecDeque<LogEntry>,
    min_level: LogLevel,
}

/// Bounded in-memory history of log entries.
///
/// Entries below the minimum level are discarded on arrival. Once `capacity`
/// entries are held, the oldest is dropped for each new one.
pub struct MemoryLogger {
    log: Mutex<MemoryLog>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl MemoryLogger {
    /// Create a logger keeping at most `capacity` entries at level `Debug` and above
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            log: Mutex::new(MemoryLog {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                min_level: LogLevel::Debug,
            }),
            capacity,
            clock: Arc::new(SystemClock),
        }
    }

    /// Builder: Set the minimum level
    #[must_use]
    pub fn with_level(self, level: LogLevel) -> Self {
        self.set_level(level);
        self
    }

    /// Builder: Timestamp entries with `clock`
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Change the minimum level for subsequent entries
    pub fn set_level(&self, level: LogLevel) {
        self.lock().min_level = level;
    }

    /// Current minimum level
    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.lock().min_level
    }

    /// All retained entries, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Retained entries at `level` or more severe
    #[must_use]
    pub fn entries_at_least(&self, level: LogLevel) -> Vec<LogEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.level >= level)
            .cloned()
            .collect()
    }

    /// Number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no entries are retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Drop all retained entries
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLog> {
        // A panic while holding the lock cannot leave the log half-written
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new(500)
    }
}

impl fmt::Debug for MemoryLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLogger")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: LogLevel, message: &str) {
        if self.capacity == 0 {
            return;
        }
        let timestamp = self.clock.now();
        let mut log = self.lock();
        if level < log.min_level {
            return;
        }
        while log.entries.len() >= self.capacity {
            log.entries.pop_front();
        }
        log.entries.push_back(LogEntry {
            timestamp,
            level,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use agent_relay_testing::test_clock;

    #[test]
    fn test_levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" error ".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_memory_logger_filters_by_level() {
        let logger = MemoryLogger::new(10).with_level(LogLevel::Warn);
        logger.debug("a");
        logger.info("b");
        logger.warn("c");
        logger.error("d");

        let messages: Vec<_> = logger.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["c", "d"]);

        logger.set_level(LogLevel::Debug);
        logger.debug("e");
        assert_eq!(logger.len(), 3);
    }

    #[test]
    fn test_memory_logger_is_bounded() {
        let logger = MemoryLogger::new(3);
        for i in 0..5 {
            logger.info(&format!("entry {i}"));
        }

        let messages: Vec<_> = logger.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn test_entries_at_least_and_clear() {
        let logger = MemoryLogger::default();
        logger.info("fine");
        logger.warn("odd");
        logger.error("bad");

        assert_eq!(logger.entries_at_least(LogLevel::Warn).len(), 2);
        logger.clear();
        assert!(logger.is_empty());
    }

    #[test]
    fn test_format_line_uses_clock() {
        let logger = MemoryLogger::new(1).with_clock(Arc::new(test_clock()));
        logger.error("boom");
        assert_eq!(
            logger.entries()[0].format_line(),
            "2025-01-01T00:00:00.000Z ERROR boom"
        );
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let logger = MemoryLogger::new(0);
        logger.error("ignored");
        assert!(logger.is_empty());
    }
}
