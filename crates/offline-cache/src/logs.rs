//! Captured log ring buffer
//!
//! [`LogCaptureLayer`] is a `tracing_subscriber` layer that copies every event
//! it sees into a shared [`LogBuffer`]. The buffer keeps the most recent
//! entries up to a fixed capacity and silently drops the oldest on overflow.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

pub const LOG_CAPACITY: usize = 1000;
pub const DEFAULT_LOG_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

/// Bounded, shareable log store
#[derive(Clone)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The last `limit` entries, oldest first
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A layer feeding this buffer
    pub fn layer(&self) -> LogCaptureLayer {
        LogCaptureLayer {
            buffer: self.clone(),
        }
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LogCaptureLayer {
    buffer: LogBuffer,
}

impl<S: Subscriber> Layer<S> for LogCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogEntry {
            timestamp: Utc::now(),
            level: event.metadata().level().to_string(),
            message: visitor.finish(),
        });
    }
}

/// Renders `message` followed by `key=value` for the remaining fields
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={:?}", field.name(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: "INFO".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_recent_returns_last_n_in_order() {
        let buffer = LogBuffer::new();
        for i in 0..5 {
            buffer.push(entry(&format!("line {}", i)));
        }

        let recent = buffer.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "line 3");
        assert_eq!(recent[1].message, "line 4");
        assert_eq!(buffer.recent(DEFAULT_LOG_LIMIT).len(), 5);
    }

    #[test]
    fn test_oldest_entries_dropped_on_overflow() {
        let buffer = LogBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(entry(&format!("line {}", i)));
        }

        assert_eq!(buffer.len(), 3);
        let all = buffer.recent(10);
        assert_eq!(all.first().unwrap().message, "line 2");
        assert_eq!(all.last().unwrap().message, "line 4");
    }

    #[test]
    fn test_default_capacity() {
        let buffer = LogBuffer::new();
        for i in 0..(LOG_CAPACITY + 10) {
            buffer.push(entry(&i.to_string()));
        }
        assert_eq!(buffer.len(), LOG_CAPACITY);
        assert_eq!(buffer.recent(1)[0].message, (LOG_CAPACITY + 9).to_string());
    }

    #[test]
    fn test_clear() {
        let buffer = LogBuffer::new();
        buffer.push(entry("x"));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.recent(DEFAULT_LOG_LIMIT).is_empty());
    }

    #[test]
    fn test_layer_captures_events() {
        let buffer = LogBuffer::new();
        let subscriber = tracing_subscriber::registry().with(buffer.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("plain message");
            tracing::warn!(namespace = "v1", deleted = 2, "Cleanup done");
        });

        let logs = buffer.recent(DEFAULT_LOG_LIMIT);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].level, "INFO");
        assert_eq!(logs[0].message, "plain message");
        assert_eq!(logs[1].level, "WARN");
        assert_eq!(logs[1].message, "Cleanup done namespace=\"v1\" deleted=2");
    }
}
