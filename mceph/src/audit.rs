//! Reconciliation audit events.
//!
//! Wraps a host-supplied event sink with domain-specific convenience
//! methods, so every mutation the reconcilers perform produces a uniform
//! human-readable event.

use std::sync::{Arc, Mutex};

use tracing::{error, info};

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Audit,
    Error,
}

/// Sink the host runtime supplies to receive reconciliation events.
pub trait EventSink: Send + Sync {
    fn emit(&self, level: Level, message: String, related: Vec<String>);
}

/// Forwards events to the process-wide tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, level: Level, message: String, related: Vec<String>) {
        match level {
            Level::Error => error!(related = ?related, "{}", message),
            _ => info!(related = ?related, "{}", message),
        }
    }
}

/// Drops every event.
#[derive(Debug, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _level: Level, _message: String, _related: Vec<String>) {}
}

/// Records events in memory (for testing).
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    /// Messages recorded so far, in order.
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, level: Level, message: String, _related: Vec<String>) {
        self.events.lock().unwrap().push((level, message));
    }
}

/// Audit log with reconciliation-specific methods.
pub struct AuditLog {
    sink: Arc<dyn EventSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Audit log feeding the tracing subscriber.
    pub fn new_tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// Audit log that drops everything (for testing).
    pub fn new_noop() -> Self {
        Self::new(Arc::new(NoopSink))
    }

    fn log(&self, level: Level, message: String, related: Vec<String>) {
        self.sink.emit(level, message, related);
    }

    // === Pool events ===

    pub fn pool_created(&self, name: &str) {
        self.log(
            Level::Audit,
            format!("Pool '{}' created", name),
            vec![name.to_string()],
        );
    }

    pub fn pool_updated(&self, name: &str) {
        self.log(
            Level::Audit,
            format!("Pool '{}' updated", name),
            vec![name.to_string()],
        );
    }

    pub fn pool_deleted(&self, name: &str) {
        self.log(
            Level::Audit,
            format!("Pool '{}' deleted", name),
            vec![name.to_string()],
        );
    }

    // === Auth entity events ===

    pub fn entity_created(&self, name: &str) {
        self.log(
            Level::Audit,
            format!("Auth entity '{}' created", name),
            vec![name.to_string()],
        );
    }

    pub fn entity_updated(&self, name: &str) {
        self.log(
            Level::Audit,
            format!("Auth entity '{}' capabilities replaced", name),
            vec![name.to_string()],
        );
    }

    pub fn entity_deleted(&self, name: &str) {
        self.log(
            Level::Audit,
            format!("Auth entity '{}' deleted", name),
            vec![name.to_string()],
        );
    }

    // === Block image events ===

    pub fn image_created(&self, path: &str, size: &str) {
        self.log(
            Level::Audit,
            format!("Block image '{}' created ({})", path, size),
            vec![path.to_string()],
        );
    }

    pub fn image_resized(&self, path: &str, size: &str) {
        self.log(
            Level::Audit,
            format!("Block image '{}' resized to {}", path, size),
            vec![path.to_string()],
        );
    }

    pub fn image_deleted(&self, path: &str) {
        self.log(
            Level::Audit,
            format!("Block image '{}' deleted", path),
            vec![path.to_string()],
        );
    }
}
