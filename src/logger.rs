//! Injectable logging sink used by the circuit breaker and the retry driver
//!
//! Components never log through global state. They receive an optional
//! [`SharedLogger`] at construction; `None` disables logging entirely.
use crate::context::Context;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Key/value pair attached to a log message
pub type Field<'a> = (&'static str, &'a dyn fmt::Debug);

pub type SharedLogger = Arc<dyn Logger>;

pub trait Logger: Send + Sync {
    fn debug(&self, ctx: &Context, message: &str, fields: &[Field<'_>]);
    fn info(&self, ctx: &Context, message: &str, fields: &[Field<'_>]);
    fn warn(&self, ctx: &Context, message: &str, fields: &[Field<'_>]);
    fn error(&self, ctx: &Context, message: &str, fields: &[Field<'_>]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Renders fields as `key=value` pairs separated by spaces
struct Rendered<'a, 'b>(&'a [Field<'b>]);

impl fmt::Display for Rendered<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={:?}", key, value)?;
        }
        Ok(())
    }
}

/// Forwards every call to a `tracing` event of the matching level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> SharedLogger {
        Arc::new(Self)
    }
}

impl Logger for TracingLogger {
    fn debug(&self, ctx: &Context, message: &str, fields: &[Field<'_>]) {
        tracing::debug!(fields = %Rendered(fields), context_done = ctx.is_done(), "{}", message);
    }

    fn info(&self, ctx: &Context, message: &str, fields: &[Field<'_>]) {
        tracing::info!(fields = %Rendered(fields), context_done = ctx.is_done(), "{}", message);
    }

    fn warn(&self, ctx: &Context, message: &str, fields: &[Field<'_>]) {
        tracing::warn!(fields = %Rendered(fields), context_done = ctx.is_done(), "{}", message);
    }

    fn error(&self, ctx: &Context, message: &str, fields: &[Field<'_>]) {
        tracing::error!(fields = %Rendered(fields), context_done = ctx.is_done(), "{}", message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl LogRecord {
    /// Debug-formatted value of the first field named `key`
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps every record in memory, for assertions in tests and health endpoints
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn records_at(&self, level: Level) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.level == level)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    fn push(&self, level: Level, message: &str, fields: &[Field<'_>]) {
        let record = LogRecord {
            level,
            message: message.to_string(),
            fields: fields
                .iter()
                .map(|(key, value)| (*key, format!("{:?}", value)))
                .collect(),
        };
        self.records.lock().push(record);
    }
}

impl Logger for MemoryLogger {
    fn debug(&self, _ctx: &Context, message: &str, fields: &[Field<'_>]) {
        self.push(Level::Debug, message, fields);
    }

    fn info(&self, _ctx: &Context, message: &str, fields: &[Field<'_>]) {
        self.push(Level::Info, message, fields);
    }

    fn warn(&self, _ctx: &Context, message: &str, fields: &[Field<'_>]) {
        self.push(Level::Warn, message, fields);
    }

    fn error(&self, _ctx: &Context, message: &str, fields: &[Field<'_>]) {
        self.push(Level::Error, message, fields);
    }
}
