//! Log sinks for reporting bus activity and contained failures.
//!
//! The bus never writes diagnostics for caller-visible conditions directly;
//! it hands a [`LogRecord`] to the configured [`LogSink`]. [`TracingSink`]
//! is the default and forwards to `tracing` with structured fields.

use crate::Error;
use parking_lot::Mutex;
use std::fmt;
use uuid::Uuid;

/// One log entry produced by the bus.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    /// Human-readable message
    pub message: &'a str,

    /// Event the entry relates to, if any
    pub event: Option<&'a str>,

    /// Subscription the entry relates to, if any
    pub subscription_id: Option<Uuid>,

    /// Underlying error, if any
    pub error: Option<&'a Error>,
}

impl<'a> LogRecord<'a> {
    /// Create a record with just a message
    pub fn new(message: &'a str) -> Self {
        Self {
            message,
            event: None,
            subscription_id: None,
            error: None,
        }
    }

    /// Attach the event name
    pub fn event(mut self, event: &'a str) -> Self {
        self.event = Some(event);
        self
    }

    /// Attach the subscription ID
    pub fn subscription(mut self, id: Uuid) -> Self {
        self.subscription_id = Some(id);
        self
    }

    /// Attach the underlying error
    pub fn error(mut self, error: &'a Error) -> Self {
        self.error = Some(error);
        self
    }
}

impl fmt::Display for LogRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)?;
        if let Some(error) = self.error {
            write!(f, ": {}", error)?;
        }
        Ok(())
    }
}

/// Severity-leveled logging capability consumed by the bus.
pub trait LogSink: Send + Sync + 'static {
    /// Report a failure
    fn error(&self, record: &LogRecord<'_>);

    /// Report a suspicious or destructive condition
    fn warn(&self, record: &LogRecord<'_>);

    /// Report a state change
    fn info(&self, record: &LogRecord<'_>);

    /// Report routine activity
    fn debug(&self, record: &LogRecord<'_>);
}

/// Forwards records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

macro_rules! forward {
    ($level:ident, $record:expr) => {{
        let record = $record;
        let event = record.event.unwrap_or_default();
        let subscription_id = record.subscription_id.map(|id| id.to_string()).unwrap_or_default();
        match record.error {
            Some(error) => tracing::$level!(
                target: "event_hub",
                event,
                subscription_id = %subscription_id,
                error = %error,
                "{}",
                record.message
            ),
            None => tracing::$level!(
                target: "event_hub",
                event,
                subscription_id = %subscription_id,
                "{}",
                record.message
            ),
        }
    }};
}

impl LogSink for TracingSink {
    fn error(&self, record: &LogRecord<'_>) {
        forward!(error, record)
    }

    fn warn(&self, record: &LogRecord<'_>) {
        forward!(warn, record)
    }

    fn info(&self, record: &LogRecord<'_>) {
        forward!(info, record)
    }

    fn debug(&self, record: &LogRecord<'_>) {
        forward!(debug, record)
    }
}

/// Severity of a recorded entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Routine activity
    Debug,
    /// State change
    Info,
    /// Suspicious or destructive condition
    Warn,
    /// Failure
    Error,
}

/// An owned copy of a [`LogRecord`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Severity
    pub level: Level,
    /// Message
    pub message: String,
    /// Event name
    pub event: Option<String>,
    /// Subscription ID
    pub subscription_id: Option<Uuid>,
    /// Underlying error
    pub error: Option<Error>,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries recorded so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Entries recorded at `level`
    pub fn at_level(&self, level: Level) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.level == level)
            .cloned()
            .collect()
    }

    /// Number of error entries
    pub fn error_count(&self) -> usize {
        self.at_level(Level::Error).len()
    }

    /// Forget all entries
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn push(&self, level: Level, record: &LogRecord<'_>) {
        self.entries.lock().push(LogEntry {
            level,
            message: record.message.to_string(),
            event: record.event.map(str::to_string),
            subscription_id: record.subscription_id,
            error: record.error.cloned(),
        });
    }
}

impl LogSink for MemorySink {
    fn error(&self, record: &LogRecord<'_>) {
        self.push(Level::Error, record);
    }

    fn warn(&self, record: &LogRecord<'_>) {
        self.push(Level::Warn, record);
    }

    fn info(&self, record: &LogRecord<'_>) {
        self.push(Level::Info, record);
    }

    fn debug(&self, record: &LogRecord<'_>) {
        self.push(Level::Debug, record);
    }
}
