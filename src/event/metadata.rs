//! Event metadata for tracking and correlation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Metadata attached to every published payload.
///
/// The timestamp is taken from the bus clock at publish time, so it agrees
/// with the replay cache's notion of "now".
#[derive(Debug, Clone)]
pub struct EventMetadata {
    /// Unique identifier for this publish
    pub event_id: Uuid,

    /// Timestamp when the event was published
    pub timestamp: DateTime<Utc>,

    /// Correlation ID for tracing related events
    pub correlation_id: Option<Uuid>,

    /// Source that generated this event
    pub source: Option<String>,

    /// Custom metadata as key-value pairs
    pub custom: HashMap<String, String>,
}

impl EventMetadata {
    /// Create new metadata with a fresh event ID and the current time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create new metadata with a fresh event ID stamped at `timestamp`
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp,
            correlation_id: None,
            source: None,
            custom: HashMap::new(),
        }
    }

    /// Set the correlation ID
    pub fn set_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Set the event source
    pub fn set_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Add custom metadata
    pub fn add_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Get custom metadata value
    pub fn get_custom(&self, key: &str) -> Option<&String> {
        self.custom.get(key)
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for EventMetadata
#[derive(Debug, Default)]
pub struct MetadataBuilder {
    metadata: EventMetadata,
}

impl MetadataBuilder {
    /// Create a new metadata builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set correlation ID
    pub fn correlation_id(mut self, id: Uuid) -> Self {
        self.metadata.correlation_id = Some(id);
        self
    }

    /// Set source
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    /// Add custom metadata
    pub fn custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.custom.insert(key.into(), value.into());
        self
    }

    /// Build the metadata
    pub fn build(self) -> EventMetadata {
        self.metadata
    }
}
