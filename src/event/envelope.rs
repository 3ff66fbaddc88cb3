//! Event envelope for type-erased payload storage and transmission.

use crate::event::{EventMetadata, Payload, PayloadType};
use crate::{Error, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A type-erased payload travelling under an event name.
///
/// The envelope is what middleware transforms, what the replay cache stores
/// and what handlers receive. Cloning is cheap: the payload is shared.
#[derive(Clone)]
pub struct EventEnvelope {
    /// The type-erased payload
    payload: Arc<dyn Any + Send + Sync>,

    /// Type of the payload
    payload_type: PayloadType,

    /// Event name
    event: Arc<str>,

    /// Event metadata
    pub metadata: EventMetadata,
}

impl EventEnvelope {
    /// Create a new envelope with fresh metadata
    pub fn new<T: Payload>(event: impl Into<Arc<str>>, payload: T) -> Self {
        Self::with_metadata(event, payload, EventMetadata::new())
    }

    /// Create a new envelope with custom metadata
    pub fn with_metadata<T: Payload>(
        event: impl Into<Arc<str>>,
        payload: T,
        metadata: EventMetadata,
    ) -> Self {
        Self {
            payload: Arc::new(payload),
            payload_type: PayloadType::of::<T>(),
            event: event.into(),
            metadata,
        }
    }

    /// Get the event name
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Get the payload type descriptor
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    /// Get the event ID
    pub fn event_id(&self) -> uuid::Uuid {
        self.metadata.event_id
    }

    /// Check if this envelope carries a payload of type `T`
    pub fn is<T: Payload>(&self) -> bool {
        self.payload_type == PayloadType::of::<T>()
    }

    /// Try to borrow the payload as a specific type
    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Borrow the payload as `T`, failing with a type mismatch otherwise
    pub fn payload<T: Payload>(&self) -> Result<&T> {
        self.downcast_ref::<T>()
            .ok_or_else(|| self.mismatch(PayloadType::of::<T>()))
    }

    /// Take the payload out as `T`.
    ///
    /// The value is moved out when this envelope holds the only reference,
    /// otherwise it is cloned.
    pub fn into_payload<T: Payload>(self) -> Result<T> {
        if !self.is::<T>() {
            return Err(self.mismatch(PayloadType::of::<T>()));
        }
        let event = self.event.clone();
        let found = self.payload_type.name();
        match Arc::downcast::<T>(self.payload) {
            Ok(payload) => Ok(Arc::try_unwrap(payload).unwrap_or_else(|shared| (*shared).clone())),
            Err(_) => Err(Error::PayloadTypeMismatch {
                event: event.to_string(),
                expected: std::any::type_name::<T>(),
                found,
            }),
        }
    }

    /// Replace the payload, keeping the event name and metadata.
    ///
    /// The new payload may be of a different type.
    pub fn replace<U: Payload>(self, payload: U) -> Self {
        Self {
            payload: Arc::new(payload),
            payload_type: PayloadType::of::<U>(),
            event: self.event,
            metadata: self.metadata,
        }
    }

    /// Transform the payload from `T` to `U`, keeping the event name and metadata
    pub fn map<T, U, F>(self, f: F) -> Result<Self>
    where
        T: Payload,
        U: Payload,
        F: FnOnce(T) -> U,
    {
        let metadata = self.metadata.clone();
        let event = self.event.clone();
        let payload = self.into_payload::<T>()?;
        Ok(Self::with_metadata(event, f(payload), metadata))
    }

    fn mismatch(&self, expected: PayloadType) -> Error {
        Error::PayloadTypeMismatch {
            event: self.event.to_string(),
            expected: expected.name(),
            found: self.payload_type.name(),
        }
    }
}

impl fmt::Debug for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("event", &self.event)
            .field("payload_type", &self.payload_type)
            .field("event_id", &self.metadata.event_id)
            .finish()
    }
}
