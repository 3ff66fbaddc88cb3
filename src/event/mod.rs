//! Core event system traits and types.
//!
//! Events are named channels. Every event name is bound to exactly one payload
//! type the first time it is used; the [`Event`] trait gives that binding a
//! compile-time form for payload types that always travel on the same channel.

use std::any::{Any, TypeId};
use std::fmt::{self, Debug};

pub mod envelope;
pub mod metadata;

pub use envelope::EventEnvelope;
pub use metadata::{EventMetadata, MetadataBuilder};

/// Marker trait for values that can travel through the bus.
///
/// Implemented for every `Any + Send + Sync + Clone` type.
pub trait Payload: Any + Send + Sync + Clone {}

impl<T: Any + Send + Sync + Clone> Payload for T {}

/// Runtime description of a payload type.
#[derive(Clone, Copy)]
pub struct PayloadType {
    id: TypeId,
    name: &'static str,
}

impl PayloadType {
    /// Describe the payload type `T`
    pub fn of<T: Payload>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` of the payload
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Human-readable type name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for PayloadType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PayloadType {}

impl Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Trait for payload types that always travel under one event name.
///
/// # Example
///
/// ```rust
/// use event_hub::Event;
///
/// #[derive(Debug, Clone)]
/// struct UserRegistered {
///     user_id: u64,
///     email: String,
/// }
///
/// impl Event for UserRegistered {
///     fn event_type() -> &'static str {
///         "user:registered"
///     }
/// }
/// ```
pub trait Event: Payload + Debug {
    /// Returns the event name this type is published under.
    ///
    /// It should be a stable, unique, non-empty identifier.
    fn event_type() -> &'static str
    where
        Self: Sized;

    /// Get the payload type descriptor for this event.
    fn payload_type() -> PayloadType
    where
        Self: Sized,
    {
        PayloadType::of::<Self>()
    }
}

/// A marker trait for events that can be serialized.
///
/// This is useful for events that need to cross a process boundary outside
/// of the bus (the bus itself never serializes).
pub trait SerializableEvent: Event + serde::Serialize + serde::de::DeserializeOwned {
    /// Serialize this event to JSON
    fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| crate::Error::SerializationError(e.to_string()))
    }

    /// Deserialize an event from JSON
    fn from_json(json: &str) -> crate::Result<Self>
    where
        Self: Sized,
    {
        serde_json::from_str(json).map_err(|e| crate::Error::SerializationError(e.to_string()))
    }
}

impl<T> SerializableEvent for T where T: Event + serde::Serialize + serde::de::DeserializeOwned {}
