//! # event-hub
//!
//! An in-process publish/subscribe event bus with middleware, priorities and
//! a replay cache for late subscribers.
//!
//! ## Features
//!
//! - **Named events** bound to one payload type each, checked at runtime
//! - **Priority dispatch**: higher priorities first, registration order on ties
//! - **Middleware**: global then per-event transforms, in registration order
//! - **Replay cache**: late subscribers receive the last payload within its TTL
//! - **Failure isolation**: a failing subscriber never affects the others
//!
//! ## Quick Example
//!
//! ```rust
//! use event_hub::{Event, EventBus};
//!
//! #[derive(Debug, Clone)]
//! struct UserRegistered {
//!     user_id: u64,
//!     email: String,
//! }
//!
//! impl Event for UserRegistered {
//!     fn event_type() -> &'static str {
//!         "UserRegistered"
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create event bus
//!     let bus = EventBus::builder().build()?;
//!
//!     // Subscribe to events
//!     let handle = bus.subscribe_event(|event: &UserRegistered| {
//!         println!("New user registered: {}", event.email);
//!     })?;
//!
//!     // Publish events
//!     bus.publish_event(UserRegistered {
//!         user_id: 123,
//!         email: "user@example.com".to_string(),
//!     })?;
//!
//!     // Unsubscribe when done
//!     handle.unsubscribe();
//!
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    unreachable_pub
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Core event system traits and types
pub mod event;

/// Error types and result aliases
pub mod error;

/// Event registry for name-to-subscriber mapping
pub mod registry;

/// Subscription handles and handler traits
pub mod subscription;

/// Payload transforms run before delivery
pub mod middleware;

/// Last-payload-per-event replay cache
pub mod cache;

/// Event dispatcher for invoking subscribers
pub mod dispatcher;

/// Time sources
pub mod clock;

/// Log sinks
pub mod log;

/// The main event bus implementation
pub mod bus;

/// Optional process-wide bus
pub mod global;

// Re-export commonly used types
pub use bus::{EventBus, EventBusBuilder, EventBusConfig, EventBusStats, PublishReport};
pub use error::{Error, Result};
pub use event::{Event, EventEnvelope, EventMetadata, Payload, PayloadType};
pub use log::{LogRecord, LogSink, MemorySink, TracingSink};
pub use middleware::{Middleware, TypedMiddleware};
pub use subscription::{
    EventHandler, StateSubscription, SubscriptionGuard, SubscriptionHandle, TypedHandler,
};

/// Prelude module for convenient imports
///
/// # Example
/// ```rust
/// use event_hub::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bus::{EventBus, EventBusBuilder, EventBusConfig, PublishReport};
    pub use crate::error::{Error, Result};
    pub use crate::event::{Event, EventEnvelope, Payload};
    pub use crate::middleware::Middleware;
    pub use crate::subscription::{SubscriptionGuard, SubscriptionHandle, TypedHandler};
}
