//! Event registry for mapping event names to subscribers.
//!
//! The registry owns the subscriber lists and the name → payload type
//! bindings. Lists keep insertion order; dispatch order is computed from a
//! snapshot at publish time.

use crate::event::PayloadType;
use crate::subscription::EventHandler;
use crate::Result;
use std::fmt::{self, Debug};
use std::sync::Arc;
use uuid::Uuid;

mod dashmap;
pub use self::dashmap::DashMapRegistry;

/// Identity of a registered handler object, used for unsubscribing by reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerKey(usize);

impl HandlerKey {
    /// Identity of the object behind `handler`
    pub fn of<H: ?Sized>(handler: &Arc<H>) -> Self {
        Self(Arc::as_ptr(handler) as *const () as usize)
    }
}

/// A subscription entry in the registry
#[derive(Clone)]
pub struct SubscriberEntry {
    /// Unique ID for this subscription
    pub id: Uuid,

    /// Dispatch priority; higher runs first
    pub priority: i32,

    /// Identity of the caller-supplied handler object
    pub key: HandlerKey,

    /// The handler to invoke
    pub handler: Arc<dyn EventHandler>,
}

impl SubscriberEntry {
    /// Create an entry whose identity is the handler itself
    pub fn new(handler: Arc<dyn EventHandler>, priority: i32) -> Self {
        let key = HandlerKey::of(&handler);
        Self::with_key(handler, priority, key)
    }

    /// Create an entry with an explicit identity
    pub fn with_key(handler: Arc<dyn EventHandler>, priority: i32, key: HandlerKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            priority,
            key,
            handler,
        }
    }

    /// Name of the handler, for logs
    pub fn name(&self) -> &str {
        self.handler.name()
    }
}

impl Debug for SubscriberEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// Order a snapshot for dispatch: priority descending, registration order on ties.
pub fn dispatch_order(mut subscribers: Vec<SubscriberEntry>) -> Vec<SubscriberEntry> {
    // sort_by is stable
    subscribers.sort_by(|a, b| b.priority.cmp(&a.priority));
    subscribers
}

/// Trait for registries that map event names to subscribers.
///
/// Implementations must be thread-safe and must never call into handlers.
pub trait EventRegistry: Send + Sync + Debug {
    /// Bind `event` to a payload type, or check it against the existing binding
    fn bind(&self, event: &str, payload_type: PayloadType) -> Result<()>;

    /// Payload type `event` is bound to, if any
    fn binding(&self, event: &str) -> Option<PayloadType>;

    /// Append a subscription to the list for `event`
    fn register(&self, event: &str, entry: SubscriberEntry) -> Result<()>;

    /// Remove a subscription; returns whether anything was removed
    fn unregister(&self, subscription_id: Uuid) -> bool;

    /// Remove every subscription to `event` registered with handler `key`;
    /// returns how many were removed
    fn unregister_key(&self, event: &str, key: HandlerKey) -> usize;

    /// Copy of the subscriber list for `event`, in registration order
    fn snapshot(&self, event: &str) -> Vec<SubscriberEntry>;

    /// Whether a subscription is currently registered
    fn contains(&self, subscription_id: Uuid) -> bool;

    /// Get number of subscriptions for `event`
    fn subscription_count(&self, event: &str) -> usize;

    /// Get total number of subscriptions across all events
    fn total_subscriptions(&self) -> usize;

    /// Get all event names with at least one subscriber
    fn event_names(&self) -> Vec<String>;

    /// Remove all subscriptions, keeping payload bindings
    fn clear(&self);
}
