//! Subscription handles for managing subscription lifecycle.

use crate::registry::EventRegistry;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// A handle to a subscription.
///
/// Unsubscribing is idempotent: the first call removes the entry, later
/// calls (from this handle or any clone of it) do nothing. Dropping a handle
/// does not unsubscribe; use [`SubscriptionHandle::into_guard`] for that.
#[derive(Clone)]
pub struct SubscriptionHandle {
    /// Unique ID for this subscription
    id: Uuid,

    /// Event the subscription listens to
    event: Arc<str>,

    /// Registry holding the subscription; weak so handles never keep a bus alive
    registry: Weak<dyn EventRegistry>,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        id: Uuid,
        event: impl Into<Arc<str>>,
        registry: &Arc<dyn EventRegistry>,
    ) -> Self {
        Self {
            id,
            event: event.into(),
            registry: Arc::downgrade(registry),
        }
    }

    /// Get the subscription ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the event name
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove this subscription. Returns whether an entry was removed.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.unregister(self.id))
            .unwrap_or(false)
    }

    /// Check if this subscription is still registered
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.contains(self.id))
            .unwrap_or(false)
    }

    /// Turn this handle into a guard that unsubscribes when dropped
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard {
            handle: self,
            armed: true,
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("event", &self.event)
            .finish()
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscription to \"{}\" ({})", self.event, self.id)
    }
}

/// Unsubscribes when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct SubscriptionGuard {
    handle: SubscriptionHandle,
    armed: bool,
}

impl SubscriptionGuard {
    /// The guarded handle
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Keep the subscription alive past this guard
    pub fn disarm(mut self) -> SubscriptionHandle {
        self.armed = false;
        self.handle.clone()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if self.armed {
            self.handle.unsubscribe();
        }
    }
}
