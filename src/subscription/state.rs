//! Subscriptions that keep the latest payload readable.

use crate::event::Payload;
use crate::subscription::{SubscriptionGuard, SubscriptionHandle};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// The latest payload published under one event.
///
/// Created by [`crate::EventBus::subscribe_state`]. Holds `None` until the
/// first publish (or a cache replay) arrives. Dropping it unsubscribes.
pub struct StateSubscription<T: Payload> {
    latest: Arc<RwLock<Option<T>>>,
    guard: SubscriptionGuard,
}

impl<T: Payload> StateSubscription<T> {
    pub(crate) fn new(latest: Arc<RwLock<Option<T>>>, handle: SubscriptionHandle) -> Self {
        Self {
            latest,
            guard: handle.into_guard(),
        }
    }

    /// Copy of the latest payload
    pub fn latest(&self) -> Option<T> {
        self.latest.read().clone()
    }

    /// Whether any payload has arrived yet
    pub fn has_value(&self) -> bool {
        self.latest.read().is_some()
    }

    /// Run `f` on the latest payload without cloning it
    pub fn with_latest<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.latest.read().as_ref())
    }

    /// The underlying subscription
    pub fn handle(&self) -> &SubscriptionHandle {
        self.guard.handle()
    }
}

impl<T: Payload + fmt::Debug> fmt::Debug for StateSubscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSubscription")
            .field("latest", &*self.latest.read())
            .field("handle", self.guard.handle())
            .finish()
    }
}
