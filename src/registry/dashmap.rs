//! DashMap-based implementation of EventRegistry for concurrent access.

use super::{EventRegistry, HandlerKey, SubscriberEntry};
use crate::event::PayloadType;
use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// A thread-safe event registry implementation using DashMap.
///
/// Suited to many readers (publish snapshots) and fewer writers
/// (subscribe/unsubscribe).
#[derive(Debug, Clone)]
pub struct DashMapRegistry {
    /// Map from event name to its subscriber list
    subscriptions: Arc<DashMap<String, Vec<SubscriberEntry>>>,

    /// Map from subscription ID to event name for faster lookups
    subscription_to_event: Arc<DashMap<Uuid, String>>,

    /// Map from event name to its payload type
    bindings: Arc<DashMap<String, PayloadType>>,

    /// Optional cap on subscribers per event
    max_per_event: Option<usize>,
}

impl DashMapRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a registry with pre-allocated capacity for `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscriptions: Arc::new(DashMap::with_capacity(capacity)),
            subscription_to_event: Arc::new(DashMap::with_capacity(capacity * 4)),
            bindings: Arc::new(DashMap::with_capacity(capacity)),
            max_per_event: None,
        }
    }

    /// Limit the number of subscribers a single event may have
    pub fn with_max_subscribers_per_event(mut self, max: Option<usize>) -> Self {
        self.max_per_event = max;
        self
    }
}

impl Default for DashMapRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry for DashMapRegistry {
    fn bind(&self, event: &str, payload_type: PayloadType) -> Result<()> {
        match self.bindings.entry(event.to_string()) {
            Entry::Occupied(existing) if *existing.get() != payload_type => {
                Err(Error::PayloadTypeMismatch {
                    event: event.to_string(),
                    expected: existing.get().name(),
                    found: payload_type.name(),
                })
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                trace!(event, payload_type = payload_type.name(), "Binding event payload type");
                slot.insert(payload_type);
                Ok(())
            }
        }
    }

    fn binding(&self, event: &str) -> Option<PayloadType> {
        self.bindings.get(event).map(|binding| *binding)
    }

    fn register(&self, event: &str, entry: SubscriberEntry) -> Result<()> {
        trace!(
            subscription_id = %entry.id,
            event,
            priority = entry.priority,
            "Registering subscription"
        );

        let id = entry.id;
        let appended = {
            let mut subs = self.subscriptions.entry(event.to_string()).or_default();
            match self.max_per_event {
                Some(max) if subs.len() >= max => Err(Error::RegistrationFailure(format!(
                    "event \"{}\" already has the maximum of {} subscribers",
                    event, max
                ))),
                _ => subs
                    .try_reserve(1)
                    .map(|()| subs.push(entry))
                    .map_err(|e| Error::RegistrationFailure(e.to_string())),
            }
        };

        if let Err(e) = appended {
            self.subscriptions.remove_if(event, |_, subs| subs.is_empty());
            return Err(e);
        }

        self.subscription_to_event.insert(id, event.to_string());

        debug!(subscription_id = %id, event, "Subscription registered successfully");
        Ok(())
    }

    fn unregister(&self, subscription_id: Uuid) -> bool {
        trace!(subscription_id = %subscription_id, "Unregistering subscription");

        let Some((_, event)) = self.subscription_to_event.remove(&subscription_id) else {
            return false;
        };

        let removed = match self.subscriptions.get_mut(&event) {
            Some(mut subs) => {
                let before = subs.len();
                subs.retain(|s| s.id != subscription_id);
                before != subs.len()
            }
            None => false,
        };
        self.subscriptions.remove_if(&event, |_, subs| subs.is_empty());

        debug!(subscription_id = %subscription_id, event = %event, "Subscription unregistered");
        removed
    }

    fn unregister_key(&self, event: &str, key: HandlerKey) -> usize {
        let removed: Vec<Uuid> = match self.subscriptions.get_mut(event) {
            Some(mut subs) => {
                let ids = subs
                    .iter()
                    .filter(|s| s.key == key)
                    .map(|s| s.id)
                    .collect();
                subs.retain(|s| s.key != key);
                ids
            }
            None => Vec::new(),
        };
        self.subscriptions.remove_if(event, |_, subs| subs.is_empty());

        for id in &removed {
            self.subscription_to_event.remove(id);
        }

        if !removed.is_empty() {
            debug!(event, count = removed.len(), "Handler unregistered");
        }
        removed.len()
    }

    fn snapshot(&self, event: &str) -> Vec<SubscriberEntry> {
        self.subscriptions
            .get(event)
            .map(|subs| subs.clone())
            .unwrap_or_default()
    }

    fn contains(&self, subscription_id: Uuid) -> bool {
        self.subscription_to_event.contains_key(&subscription_id)
    }

    fn subscription_count(&self, event: &str) -> usize {
        self.subscriptions
            .get(event)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    fn total_subscriptions(&self) -> usize {
        self.subscription_to_event.len()
    }

    fn event_names(&self) -> Vec<String> {
        self.subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn clear(&self) {
        self.subscriptions.clear();
        self.subscription_to_event.clear();
    }
}
