//! Replay cache: the last payload published per event, with a time-to-live.
//!
//! Entries are never evicted by a timer. Validity is checked when an entry
//! is read, and expired entries are dropped at that point.

use crate::clock::Clock;
use crate::event::EventEnvelope;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A cached payload and the time it was stored
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Post-middleware envelope
    pub envelope: EventEnvelope,

    /// When the entry was written
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry is still valid at `now` for the given TTL
    pub fn is_valid_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.stored_at) <= ttl
    }
}

struct CacheState {
    enabled: bool,
    entries: HashMap<String, CacheEntry>,
}

/// Last-payload-per-event store.
///
/// The enabled flag and the entries sit behind one lock, so disabling (which
/// clears) can never interleave with a store.
pub struct ReplayCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ReplayCache {
    /// Create a cache
    pub fn new(enabled: bool, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                enabled,
                entries: HashMap::new(),
            }),
            ttl,
            clock,
        }
    }

    /// The configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether publishes are currently cached
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Start caching subsequent publishes
    pub fn enable(&self) {
        self.state.lock().enabled = true;
    }

    /// Stop caching and drop every entry. Returns how many entries were dropped.
    pub fn disable(&self) -> usize {
        let mut state = self.state.lock();
        state.enabled = false;
        let dropped = state.entries.len();
        state.entries.clear();
        dropped
    }

    /// Store `envelope` as the only entry for `event`.
    ///
    /// Returns whether the entry was written (false while disabled).
    pub fn store(&self, event: &str, envelope: EventEnvelope) -> bool {
        let mut state = self.state.lock();
        if !state.enabled {
            return false;
        }
        let entry = CacheEntry {
            envelope,
            stored_at: self.clock.now(),
        };
        state.entries.insert(event.to_string(), entry);
        true
    }

    /// The valid entry for `event`, if any
    pub fn replay_entry(&self, event: &str) -> Option<EventEnvelope> {
        let mut state = self.state.lock();
        if !state.enabled {
            return None;
        }
        let now = self.clock.now();
        match state.entries.get(event) {
            Some(entry) if entry.is_valid_at(now, self.ttl) => Some(entry.envelope.clone()),
            Some(_) => {
                state.entries.remove(event);
                None
            }
            None => None,
        }
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_valid_at(now, ttl));
        before - state.entries.len()
    }

    /// Drop every entry without changing the enabled flag
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Number of entries, valid or not
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ReplayCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReplayCache")
            .field("enabled", &state.enabled)
            .field("entries", &state.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
