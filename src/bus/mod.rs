//! The main EventBus implementation.
//!
//! The EventBus is the primary interface for publishing and subscribing to
//! events. It coordinates the registry, the middleware pipeline, the replay
//! cache and the dispatcher.

use crate::cache::ReplayCache;
use crate::clock::Clock;
use crate::dispatcher::{Dispatcher, DispatcherStats};
use crate::error::validate_event_name;
use crate::event::{Event, EventEnvelope, EventMetadata, Payload, PayloadType};
use crate::log::{LogRecord, LogSink};
use crate::middleware::{Middleware, MiddlewarePipeline, TypedMiddleware};
use crate::registry::{EventRegistry, HandlerKey, SubscriberEntry};
use crate::subscription::{
    EventHandler, FunctionHandler, StateSubscription, SubscriptionHandle, TypedHandler,
    TypedHandlerAdapter,
};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub mod builder;
pub mod config;

pub use builder::EventBusBuilder;
pub use config::EventBusConfig;

/// The main event bus for publishing and subscribing to events.
///
/// Cloning an `EventBus` is cheap and yields another handle to the same
/// bus, so it can be passed explicitly to every component that needs it.
///
/// # Example
///
/// ```rust
/// use event_hub::EventBus;
///
/// let bus = EventBus::builder().build()?;
///
/// let handle = bus.subscribe("greeting", |name: &String| {
///     println!("hello, {name}");
/// })?;
///
/// bus.publish("greeting", String::from("world"))?;
/// handle.unsubscribe();
/// # Ok::<(), event_hub::Error>(())
/// ```
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    config: EventBusConfig,
    registry: Arc<dyn EventRegistry>,
    middleware: MiddlewarePipeline,
    cache: ReplayCache,
    /// Orders cache writes and subscriber snapshots against subscribe's
    /// register and cache read; never held while a handler runs
    delivery: Mutex<()>,
    dispatcher: Dispatcher,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    events_published: AtomicU64,
    publishes_aborted: AtomicU64,
}

/// Outcome of one publish.
///
/// Middleware and subscriber failures never surface as `Err` from
/// [`EventBus::publish`]; they are logged and summarized here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// ID assigned to this publish
    pub event_id: Uuid,

    /// Subscribers that received the payload without failing
    pub delivered: usize,

    /// Subscribers that failed
    pub failed: usize,

    /// Whether middleware aborted the publish before dispatch
    pub aborted: bool,

    /// Whether the payload was written to the replay cache
    pub cached: bool,
}

impl PublishReport {
    fn aborted(event_id: Uuid) -> Self {
        Self {
            event_id,
            delivered: 0,
            failed: 0,
            aborted: true,
            cached: false,
        }
    }

    /// True when nothing failed and the publish was not aborted
    pub fn is_clean(&self) -> bool {
        !self.aborted && self.failed == 0
    }
}

impl EventBus {
    /// Create a new EventBus builder
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Create a bus with the default configuration
    pub fn new() -> Self {
        builder::assemble(EventBusBuilder::new())
    }

    pub(crate) fn from_parts(
        config: EventBusConfig,
        registry: Arc<dyn EventRegistry>,
        sink: Arc<dyn LogSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = config.effective_cache_ttl();
        let cache = ReplayCache::new(config.cache_enabled, ttl, clock.clone());
        Self {
            inner: Arc::new(BusInner {
                dispatcher: Dispatcher::new(sink.clone()),
                middleware: MiddlewarePipeline::new(),
                config,
                registry,
                cache,
                delivery: Mutex::new(()),
                sink,
                clock,
                events_published: AtomicU64::new(0),
                publishes_aborted: AtomicU64::new(0),
            }),
        }
    }

    /// Publish `payload` under `event`.
    ///
    /// Runs global then event middleware, caches the result when caching is
    /// enabled, then invokes every subscriber synchronously in priority
    /// order. Returns `Err` only when the call itself is invalid: an empty
    /// event name, or a payload type other than the one the event is bound to.
    pub fn publish<T: Payload>(&self, event: &str, payload: T) -> Result<PublishReport> {
        let metadata = EventMetadata::at(self.inner.clock.now());
        self.publish_with_metadata(event, payload, metadata)
    }

    /// Publish with custom metadata
    pub fn publish_with_metadata<T: Payload>(
        &self,
        event: &str,
        payload: T,
        metadata: EventMetadata,
    ) -> Result<PublishReport> {
        let event = self.check_event(event)?;
        self.bind::<T>(event)?;
        self.inner.events_published.fetch_add(1, Ordering::Relaxed);

        let envelope = EventEnvelope::with_metadata(event, payload, metadata);
        let event_id = envelope.event_id();

        self.inner
            .sink
            .debug(&LogRecord::new("Publishing event").event(event));

        let envelope = match self
            .inner
            .middleware
            .run(event, envelope)
            .and_then(|envelope| self.check_transformed(event, envelope))
        {
            Ok(envelope) => envelope,
            Err(error) => {
                self.inner.publishes_aborted.fetch_add(1, Ordering::Relaxed);
                let message = format!("Error emitting event \"{}\"", event);
                self.inner
                    .sink
                    .error(&LogRecord::new(&message).event(event).error(&error));
                return Ok(PublishReport::aborted(event_id));
            }
        };

        let (cached, subscribers) = {
            let _delivery = self.inner.delivery.lock();
            let cached = self.inner.cache.store(event, envelope.clone());
            (cached, self.inner.registry.snapshot(event))
        };
        let dispatch = self.inner.dispatcher.dispatch(&envelope, subscribers);

        Ok(PublishReport {
            event_id,
            delivered: dispatch.delivered,
            failed: dispatch.failed,
            aborted: false,
            cached,
        })
    }

    /// Publish a typed event under its own event name
    pub fn publish_event<E: Event>(&self, event: E) -> Result<PublishReport> {
        self.publish(E::event_type(), event)
    }

    /// Publish on tokio's blocking pool and await the report.
    ///
    /// Subscribers still run synchronously and in order, just not on the
    /// calling task, so a slow subscriber does not stall an async executor.
    pub async fn publish_async<T: Payload>(
        &self,
        event: impl Into<String>,
        payload: T,
    ) -> Result<PublishReport> {
        let bus = self.clone();
        let event = event.into();
        tokio::task::spawn_blocking(move || bus.publish(&event, payload))
            .await
            .map_err(|e| Error::internal(format!("publish task failed: {}", e)))?
    }

    /// Subscribe to `event` with the default priority (0).
    ///
    /// If a valid cached payload exists for `event`, `callback` receives it
    /// once before this method returns.
    pub fn subscribe<T, F>(&self, event: &str, callback: F) -> Result<SubscriptionHandle>
    where
        T: Payload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_with_priority(event, 0, callback)
    }

    /// Subscribe to `event`; higher priorities are invoked first
    pub fn subscribe_with_priority<T, F>(
        &self,
        event: &str,
        priority: i32,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        T: Payload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let handler: Arc<dyn EventHandler> = Arc::new(FunctionHandler::<T, F>::new(callback));
        self.register_subscriber::<T>(event, SubscriberEntry::new(handler, priority))
    }

    /// Subscribe a shared handler object.
    ///
    /// The same `Arc` may be registered several times; each registration is
    /// invoked separately and [`EventBus::unsubscribe_handler`] removes all of them.
    pub fn subscribe_handler<T, H>(
        &self,
        event: &str,
        priority: i32,
        handler: Arc<H>,
    ) -> Result<SubscriptionHandle>
    where
        T: Payload,
        H: TypedHandler<T>,
    {
        let key = HandlerKey::of(&handler);
        let adapter: Arc<dyn EventHandler> = Arc::new(TypedHandlerAdapter::<T, H>::new(handler));
        self.register_subscriber::<T>(event, SubscriberEntry::with_key(adapter, priority, key))
    }

    /// Subscribe to a typed event under its own event name
    pub fn subscribe_event<E, F>(&self, callback: F) -> Result<SubscriptionHandle>
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(E::event_type(), callback)
    }

    /// Subscribe and keep the latest payload of `event` readable.
    ///
    /// The subscription ends when the returned value is dropped.
    pub fn subscribe_state<T: Payload>(&self, event: &str) -> Result<StateSubscription<T>> {
        let latest = Arc::new(RwLock::new(None));
        let slot = latest.clone();
        let handle = self.subscribe(event, move |payload: &T| {
            *slot.write() = Some(payload.clone());
        })?;
        Ok(StateSubscription::new(latest, handle))
    }

    /// Remove the subscription behind `handle`. Idempotent.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.inner.registry.unregister(handle.id());
        if removed {
            self.inner.sink.debug(
                &LogRecord::new("Unsubscribed")
                    .event(handle.event())
                    .subscription(handle.id()),
            );
        }
        removed
    }

    /// Remove every subscription to `event` registered with this handler
    /// object. Returns how many were removed; zero is not an error.
    pub fn unsubscribe_handler<H: ?Sized>(&self, event: &str, handler: &Arc<H>) -> usize {
        self.inner
            .registry
            .unregister_key(event, HandlerKey::of(handler))
    }

    /// Register a global middleware closure
    pub fn register_global_middleware<F>(&self, middleware: F) -> Result<()>
    where
        F: Fn(&str, EventEnvelope) -> Result<EventEnvelope> + Send + Sync + 'static,
    {
        self.register_global_middleware_with(middleware)
    }

    /// Register a global middleware that only touches payloads of type `T`
    pub fn register_global_typed_middleware<T, F>(&self, middleware: F) -> Result<()>
    where
        T: Payload,
        F: Fn(&str, T) -> Result<T> + Send + Sync + 'static,
    {
        self.register_global_middleware_with(TypedMiddleware::<T, F>::new(middleware))
    }

    /// Register a global middleware object
    pub fn register_global_middleware_with<M: Middleware>(&self, middleware: M) -> Result<()> {
        self.inner
            .middleware
            .push_global(Arc::new(middleware))
            .map_err(|error| {
                self.inner.sink.error(
                    &LogRecord::new("Error registering global middleware").error(&error),
                );
                error
            })
    }

    /// Register a middleware for `event`.
    ///
    /// Binds `event` to the payload type `T` if it is not bound yet.
    pub fn register_event_middleware<T, F>(&self, event: &str, middleware: F) -> Result<()>
    where
        T: Payload,
        F: Fn(&str, T) -> Result<T> + Send + Sync + 'static,
    {
        let event = self.check_event(event)?;
        self.bind::<T>(event)?;
        self.push_event_middleware(event, Arc::new(TypedMiddleware::<T, F>::new(middleware)))
    }

    /// Register a middleware object for `event`
    pub fn register_event_middleware_with<M: Middleware>(
        &self,
        event: &str,
        middleware: M,
    ) -> Result<()> {
        let event = self.check_event(event)?;
        self.push_event_middleware(event, Arc::new(middleware))
    }

    fn push_event_middleware(&self, event: &str, middleware: Arc<dyn Middleware>) -> Result<()> {
        self.inner
            .middleware
            .push_scoped(event, middleware)
            .map_err(|error| {
                let message = format!("Error registering middleware for event \"{}\"", event);
                self.inner
                    .sink
                    .error(&LogRecord::new(&message).event(event).error(&error));
                error
            })
    }

    /// Start caching publishes for replay
    pub fn enable_cache(&self) {
        self.inner.cache.enable();
        self.inner.sink.info(&LogRecord::new("Replay cache enabled"));
    }

    /// Stop caching publishes and discard every cached payload
    pub fn disable_cache(&self) {
        let dropped = self.inner.cache.disable();
        let message = format!("Replay cache disabled, discarded {} entries", dropped);
        self.inner.sink.warn(&LogRecord::new(&message));
    }

    /// Whether publishes are currently cached
    pub fn is_cache_enabled(&self) -> bool {
        self.inner.cache.is_enabled()
    }

    /// The replay cache time-to-live
    pub fn cache_ttl(&self) -> Duration {
        self.inner.cache.ttl()
    }

    /// Drop expired cache entries now instead of on next read
    pub fn purge_expired_cache(&self) -> usize {
        self.inner.cache.purge_expired()
    }

    /// The cached payload for `event`, if one is valid and of type `T`
    pub fn last_payload<T: Payload>(&self, event: &str) -> Option<T> {
        self.inner
            .cache
            .replay_entry(event)
            .and_then(|envelope| envelope.into_payload::<T>().ok())
    }

    /// Number of subscribers currently registered for `event`
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner.registry.subscription_count(event)
    }

    /// Payload type `event` is bound to, if any
    pub fn payload_type(&self, event: &str) -> Option<PayloadType> {
        self.inner.registry.binding(event)
    }

    /// The configuration this bus was built with
    pub fn config(&self) -> &EventBusConfig {
        &self.inner.config
    }

    /// Get statistics about the event bus
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_subscriptions: self.inner.registry.total_subscriptions(),
            events: self.inner.registry.event_names().len(),
            cached_events: self.inner.cache.len(),
            events_published: self.inner.events_published.load(Ordering::Relaxed),
            publishes_aborted: self.inner.publishes_aborted.load(Ordering::Relaxed),
            dispatcher_stats: self.inner.dispatcher.stats(),
        }
    }

    fn register_subscriber<T: Payload>(
        &self,
        event: &str,
        entry: SubscriberEntry,
    ) -> Result<SubscriptionHandle> {
        let event = self.check_event(event)?;
        self.bind::<T>(event)?;

        let id = entry.id;
        // a publish either sees this entry in its snapshot or has already
        // cached its payload for the replay below, never both
        let replay = {
            let _delivery = self.inner.delivery.lock();
            self.inner
                .registry
                .register(event, entry.clone())
                .map(|()| self.inner.cache.replay_entry(event))
        };
        let replay = match replay {
            Ok(replay) => replay,
            Err(error) => {
                let message = format!("Error subscribing to event \"{}\"", event);
                self.inner
                    .sink
                    .error(&LogRecord::new(&message).event(event).error(&error));
                return Err(error);
            }
        };
        self.inner
            .sink
            .debug(&LogRecord::new("Subscribed").event(event).subscription(id));

        if let Some(cached) = replay {
            // a failing replay is reported by the dispatcher; the subscription stays
            let _ = self.inner.dispatcher.replay(&entry, &cached);
        }

        Ok(SubscriptionHandle::new(id, event, &self.inner.registry))
    }

    fn check_event<'a>(&self, event: &'a str) -> Result<&'a str> {
        validate_event_name(event).map_err(|error| {
            self.inner
                .sink
                .error(&LogRecord::new("Invalid event name").event(event).error(&error));
            error
        })
    }

    fn bind<T: Payload>(&self, event: &str) -> Result<()> {
        self.inner
            .registry
            .bind(event, PayloadType::of::<T>())
            .map_err(|error| {
                let message = format!("Invalid payload for event \"{}\"", event);
                self.inner
                    .sink
                    .error(&LogRecord::new(&message).event(event).error(&error));
                error
            })
    }

    fn check_transformed(&self, event: &str, envelope: EventEnvelope) -> Result<EventEnvelope> {
        match self.inner.registry.binding(event) {
            Some(expected) if expected != envelope.payload_type() => Err(Error::MiddlewareFailure {
                event: event.to_string(),
                middleware: "pipeline".into(),
                reason: format!(
                    "payload type changed from {} to {}",
                    expected.name(),
                    envelope.payload_type().name()
                ),
            }),
            _ => Ok(envelope),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("middleware", &self.inner.middleware)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

/// Statistics about the event bus
#[derive(Debug, Clone)]
pub struct EventBusStats {
    /// Total number of subscriptions
    pub total_subscriptions: usize,

    /// Number of events with at least one subscriber
    pub events: usize,

    /// Number of entries in the replay cache
    pub cached_events: usize,

    /// Accepted publish calls
    pub events_published: u64,

    /// Publishes aborted by middleware
    pub publishes_aborted: u64,

    /// Dispatcher statistics
    pub dispatcher_stats: DispatcherStats,
}

impl fmt::Display for EventBusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventBus Stats: {} subscriptions, {} events, {} cached, {} published ({} aborted), {} delivery failures",
            self.total_subscriptions,
            self.events,
            self.cached_events,
            self.events_published,
            self.publishes_aborted,
            self.dispatcher_stats.delivery_failures
        )
    }
}

#[cfg(test)]
mod tests;
