//! Builder pattern for constructing EventBus instances.

use crate::bus::config::EventBusConfig;
use crate::clock::{Clock, SystemClock};
use crate::log::{LogSink, TracingSink};
use crate::registry::{DashMapRegistry, EventRegistry};
use crate::{EventBus, Result};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Builder for creating EventBus instances
pub struct EventBusBuilder {
    config: EventBusConfig,
    registry: Option<Arc<dyn EventRegistry>>,
    log_sink: Option<Arc<dyn LogSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl EventBusBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: EventBusConfig::default(),
            registry: None,
            log_sink: None,
            clock: None,
        }
    }

    /// Use a custom configuration
    pub fn config(mut self, config: EventBusConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure the event bus
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(EventBusConfig) -> EventBusConfig,
    {
        self.config = f(self.config);
        self
    }

    /// Use a custom registry implementation.
    ///
    /// `max_subscribers_per_event` and `registry_capacity` only apply to the
    /// default registry.
    pub fn registry(mut self, registry: Arc<dyn EventRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Send bus diagnostics to `sink` instead of `tracing`
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Use a custom time source for cache timestamps
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build without a replay cache
    pub fn no_cache(self) -> Self {
        self.configure(|config| config.cache_enabled(false))
    }

    /// Build the EventBus
    pub fn build(self) -> Result<EventBus> {
        info!("Building EventBus");
        self.config.validate()?;

        let bus = assemble(self);
        info!(
            cache_enabled = bus.is_cache_enabled(),
            cache_ttl_ms = bus.cache_ttl().as_millis() as u64,
            "EventBus built successfully"
        );
        Ok(bus)
    }
}

/// Wire up the bus from a builder whose config is known to be valid
pub(super) fn assemble(builder: EventBusBuilder) -> EventBus {
    let EventBusBuilder {
        config,
        registry,
        log_sink,
        clock,
    } = builder;

    let registry = registry.unwrap_or_else(|| {
        info!("Creating default DashMapRegistry");
        Arc::new(
            DashMapRegistry::with_capacity(config.registry_capacity)
                .with_max_subscribers_per_event(config.max_subscribers_per_event),
        )
    });
    let sink = log_sink.unwrap_or_else(|| Arc::new(TracingSink));
    let clock = clock.unwrap_or_else(|| Arc::new(SystemClock));

    EventBus::from_parts(config, registry, sink, clock)
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusBuilder")
            .field("config", &self.config)
            .field("custom_registry", &self.registry.is_some())
            .field("custom_log_sink", &self.log_sink.is_some())
            .field("clock", &self.clock)
            .finish()
    }
}
