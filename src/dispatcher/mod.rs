//! Event dispatcher for invoking subscribers.
//!
//! Dispatch is synchronous and sequential on the publishing call stack. Each
//! invocation is isolated: a handler that returns `Err` or panics is logged
//! and the next subscriber still runs.

use crate::error::panic_message;
use crate::event::EventEnvelope;
use crate::log::{LogRecord, LogSink};
use crate::registry::{dispatch_order, SubscriberEntry};
use crate::{Error, Result};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers that completed successfully
    pub delivered: usize,

    /// Subscribers that failed
    pub failed: usize,
}

/// Statistics for the dispatcher
#[derive(Debug, Clone, Default)]
pub struct DispatcherStats {
    /// Total dispatches performed
    pub events_dispatched: u64,

    /// Successful subscriber invocations
    pub deliveries: u64,

    /// Failed subscriber invocations
    pub delivery_failures: u64,

    /// Replays delivered to new subscribers
    pub replays: u64,
}

/// Invokes subscriber snapshots in dispatch order.
pub struct Dispatcher {
    sink: Arc<dyn LogSink>,
    events_dispatched: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    replays: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher reporting failures to `sink`
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            events_dispatched: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            replays: AtomicU64::new(0),
        }
    }

    /// Deliver `envelope` to a snapshot of subscribers.
    ///
    /// The snapshot is ordered by priority (descending, stable) before any
    /// handler runs; changes to the registry made by handlers do not affect
    /// this dispatch.
    pub fn dispatch(
        &self,
        envelope: &EventEnvelope,
        subscribers: Vec<SubscriberEntry>,
    ) -> DispatchReport {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);

        let mut report = DispatchReport::default();
        for subscriber in dispatch_order(subscribers) {
            match self.invoke(&subscriber, envelope) {
                Ok(()) => report.delivered += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }

    /// Deliver a cached envelope to one newly registered subscriber
    pub fn replay(&self, subscriber: &SubscriberEntry, envelope: &EventEnvelope) -> Result<()> {
        self.replays.fetch_add(1, Ordering::Relaxed);
        self.invoke(subscriber, envelope)
    }

    /// Invoke one subscriber, containing and logging any failure
    fn invoke(&self, subscriber: &SubscriberEntry, envelope: &EventEnvelope) -> Result<()> {
        let outcome = catch_unwind(AssertUnwindSafe(|| subscriber.handler.handle(envelope)));
        let reason = match outcome {
            Ok(Ok(())) => {
                self.deliveries.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("panicked: {}", panic_message(&*panic)),
        };

        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        let error = Error::SubscriberCallbackFailure {
            event: envelope.event().to_string(),
            handler: subscriber.name().to_string(),
            reason,
        };
        let message = format!("Error in callback for event \"{}\"", envelope.event());
        self.sink.error(
            &LogRecord::new(&message)
                .event(envelope.event())
                .subscription(subscriber.id)
                .error(&error),
        );
        Err(error)
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stats", &self.stats())
            .finish()
    }
}
