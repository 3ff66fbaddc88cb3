//! Middleware pipeline applied to payloads before delivery.
//!
//! Global middleware runs for every publish, in registration order; event
//! middleware runs afterwards for its own event only, also in registration
//! order. The output of each step is the input of the next.

use crate::error::panic_message;
use crate::event::{EventEnvelope, Payload};
use crate::{Error, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A payload transform run during publish.
///
/// Any closure `Fn(&str, EventEnvelope) -> Result<EventEnvelope>` is a
/// middleware. Returning `Err` or panicking aborts the publish.
pub trait Middleware: Send + Sync + 'static {
    /// Transform the envelope published under `event`
    fn process(&self, event: &str, envelope: EventEnvelope) -> Result<EventEnvelope>;

    /// Get the middleware name for logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Middleware for F
where
    F: Fn(&str, EventEnvelope) -> Result<EventEnvelope> + Send + Sync + 'static,
{
    fn process(&self, event: &str, envelope: EventEnvelope) -> Result<EventEnvelope> {
        self(event, envelope)
    }
}

/// Adapter running a typed transform on payloads of type `T`.
///
/// Envelopes carrying any other type pass through untouched.
pub struct TypedMiddleware<T, F>
where
    T: Payload,
    F: Fn(&str, T) -> Result<T> + Send + Sync + 'static,
{
    function: F,
    name: String,
    _phantom: PhantomData<fn(T) -> T>,
}

impl<T, F> TypedMiddleware<T, F>
where
    T: Payload,
    F: Fn(&str, T) -> Result<T> + Send + Sync + 'static,
{
    /// Wrap a typed transform
    pub fn new(function: F) -> Self {
        Self::with_name(
            function,
            format!("TypedMiddleware<{}>", std::any::type_name::<T>()),
        )
    }

    /// Wrap a typed transform with a custom name
    pub fn with_name(function: F, name: impl Into<String>) -> Self {
        Self {
            function,
            name: name.into(),
            _phantom: PhantomData,
        }
    }
}

impl<T, F> Middleware for TypedMiddleware<T, F>
where
    T: Payload,
    F: Fn(&str, T) -> Result<T> + Send + Sync + 'static,
{
    fn process(&self, event: &str, envelope: EventEnvelope) -> Result<EventEnvelope> {
        if !envelope.is::<T>() {
            return Ok(envelope);
        }
        let metadata = envelope.metadata.clone();
        let payload = (self.function)(event, envelope.into_payload::<T>()?)?;
        Ok(EventEnvelope::with_metadata(event, payload, metadata))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<T, F> fmt::Debug for TypedMiddleware<T, F>
where
    T: Payload,
    F: Fn(&str, T) -> Result<T> + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedMiddleware")
            .field("name", &self.name)
            .finish()
    }
}

type SharedMiddleware = Arc<dyn Middleware>;

/// The global and per-event middleware pools.
#[derive(Default)]
pub struct MiddlewarePipeline {
    global: RwLock<Vec<SharedMiddleware>>,
    scoped: DashMap<String, Vec<SharedMiddleware>>,
}

impl MiddlewarePipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the global pool
    pub fn push_global(&self, middleware: SharedMiddleware) -> Result<()> {
        let mut global = self.global.write();
        global
            .try_reserve(1)
            .map_err(|e| Error::RegistrationFailure(e.to_string()))?;
        global.push(middleware);
        Ok(())
    }

    /// Append to the pool for `event`
    pub fn push_scoped(&self, event: &str, middleware: SharedMiddleware) -> Result<()> {
        let mut scoped = self.scoped.entry(event.to_string()).or_default();
        scoped
            .try_reserve(1)
            .map_err(|e| Error::RegistrationFailure(e.to_string()))?;
        scoped.push(middleware);
        Ok(())
    }

    /// Number of global middlewares
    pub fn global_len(&self) -> usize {
        self.global.read().len()
    }

    /// Number of middlewares scoped to `event`
    pub fn scoped_len(&self, event: &str) -> usize {
        self.scoped.get(event).map(|pool| pool.len()).unwrap_or(0)
    }

    /// Run `envelope` through global then event middleware.
    ///
    /// The pools are copied before any middleware runs, so a middleware that
    /// registers middleware affects the next publish only. The first fault
    /// stops the pipeline and is returned as [`Error::MiddlewareFailure`].
    pub fn run(&self, event: &str, envelope: EventEnvelope) -> Result<EventEnvelope> {
        let mut chain: Vec<SharedMiddleware> = self.global.read().clone();
        if let Some(scoped) = self.scoped.get(event) {
            chain.extend(scoped.iter().cloned());
        }

        chain.iter().try_fold(envelope, |envelope, middleware| {
            let outcome = catch_unwind(AssertUnwindSafe(|| middleware.process(event, envelope)));
            let reason = match outcome {
                Ok(Ok(envelope)) => return Ok(envelope),
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(&*panic)),
            };
            Err(Error::MiddlewareFailure {
                event: event.to_string(),
                middleware: middleware.name().to_string(),
                reason,
            })
        })
    }
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("global", &self.global_len())
            .field("scoped_events", &self.scoped.len())
            .finish()
    }
}
