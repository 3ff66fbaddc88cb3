//! Event handler traits and implementations.

use crate::event::{EventEnvelope, Payload};
use crate::Result;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Trait for handlers invoked synchronously with a published envelope.
///
/// Returning `Err` (or panicking) marks this invocation as failed; the bus
/// logs it and moves on to the next subscriber.
pub trait EventHandler: Send + Sync + 'static {
    /// Process an event envelope
    fn handle(&self, envelope: &EventEnvelope) -> Result<()>;

    /// Get the handler name for debugging
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// A typed event handler that processes payloads of one type.
pub trait TypedHandler<T: Payload>: Send + Sync + 'static {
    /// Handle a payload
    fn handle_typed(&self, payload: &T) -> Result<()>;

    /// Get the handler name
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapter that converts a shared TypedHandler into an EventHandler
pub struct TypedHandlerAdapter<T: Payload, H: TypedHandler<T>> {
    handler: Arc<H>,
    _phantom: PhantomData<fn(T)>,
}

impl<T: Payload, H: TypedHandler<T>> TypedHandlerAdapter<T, H> {
    /// Create a new typed handler adapter
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<T: Payload, H: TypedHandler<T>> EventHandler for TypedHandlerAdapter<T, H> {
    fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        self.handler.handle_typed(envelope.payload::<T>()?)
    }

    fn name(&self) -> &str {
        self.handler.name()
    }
}

impl<T: Payload, H: TypedHandler<T>> fmt::Debug for TypedHandlerAdapter<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedHandlerAdapter")
            .field("name", &self.handler.name())
            .finish()
    }
}

/// A function-based event handler using closures.
pub struct FunctionHandler<T, F>
where
    T: Payload,
    F: Fn(&T) + Send + Sync + 'static,
{
    function: F,
    name: String,
    _phantom: PhantomData<fn(T)>,
}

impl<T, F> FunctionHandler<T, F>
where
    T: Payload,
    F: Fn(&T) + Send + Sync + 'static,
{
    /// Create a new function handler
    pub fn new(function: F) -> Self {
        Self::with_name(
            function,
            format!("FunctionHandler<{}>", std::any::type_name::<T>()),
        )
    }

    /// Create a new function handler with a custom name
    pub fn with_name(function: F, name: impl Into<String>) -> Self {
        Self {
            function,
            name: name.into(),
            _phantom: PhantomData,
        }
    }
}

impl<T, F> EventHandler for FunctionHandler<T, F>
where
    T: Payload,
    F: Fn(&T) + Send + Sync + 'static,
{
    fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        (self.function)(envelope.payload::<T>()?);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<T, F> fmt::Debug for FunctionHandler<T, F>
where
    T: Payload,
    F: Fn(&T) + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandler")
            .field("name", &self.name)
            .finish()
    }
}
