//! Error types for the event-hub library.

use thiserror::Error;

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for event-hub
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An argument violated the bus contract (e.g. an empty event name)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An event name was used with a payload type other than the one it is bound to
    #[error("Payload type mismatch for event \"{event}\": expected {expected}, found {found}")]
    PayloadTypeMismatch {
        /// Event name
        event: String,
        /// Payload type the event is bound to
        expected: &'static str,
        /// Payload type that was supplied
        found: &'static str,
    },

    /// A middleware faulted while processing a publish
    #[error("Middleware '{middleware}' failed for event \"{event}\": {reason}")]
    MiddlewareFailure {
        /// Event name
        event: String,
        /// Middleware name
        middleware: String,
        /// Underlying failure
        reason: String,
    },

    /// A subscriber callback faulted during dispatch or replay
    #[error("Subscriber '{handler}' failed for event \"{event}\": {reason}")]
    SubscriberCallbackFailure {
        /// Event name
        event: String,
        /// Handler name
        handler: String,
        /// Underlying failure
        reason: String,
    },

    /// Appending a subscriber or middleware failed
    #[error("Registration failed: {0}")]
    RegistrationFailure(String),

    /// Error returned by a handler or middleware implementation
    #[error("Handler error: {0}")]
    HandlerError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The process-wide bus was installed twice
    #[error("Global event bus is already initialized")]
    AlreadyInitialized,

    /// The process-wide bus was accessed before installation
    #[error("Global event bus is not initialized")]
    NotInitialized,

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Create a new handler error
    pub fn handler(msg: impl Into<String>) -> Self {
        Error::HandlerError(msg.into())
    }

    /// Create a new invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Check if this error was caused by the caller breaking the bus contract.
    ///
    /// These are the only errors `publish` and `subscribe` raise directly;
    /// failures of caller-supplied code are contained and logged instead.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_) | Error::PayloadTypeMismatch { .. }
        )
    }

    /// Check if this error originated in caller-supplied middleware or handlers
    pub fn is_callback_failure(&self) -> bool {
        matches!(
            self,
            Error::MiddlewareFailure { .. }
                | Error::SubscriberCallbackFailure { .. }
                | Error::HandlerError(_)
        )
    }
}

/// Validate an event name, returning it on success.
pub(crate) fn validate_event_name(event: &str) -> Result<&str> {
    if event.is_empty() {
        return Err(Error::invalid_argument(format!(
            "Invalid event name: \"{}\"",
            event
        )));
    }
    Ok(event)
}

/// Render a caught panic payload as a message.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
