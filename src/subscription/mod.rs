//! Subscriptions: handler traits, handles and guards.
//!
//! A subscription is created through [`crate::EventBus`] and lives in the
//! registry until it is removed through its [`SubscriptionHandle`], a
//! [`SubscriptionGuard`] drop, or [`crate::EventBus::unsubscribe_handler`].

pub mod handle;
pub mod handler;
pub mod state;

pub use handle::{SubscriptionGuard, SubscriptionHandle};
pub use handler::{EventHandler, FunctionHandler, TypedHandler, TypedHandlerAdapter};
pub use state::StateSubscription;
