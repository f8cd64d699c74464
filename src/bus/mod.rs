//! The main EventBus implementation.
//!
//! The EventBus is the primary interface for emitting and subscribing to
//! events. It is a cheap, cloneable handle to one shared [`Dispatcher`].

use crate::context::ExecutionSnapshot;
use crate::dead_letter::{DeadLetterSink, DeadLetterStats};
use crate::dispatcher::{Dispatcher, DispatcherStats};
use crate::error::HandlerError;
use crate::event::Event;
use crate::id::SubscriptionId;
use crate::registry::RegistryStats;
use crate::subscription::{EventHandler, FunctionHandler, Subscription, TypedHandler};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub mod builder;
pub mod config;

pub use builder::EventBusBuilder;
pub use config::EventBusConfig;

/// The main event bus for emitting and subscribing to events.
///
/// Every clone shares the same registry, middleware chain and dead-letter
/// sink. `emit` runs synchronously on the calling thread and returns once
/// every handler has finished.
///
/// # Example
///
/// ```rust
/// use fault_isolated_events::{DispatchOutcome, EventBus, HandlerError};
/// use serde_json::json;
///
/// let bus = EventBus::builder()
///     .use_fn(|mut ctx| {
///         ctx.metadata_mut().set_source("checkout");
///         Some(ctx)
///     })
///     .build()?;
///
/// bus.subscribe("order.paid", |event| Ok(event.payload()["total"].clone()), 10);
/// bus.subscribe("order.paid", |_| Err(HandlerError::new("ledger offline")), 0);
///
/// let snapshot = bus.emit("order.paid", json!({ "total": 25 }))?;
/// assert_eq!(snapshot.outcome(), DispatchOutcome::HandlerFailed);
/// assert_eq!(snapshot.results()[0].value, json!(25));
/// assert_eq!(bus.dead_letters().drain(10).len(), 1);
/// # Ok::<(), fault_isolated_events::Error>(())
/// ```
#[derive(Clone)]
pub struct EventBus {
    pub(crate) dispatcher: Arc<Dispatcher>,
}

impl EventBus {
    /// Create an event bus with the default configuration and no middleware
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a new EventBus builder
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Subscribe a closure working on the raw event
    pub fn subscribe<F>(
        &self,
        event_type: impl Into<String>,
        handler: F,
        priority: i64,
    ) -> SubscriptionId
    where
        F: Fn(&Event) -> std::result::Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_handler(event_type, FunctionHandler::new(handler), priority)
    }

    /// Subscribe with a custom handler implementation
    pub fn subscribe_handler<H: EventHandler>(
        &self,
        event_type: impl Into<String>,
        handler: H,
        priority: i64,
    ) -> SubscriptionId {
        self.dispatcher
            .subscribe(event_type, Arc::new(handler), priority)
    }

    /// Subscribe a closure over a deserialized payload.
    ///
    /// A payload that does not deserialize into `T` is recorded as an
    /// `InvalidPayload` handler error without calling `handler`.
    pub fn subscribe_typed<T, R, F>(
        &self,
        event_type: impl Into<String>,
        handler: F,
        priority: i64,
    ) -> SubscriptionId
    where
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(T) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_handler(event_type, TypedHandler::new(handler), priority)
    }

    /// Unsubscribe a handler.
    ///
    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Emit an event and run it through middleware and handlers
    pub fn emit(
        &self,
        event_type: impl Into<String>,
        payload: Value,
    ) -> Result<ExecutionSnapshot> {
        let snapshot = self.dispatcher.emit(event_type, payload)?;

        debug!(
            event_id = %snapshot.event().id(),
            outcome = %snapshot.outcome(),
            handlers = snapshot.handlers_invoked(),
            "Event emitted"
        );

        Ok(snapshot)
    }

    /// Subscribers for `event_type`, in execution order
    pub fn handlers_for(&self, event_type: &str) -> Vec<Arc<Subscription>> {
        self.dispatcher.handlers_for(event_type)
    }

    /// The dead-letter sink
    pub fn dead_letters(&self) -> &DeadLetterSink {
        self.dispatcher.dead_letters()
    }

    /// The underlying dispatcher
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Get statistics about the event bus
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            registry: self.dispatcher.registry().stats(),
            dispatcher: self.dispatcher.stats(),
            dead_letters: self.dispatcher.dead_letters().stats(),
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Statistics about the event bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBusStats {
    /// Registry statistics
    pub registry: RegistryStats,

    /// Dispatcher statistics
    pub dispatcher: DispatcherStats,

    /// Dead-letter sink statistics
    pub dead_letters: DeadLetterStats,
}

impl fmt::Display for EventBusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventBus Stats: {} subscriptions, {} event types, {} events emitted, {} handler failures, {} dead letters held",
            self.registry.total_subscriptions,
            self.registry.event_types,
            self.dispatcher.events_emitted,
            self.dispatcher.handler_failures,
            self.dead_letters.held
        )
    }
}
