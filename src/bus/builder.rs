//! Builder pattern for constructing EventBus instances.

use crate::bus::config::EventBusConfig;
use crate::context::ExecutionContext;
use crate::dispatcher::Dispatcher;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::{EventBus, Result};
use std::sync::Arc;
use tracing::info;

/// Builder for creating EventBus instances.
///
/// Middleware can only be added here: once `build` returns, the chain is
/// fixed for the lifetime of the bus.
#[derive(Debug, Default)]
pub struct EventBusBuilder {
    config: EventBusConfig,
    middleware: MiddlewareChain,
}

impl EventBusBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
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

    /// Set the dead-letter capacity
    pub fn dead_letter_capacity(self, capacity: usize) -> Self {
        self.configure(|c| c.dead_letter_capacity(capacity))
    }

    /// Enable or disable handler panic capture
    pub fn capture_handler_panics(self, capture: bool) -> Self {
        self.configure(|c| c.capture_handler_panics(capture))
    }

    /// Append a middleware to the chain
    pub fn use_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.use_middleware(middleware);
        self
    }

    /// Append a closure as middleware
    pub fn use_fn<F>(mut self, function: F) -> Self
    where
        F: Fn(ExecutionContext) -> Option<ExecutionContext> + Send + Sync + 'static,
    {
        self.middleware.use_fn(function);
        self
    }

    /// Build the EventBus
    pub fn build(self) -> Result<EventBus> {
        info!(
            dead_letter_capacity = self.config.dead_letter_capacity,
            capture_handler_panics = self.config.capture_handler_panics,
            middleware = self.middleware.len(),
            "Building EventBus"
        );

        let dispatcher = Dispatcher::new(&self.config, self.middleware)?;
        let bus = EventBus {
            dispatcher: Arc::new(dispatcher),
        };

        info!("EventBus built successfully");
        Ok(bus)
    }
}
