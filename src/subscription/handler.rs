//! Event handler traits and implementations.

use crate::error::{HandlerError, HandlerErrorKind};
use crate::event::Event;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Trait for event handlers.
///
/// A handler receives the immutable event, never the execution context, and
/// returns either a completed value or an error. Handlers that need
/// asynchronous work must finish it before returning.
pub trait EventHandler: Send + Sync + 'static {
    /// Process an event
    fn handle(&self, event: &Event) -> Result<Value, HandlerError>;

    /// Get the handler name for debugging
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// A closure-based event handler working on the raw JSON payload.
pub struct FunctionHandler<F> {
    function: F,
    name: String,
}

impl<F> FunctionHandler<F>
where
    F: Fn(&Event) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    /// Create a new function handler
    pub fn new(function: F) -> Self {
        Self::with_name(function, "FunctionHandler")
    }

    /// Create a new function handler with a custom name
    pub fn with_name(function: F, name: impl Into<String>) -> Self {
        Self {
            function,
            name: name.into(),
        }
    }
}

impl<F> EventHandler for FunctionHandler<F>
where
    F: Fn(&Event) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, event: &Event) -> Result<Value, HandlerError> {
        (self.function)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FunctionHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandler")
            .field("name", &self.name)
            .finish()
    }
}

/// A handler that deserializes the payload into `T` and serializes its `R`
/// back into a result value.
///
/// A payload that does not fit `T` is reported as
/// [`HandlerErrorKind::InvalidPayload`] instead of reaching the closure.
pub struct TypedHandler<T, R, F> {
    function: F,
    name: String,
    _phantom: PhantomData<fn(T) -> R>,
}

impl<T, R, F> TypedHandler<T, R, F>
where
    T: DeserializeOwned + 'static,
    R: Serialize + 'static,
    F: Fn(T) -> Result<R, HandlerError> + Send + Sync + 'static,
{
    /// Create a new typed handler
    pub fn new(function: F) -> Self {
        Self::with_name(
            function,
            format!("TypedHandler<{}>", std::any::type_name::<T>()),
        )
    }

    /// Create a new typed handler with a custom name
    pub fn with_name(function: F, name: impl Into<String>) -> Self {
        Self {
            function,
            name: name.into(),
            _phantom: PhantomData,
        }
    }
}

impl<T, R, F> EventHandler for TypedHandler<T, R, F>
where
    T: DeserializeOwned + 'static,
    R: Serialize + 'static,
    F: Fn(T) -> Result<R, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, event: &Event) -> Result<Value, HandlerError> {
        let input = T::deserialize(event.payload()).map_err(|e| {
            HandlerError::with_kind(
                HandlerErrorKind::InvalidPayload,
                format!("expected {}: {}", std::any::type_name::<T>(), e),
            )
        })?;

        let output = (self.function)(input)?;

        serde_json::to_value(output)
            .map_err(|e| HandlerError::with_kind(HandlerErrorKind::InvalidOutput, e.to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<T, R, F> fmt::Debug for TypedHandler<T, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedHandler")
            .field("name", &self.name)
            .finish()
    }
}
