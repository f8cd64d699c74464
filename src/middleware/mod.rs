//! Middleware chain run before any handler.
//!
//! Each middleware takes the execution context by value and must hand one
//! back. The chain checks that contract after every step instead of letting a
//! missing or swapped context surface later:
//!
//! - returning `None` is a [`ContractBreach::MissingContext`]
//! - returning a context for a different event is a
//!   [`ContractBreach::ForeignContext`]
//!
//! Either aborts the `emit` call with [`Error::ContractViolation`]. A returned
//! context that is cancelled stops the chain immediately.

use crate::context::ExecutionContext;
use crate::error::{ContractBreach, Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// A pipeline stage that may transform or cancel processing.
///
/// Middleware can only write the context's cancellation flag and metadata
/// bag; the event payload, results and errors are out of reach.
pub trait Middleware: Send + Sync + 'static {
    /// Process the context and hand it back
    fn handle(&self, ctx: ExecutionContext) -> Option<ExecutionContext>;

    /// Get the middleware name for debugging
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// A closure-based middleware.
pub struct FnMiddleware<F> {
    function: F,
    name: String,
}

impl<F> FnMiddleware<F>
where
    F: Fn(ExecutionContext) -> Option<ExecutionContext> + Send + Sync + 'static,
{
    /// Create a new function middleware
    pub fn new(function: F) -> Self {
        Self::with_name(function, "anonymous")
    }

    /// Create a new function middleware with a custom name
    pub fn with_name(function: F, name: impl Into<String>) -> Self {
        Self {
            function,
            name: name.into(),
        }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(ExecutionContext) -> Option<ExecutionContext> + Send + Sync + 'static,
{
    fn handle(&self, ctx: ExecutionContext) -> Option<ExecutionContext> {
        (self.function)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("name", &self.name)
            .finish()
    }
}

/// Ordered list of middleware.
///
/// Middleware is process-lifetime infrastructure: it can be appended but never
/// removed. Once the chain is handed to a dispatcher it is read-only, so
/// running it takes no lock.
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    stack: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) {
        debug!(
            middleware = middleware.name(),
            index = self.stack.len(),
            "Middleware added"
        );
        self.stack.push(Arc::new(middleware));
    }

    /// Append a closure as middleware
    pub fn use_fn<F>(&mut self, function: F)
    where
        F: Fn(ExecutionContext) -> Option<ExecutionContext> + Send + Sync + 'static,
    {
        self.use_middleware(FnMiddleware::new(function));
    }

    /// Number of middleware in the chain
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Names of the middleware, in execution order
    pub fn names(&self) -> Vec<&str> {
        self.stack.iter().map(|m| m.name()).collect()
    }

    /// Run every middleware in registration order.
    ///
    /// Stops early, returning the context as-is, when a middleware cancels.
    pub fn run(&self, mut ctx: ExecutionContext) -> Result<ExecutionContext> {
        let event_id = ctx.event().id();

        for (index, middleware) in self.stack.iter().enumerate() {
            trace!(event_id = %event_id, middleware = middleware.name(), index, "Running middleware");

            let returned = match middleware.handle(ctx) {
                Some(returned) => returned,
                None => {
                    return Err(Self::violation(
                        middleware.as_ref(),
                        index,
                        ContractBreach::MissingContext,
                    ))
                }
            };

            let found = returned.event().id();
            if found != event_id {
                return Err(Self::violation(
                    middleware.as_ref(),
                    index,
                    ContractBreach::ForeignContext {
                        expected: event_id,
                        found,
                    },
                ));
            }

            ctx = returned;

            if ctx.is_cancelled() {
                debug!(
                    event_id = %event_id,
                    middleware = middleware.name(),
                    index,
                    reason = ctx.cancel_reason().unwrap_or("none"),
                    "Middleware cancelled processing"
                );
                return Ok(ctx);
            }
        }

        Ok(ctx)
    }

    fn violation(middleware: &dyn Middleware, index: usize, reason: ContractBreach) -> Error {
        error!(
            middleware = middleware.name(),
            index,
            %reason,
            "Middleware contract violation"
        );
        Error::contract_violation(middleware.name(), index, reason)
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("stack", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> ExecutionContext {
        ExecutionContext::new(Arc::new(Event::new("order.paid", json!({ "total": 10 }))))
    }

    #[test]
    fn test_runs_in_registration_order() {
        let mut chain = MiddlewareChain::new();
        chain.use_fn(|mut ctx| {
            ctx.metadata_mut().insert("trail", "a");
            Some(ctx)
        });
        chain.use_fn(|mut ctx| {
            let trail = format!("{}b", ctx.metadata().get_str("trail").unwrap_or_default());
            ctx.metadata_mut().insert("trail", trail);
            Some(ctx)
        });

        let ctx = chain.run(context()).unwrap();
        assert_eq!(ctx.metadata().get_str("trail"), Some("ab"));
        assert_eq!(ctx.event().payload(), &json!({ "total": 10 }));
    }

    #[test]
    fn test_cancel_stops_chain() {
        let later = Arc::new(AtomicUsize::new(0));
        let later_clone = later.clone();

        let mut chain = MiddlewareChain::new();
        chain.use_fn(|mut ctx| {
            ctx.cancel_with_reason("blocked");
            Some(ctx)
        });
        chain.use_fn(move |ctx| {
            later_clone.fetch_add(1, Ordering::SeqCst);
            Some(ctx)
        });

        let ctx = chain.run(context()).unwrap();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cancel_reason(), Some("blocked"));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_context_is_contract_violation() {
        let mut chain = MiddlewareChain::new();
        chain.use_fn(Some);
        chain.use_middleware(FnMiddleware::with_name(|_ctx| None, "forgetful"));

        let err = chain.run(context()).unwrap_err();
        assert_eq!(
            err,
            Error::contract_violation("forgetful", 1, ContractBreach::MissingContext)
        );
    }

    #[test]
    fn test_stale_context_is_contract_violation() {
        // Keeps the first context it sees and returns it on the next call
        let stash: Arc<Mutex<Option<ExecutionContext>>> = Arc::new(Mutex::new(None));
        let stash_clone = stash.clone();

        let mut chain = MiddlewareChain::new();
        chain.use_middleware(FnMiddleware::with_name(
            move |ctx: ExecutionContext| {
                let mut slot = stash_clone.lock();
                match slot.take() {
                    Some(old) => {
                        *slot = Some(ctx);
                        Some(old)
                    }
                    None => {
                        // Hand back a fresh context for the same event
                        let replacement = ExecutionContext::new(Arc::new(ctx.event().clone()));
                        *slot = Some(ctx);
                        Some(replacement)
                    }
                }
            },
            "hoarder",
        ));

        assert!(chain.run(context()).is_ok());

        let second = context();
        let second_id = second.event().id();
        match chain.run(second).unwrap_err() {
            Error::ContractViolation {
                middleware,
                index,
                reason: ContractBreach::ForeignContext { expected, .. },
            } => {
                assert_eq!(middleware, "hoarder");
                assert_eq!(index, 0);
                assert_eq!(expected, second_id);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_chain_passes_through() {
        let chain = MiddlewareChain::new();
        assert!(chain.is_empty());
        let ctx = chain.run(context()).unwrap();
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_names() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(FnMiddleware::with_name(Some, "auth"));
        chain.use_fn(Some);
        assert_eq!(chain.names(), vec!["auth", "anonymous"]);
        assert_eq!(chain.len(), 2);
    }
}
