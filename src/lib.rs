//! # fault-isolated-events
//!
//! A synchronous, in-process event bus with a middleware chain, priority
//! ordered handlers, per-handler failure isolation and a bounded dead-letter
//! sink.
//!
//! ## Features
//!
//! - **Middleware** that can tag or cancel an event before any handler runs
//! - **Priority dispatch** with registration-order tie breaking
//! - **Fail-isolated handlers**: one failure (or panic) never stops the rest
//! - **Dead letters** for unrouted events and handler failures, kept in a ring
//!   buffer of fixed size
//! - **Thread-safe**: emit and subscribe from any number of threads
//!
//! ## Quick Example
//!
//! ```rust
//! use fault_isolated_events::prelude::*;
//! use serde_json::json;
//!
//! fn main() -> Result<()> {
//!     let bus = EventBus::builder()
//!         .use_fn(|mut ctx| {
//!             if ctx.event().payload()["amount_cents"] == 0 {
//!                 ctx.cancel_with_reason("zero amount");
//!             }
//!             Some(ctx)
//!         })
//!         .build()?;
//!
//!     bus.subscribe("order.paid", |_| Ok(json!("receipt sent")), 10);
//!     bus.subscribe("order.paid", |_| Err(HandlerError::new("ledger offline")), 5);
//!
//!     let snapshot = bus.emit("order.paid", json!({ "amount_cents": 1299 }))?;
//!     assert_eq!(snapshot.results().len(), 1);
//!     assert_eq!(snapshot.errors().len(), 1);
//!
//!     for letter in bus.dead_letters().drain(10) {
//!         println!("{}: {:?}", letter.category(), letter.snapshot().errors());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    unreachable_pub
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Event and subscription identifiers
pub mod id;

/// Error types and result aliases
pub mod error;

/// The immutable event and its metadata bag
pub mod event;

/// Per-emit execution context and frozen snapshots
pub mod context;

/// Middleware chain run before handlers
pub mod middleware;

/// Handlers and the subscriptions that bind them
pub mod subscription;

/// Priority-ordered handler registry
pub mod registry;

/// Bounded store of unrouted and failed events
pub mod dead_letter;

/// Dispatch state machine and handler execution
pub mod dispatcher;

/// The main event bus implementation
pub mod bus;

// Re-export commonly used types
pub use bus::{EventBus, EventBusBuilder, EventBusConfig, EventBusStats};
pub use context::{
    DispatchOutcome, ExecutionContext, ExecutionSnapshot, HandlerFailure, HandlerResult,
};
pub use dead_letter::{DeadLetterCategory, DeadLetterEntry, DeadLetterSink, DeadLetterStats};
pub use dispatcher::{DispatchState, Dispatcher, DispatcherStats};
pub use error::{ContractBreach, Error, HandlerError, HandlerErrorKind, Result};
pub use event::{Event, Metadata};
pub use id::{EventId, SubscriptionId};
pub use middleware::{FnMiddleware, Middleware, MiddlewareChain};
pub use registry::{HandlerRegistry, RegistryStats};
pub use subscription::{EventHandler, FunctionHandler, Subscription, TypedHandler};

/// Prelude module for convenient imports
///
/// # Example
/// ```rust
/// use fault_isolated_events::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bus::{EventBus, EventBusBuilder, EventBusConfig};
    pub use crate::context::{DispatchOutcome, ExecutionContext, ExecutionSnapshot};
    pub use crate::dead_letter::{DeadLetterCategory, DeadLetterEntry};
    pub use crate::error::{Error, HandlerError, HandlerErrorKind, Result};
    pub use crate::event::{Event, Metadata};
    pub use crate::id::{EventId, SubscriptionId};
    pub use crate::middleware::{FnMiddleware, Middleware};
    pub use crate::subscription::{EventHandler, FunctionHandler, TypedHandler};
}
