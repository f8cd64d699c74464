//! Error types for the event dispatcher.
//!
//! Two families live here. [`Error`] is fatal to the call that produced it and
//! is returned through `Result`. [`HandlerError`] is a per-handler failure that
//! is accumulated as data inside an execution snapshot and never propagated.

use crate::id::EventId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the dispatcher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A registered middleware broke the chain contract.
    ///
    /// This indicates a programming defect in the middleware, not a data
    /// problem, so it aborts the `emit` call before any handler runs.
    #[error("Middleware contract violation in '{middleware}' (position {index}): {reason}")]
    ContractViolation {
        /// Name reported by the offending middleware
        middleware: String,
        /// Zero-based position in the chain
        index: usize,
        /// What the middleware did wrong
        reason: ContractBreach,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An identifier could not be parsed
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new invalid identifier error
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Error::InvalidId(msg.into())
    }

    /// Create a contract violation for the middleware at `index`
    pub fn contract_violation(
        middleware: impl Into<String>,
        index: usize,
        reason: ContractBreach,
    ) -> Self {
        Error::ContractViolation {
            middleware: middleware.into(),
            index,
            reason,
        }
    }

    /// Check if this error was raised by a misbehaving middleware
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::ContractViolation { .. })
    }
}

/// The ways a middleware can break the chain contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractBreach {
    /// The middleware returned no context.
    MissingContext,
    /// The middleware returned a context that belongs to another event.
    ForeignContext {
        /// Event the chain was processing
        expected: EventId,
        /// Event the returned context belongs to
        found: EventId,
    },
}

impl fmt::Display for ContractBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractBreach::MissingContext => write!(f, "returned no execution context"),
            ContractBreach::ForeignContext { expected, found } => write!(
                f,
                "returned the context of event {} while processing event {}",
                found, expected
            ),
        }
    }
}

/// Classification of a handler failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerErrorKind {
    /// The handler returned an error.
    Failed,
    /// The handler panicked and the panic was captured.
    Panicked,
    /// The event payload did not match the type the handler expects.
    InvalidPayload,
    /// The handler's return value could not be converted to a result value.
    InvalidOutput,
}

impl fmt::Display for HandlerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HandlerErrorKind::Failed => "handler failed",
            HandlerErrorKind::Panicked => "handler panicked",
            HandlerErrorKind::InvalidPayload => "invalid payload",
            HandlerErrorKind::InvalidOutput => "invalid output",
        };
        f.write_str(label)
    }
}

/// A failure reported by (or captured from) a single handler.
///
/// Handler errors are plain values: they are cloned into snapshots and
/// dead-letter entries, compared in tests, and serialized for export.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    kind: HandlerErrorKind,
    message: String,
}

impl HandlerError {
    /// Create a plain handler failure
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(HandlerErrorKind::Failed, message)
    }

    /// Create a handler error of a specific kind
    pub fn with_kind(kind: HandlerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wrap any standard error, keeping its display text
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::new(err.to_string())
    }

    /// Failure classification
    pub fn kind(&self) -> HandlerErrorKind {
        self.kind
    }

    /// Human-readable failure message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this error was captured from a panic
    pub fn is_panic(&self) -> bool {
        self.kind == HandlerErrorKind::Panicked
    }
}
