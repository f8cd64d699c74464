//! Configuration for the event bus.

use crate::error::{Error, Result};
use serde::Deserialize;

/// Configuration for the event bus.
///
/// Deserializable with per-field defaults, so a host application can embed it
/// in its own configuration file and only override what it needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Maximum number of dead letters kept before the oldest is evicted
    pub dead_letter_capacity: usize,

    /// Record a panicking handler as a failure instead of unwinding through
    /// `emit`
    pub capture_handler_panics: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            dead_letter_capacity: 1000,
            capture_handler_panics: true,
        }
    }
}

impl EventBusConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dead-letter capacity
    pub fn dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_letter_capacity = capacity;
        self
    }

    /// Enable or disable handler panic capture
    pub fn capture_handler_panics(mut self, capture: bool) -> Self {
        self.capture_handler_panics = capture;
        self
    }

    /// Check the configuration for values the bus cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.dead_letter_capacity == 0 {
            return Err(Error::config(
                "dead_letter_capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Preset configurations for common use cases
impl EventBusConfig {
    /// Configuration for memory-constrained processes
    pub fn low_memory() -> Self {
        Self::default().dead_letter_capacity(64)
    }

    /// Configuration for testing
    pub fn test() -> Self {
        Self::default().dead_letter_capacity(16)
    }
}
