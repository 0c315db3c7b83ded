//! # Dual Connection Errors
//!
//! Error types shared by every layer of the router.

use std::error::Error as StdError;

use thiserror::Error;

/// Result type for dual connection operations
pub type DualResult<T> = Result<T, DualConnectionError>;

/// Errors raised by the logical connection and its statements
#[derive(Debug, Error)]
pub enum DualConnectionError {
    // ==================
    // Routing Errors
    // ==================

    /// The call is outside the surface the router can arbitrate.
    ///
    /// Raising this trips the circuit breaker; construct it through
    /// `CircuitBreaker::reject`.
    #[error("Operation not supported by the dual connection: {operation}")]
    Unsupported { operation: &'static str },

    /// A result accessor was used before any execute call bound a statement
    #[error("Statement has not been executed yet")]
    NotExecuted,

    // ==================
    // Driver Errors
    // ==================

    /// Failure reported by a physical connection, statement, provider or
    /// consistency tracker. Carried untouched.
    #[error(transparent)]
    Driver(Box<dyn StdError + Send + Sync>),

    // ==================
    // Interception Errors
    // ==================

    /// The call interceptor returned without forwarding the call
    #[error("Call interceptor returned without forwarding the call")]
    CallNotForwarded,

    // ==================
    // Internal Errors
    // ==================

    /// Shared connection state was poisoned by a panicking thread
    #[error("Connection state lock poisoned")]
    Poisoned,

    /// Configuration could not be read or is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DualConnectionError {
    /// Wrap a driver-level failure.
    pub fn driver(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Driver(Box::new(error))
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check whether this error signals an unsupported operation.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Borrow the underlying driver failure, if any.
    pub fn driver_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Driver(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}
