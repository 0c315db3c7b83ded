//! Observable routing events
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events of the dual connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration file loaded
    ConfigLoaded,

    // Read path
    /// Replica failed the consistency check; the read falls back to main
    ReplicaInconsistent,
    /// No replica available; the read path is the main connection
    ReplicaUnavailable,
    /// A replica connection was closed because the write path became active
    ReadConnectionDiscarded,

    // Write path
    /// A write position was handed to the consistency tracker
    ConsistencyWriteRecorded,

    // Lifecycle
    /// Closing a physical connection failed
    ConnectionCloseFailed,

    // Circuit breaker
    /// An unsupported operation tripped the breaker
    CircuitBreakerTripped,
    /// The breaker was reset
    CircuitBreakerReset,

    // Interception
    /// A call interceptor returned an error; the call's result is kept
    InterceptorFailed,

    // Decisions
    /// A routing decision was made
    RouteDecided,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ReplicaInconsistent => "REPLICA_INCONSISTENT",
            Event::ReplicaUnavailable => "REPLICA_UNAVAILABLE",
            Event::ReadConnectionDiscarded => "READ_CONNECTION_DISCARDED",
            Event::ConsistencyWriteRecorded => "CONSISTENCY_WRITE_RECORDED",
            Event::ConnectionCloseFailed => "CONNECTION_CLOSE_FAILED",
            Event::CircuitBreakerTripped => "CIRCUIT_BREAKER_TRIPPED",
            Event::CircuitBreakerReset => "CIRCUIT_BREAKER_RESET",
            Event::InterceptorFailed => "INTERCEPTOR_FAILED",
            Event::RouteDecided => "ROUTE_DECIDED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::RouteDecided
            | Event::ConsistencyWriteRecorded
            | Event::ReadConnectionDiscarded
            | Event::ReplicaUnavailable => Severity::Trace,
            Event::ConfigLoaded | Event::ReplicaInconsistent | Event::CircuitBreakerReset => {
                Severity::Info
            }
            Event::ConnectionCloseFailed
            | Event::CircuitBreakerTripped
            | Event::InterceptorFailed => Severity::Warn,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
