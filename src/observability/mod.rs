//! Observability subsystem
//!
//! - Structured logging (JSON lines)
//! - Typed routing events
//! - In-process routing counters
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on routing
//! 3. No background threads
//!
//! # Usage
//!
//! ```ignore
//! use dual_connection::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::ReplicaInconsistent, &[("connection_id", &id)]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MeasuredCall, RoutingMetrics, RoutingSnapshot};

/// Log a routing event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a routing event with fields at its own severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
