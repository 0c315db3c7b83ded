//! Routing Primitives
//!
//! Stateless and shared pieces the routers build on:
//! - SQL shape classifier
//! - route decisions and reasons
//! - the circuit breaker latch
//! - the lazy slot with reset

mod circuit_breaker;
mod reason;
mod slot;
pub mod sql;

pub use circuit_breaker::CircuitBreaker;
pub use reason::{Reason, RouteDecision};
pub use slot::Slot;
