//! Circuit Breaker
//!
//! One-way latch: the first unsupported operation anywhere trips it, and
//! from then on every connection sharing the breaker routes to main only,
//! without consulting the consistency tracker.
//!
//! States:
//! - Closed: normal routing
//! - Tripped: main only, unsupported operations included, until an explicit
//!   [`CircuitBreaker::reset`]
//!
//! The process-wide instance is [`CircuitBreaker::shared`]; tests and
//! embedders that need isolation construct their own and inject it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};

use crate::errors::DualConnectionError;
use crate::observability::{log_event_with_fields, Event};

/// Process-wide breaker, created on first use
static SHARED: OnceLock<Arc<CircuitBreaker>> = OnceLock::new();

/// Shared degrade flag
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    tripped: AtomicBool,
    trips: AtomicU64,
    /// When the current trip happened
    tripped_at: Mutex<Option<DateTime<Utc>>>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new() -> Self {
        Self::default()
    }

    /// The breaker shared by every connection that was not given its own.
    pub fn shared() -> Arc<CircuitBreaker> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(CircuitBreaker::new())))
    }

    /// Whether routing is degraded to main only.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Trip the breaker.
    ///
    /// Returns true if this call moved the breaker from closed to tripped.
    pub fn trip(&self, operation: &'static str) -> bool {
        self.trips.fetch_add(1, Ordering::Relaxed);
        let first = !self.tripped.swap(true, Ordering::AcqRel);
        if first {
            let now = Utc::now();
            if let Ok(mut tripped_at) = self.tripped_at.lock() {
                *tripped_at = Some(now);
            }
            let at = now.to_rfc3339();
            log_event_with_fields(
                Event::CircuitBreakerTripped,
                &[("operation", operation), ("tripped_at", at.as_str())],
            );
        }
        first
    }

    /// Trip the breaker and build the error for an unsupported operation.
    pub fn reject(&self, operation: &'static str) -> DualConnectionError {
        self.trip(operation);
        DualConnectionError::Unsupported { operation }
    }

    /// Administrative reset back to normal routing.
    pub fn reset(&self) {
        if let Ok(mut tripped_at) = self.tripped_at.lock() {
            *tripped_at = None;
        }
        if self.tripped.swap(false, Ordering::AcqRel) {
            log_event_with_fields(Event::CircuitBreakerReset, &[]);
        }
    }

    /// When the breaker tripped, if it is tripped.
    pub fn tripped_at(&self) -> Option<DateTime<Utc>> {
        self.tripped_at.lock().ok().and_then(|at| *at)
    }

    /// Number of unsupported operations seen, including ones after the trip.
    pub fn trip_count(&self) -> u64 {
        self.trips.load(Ordering::Relaxed)
    }
}
