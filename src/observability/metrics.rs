//! Routing metrics
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe but lock-minimal
//!
//! Nothing here is exported anywhere; callers read a [`RoutingSnapshot`]
//! and ship it wherever they like.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::errors::DualResult;
use crate::spi::{CallContext, CallInterceptor, CallOutcome};

/// Counters describing where routed calls ran
///
/// Uses Relaxed ordering; the counters are independent of each other.
#[derive(Debug, Default)]
pub struct RoutingMetrics {
    /// Calls whose decision ran on main
    main_calls: AtomicU64,
    /// Calls whose decision ran on a replica
    replica_calls: AtomicU64,
    /// Calls executed while the statement was on a read-only binding
    read_only_binding_calls: AtomicU64,
    /// Calls that returned an error
    failed_calls: AtomicU64,
    /// Total wall time spent inside forwarded calls
    call_nanos: AtomicU64,
}

impl RoutingMetrics {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call against its decision.
    pub fn record_call(&self, context: &CallContext<'_>, failed: bool, nanos: u64) {
        if context.decision.is_run_on_main() {
            self.main_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.replica_calls.fetch_add(1, Ordering::Relaxed);
        }
        if context.read_only_binding {
            self.read_only_binding_calls.fetch_add(1, Ordering::Relaxed);
        }
        if failed {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        self.call_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Get all counters as a snapshot
    pub fn snapshot(&self) -> RoutingSnapshot {
        RoutingSnapshot {
            main_calls: self.main_calls.load(Ordering::Relaxed),
            replica_calls: self.replica_calls.load(Ordering::Relaxed),
            read_only_binding_calls: self.read_only_binding_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            call_nanos: self.call_nanos.load(Ordering::Relaxed),
        }
    }

    /// Get current counters as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of the routing counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingSnapshot {
    pub main_calls: u64,
    pub replica_calls: u64,
    pub read_only_binding_calls: u64,
    pub failed_calls: u64,
    pub call_nanos: u64,
}

/// Call interceptor that times every forwarded call into [`RoutingMetrics`]
#[derive(Debug, Clone)]
pub struct MeasuredCall {
    metrics: Arc<RoutingMetrics>,
}

impl MeasuredCall {
    pub fn new(metrics: Arc<RoutingMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<RoutingMetrics> {
        &self.metrics
    }
}

impl CallInterceptor for MeasuredCall {
    fn intercept(
        &self,
        context: &CallContext<'_>,
        call: &mut dyn FnMut() -> CallOutcome,
    ) -> DualResult<()> {
        let started = Instant::now();
        let outcome = call();
        let nanos = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.metrics.record_call(context, outcome.is_failure(), nanos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{Reason, RouteDecision};

    fn context(decision: &RouteDecision, read_only_binding: bool) -> CallContext<'_> {
        CallContext {
            method: "execute_query",
            decision,
            read_only_binding,
        }
    }

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = RoutingMetrics::new().snapshot();
        assert_eq!(snapshot.main_calls, 0);
        assert_eq!(snapshot.replica_calls, 0);
        assert_eq!(snapshot.failed_calls, 0);
    }

    #[test]
    fn test_calls_split_by_decision() {
        let metrics = RoutingMetrics::new();
        let read = RouteDecision::new(Some("select 1"), Reason::ReadOperation, None);
        let write = RouteDecision::new(Some("update t set a = 1"), Reason::WriteOperation, None);

        metrics.record_call(&context(&read, true), false, 10);
        metrics.record_call(&context(&write, false), true, 5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.replica_calls, 1);
        assert_eq!(snapshot.main_calls, 1);
        assert_eq!(snapshot.read_only_binding_calls, 1);
        assert_eq!(snapshot.failed_calls, 1);
        assert_eq!(snapshot.call_nanos, 15);
    }

    #[test]
    fn test_measured_call_forwards_result() {
        let interceptor = MeasuredCall::new(Arc::new(RoutingMetrics::new()));
        let decision = RouteDecision::new(None, Reason::RwApiCall, None);
        let mut calls = 0;

        let result = interceptor.intercept(&context(&decision, false), &mut || {
            calls += 1;
            CallOutcome::Succeeded
        });

        assert!(result.is_ok());
        assert_eq!(calls, 1);
        assert_eq!(interceptor.metrics().snapshot().main_calls, 1);
    }

    #[test]
    fn test_to_json() {
        let metrics = RoutingMetrics::new();
        let decision = RouteDecision::new(Some("select 1"), Reason::ReadOperation, None);
        metrics.record_call(&context(&decision, true), false, 1);

        let parsed: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed["replica_calls"], 1);
    }

    #[test]
    fn test_thread_safety() {
        use std::thread;

        let metrics = Arc::new(RoutingMetrics::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let metrics = Arc::clone(&metrics);
            handles.push(thread::spawn(move || {
                let decision = RouteDecision::new(None, Reason::WriteOperation, None);
                for _ in 0..100 {
                    metrics.record_call(&context(&decision, false), false, 1);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().main_calls, 800);
    }
}
