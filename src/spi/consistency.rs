//! Replica Consistency Contract
//!
//! A replica may lag. The tracker decides whether it lags too far for the
//! session at hand; the router only asks and obeys.

use crate::errors::DualResult;

/// Tracks the write position a replica must reach before it may serve reads
///
/// Usually shared by every connection talking to one replica topology, hence
/// `Send + Sync`. Failures propagate to the caller untouched; the router does
/// not guess an optimistic or pessimistic default.
pub trait ReplicaConsistency<C>: Send + Sync {
    /// Record the position reached by a commit on `main`.
    fn write(&self, main: &C) -> DualResult<()>;

    /// Whether `replica` reflects every write recorded so far.
    ///
    /// Called on every uncached read-path resolution; keep it cheap.
    fn is_consistent(&self, replica: &C) -> DualResult<bool>;
}
