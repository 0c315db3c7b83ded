//! Read Routing Tests
//!
//! Where reads go on a fresh session:
//! - consistent replica serves plain reads
//! - lagging replica is closed and the read falls back to main
//! - strong isolation, locks and function calls go to main
//! - without a replica the read path is main itself

mod common;

use std::sync::Arc;

use common::{connect, MockConnection, MockProvider, ScriptedConsistency};
use dual_connection::internal::ConnectionRouter;
use dual_connection::spi::{ConnectionProvider, IsolationLevel, ReplicaConsistency};
use dual_connection::{CircuitBreaker, DualConnectionError, Reason};

fn direct_router(
    provider: &Arc<MockProvider>,
    consistency: &Arc<ScriptedConsistency>,
) -> ConnectionRouter<MockConnection> {
    let provider: Arc<dyn ConnectionProvider<MockConnection>> = provider.clone();
    let consistency: Arc<dyn ReplicaConsistency<MockConnection>> = consistency.clone();
    ConnectionRouter::new(provider, consistency, Arc::new(CircuitBreaker::new()))
}

// =============================================================================
// Replica Reads
// =============================================================================

/// A plain query on a fresh session runs on a consistent replica.
#[test]
fn test_plain_query_runs_on_replica() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::permanent();
    let connection = connect(&provider, &consistency);

    let mut statement = connection.create_statement();
    let rows = statement.execute_query("SELECT * FROM issue").unwrap();

    assert_eq!(rows, "replica-1:SELECT * FROM issue");
    assert_eq!(provider.main_acquisitions(), 0);
    assert_eq!(consistency.checks(), 1);
    assert!(statement.is_read_only_binding());

    let decision = statement.last_decision().unwrap();
    assert_eq!(decision.reason(), Reason::ReadOperation);
    assert!(!decision.is_run_on_main());
    assert_eq!(decision.is_write(), Some(false));
}

/// Repeated queries on one statement reuse its physical statement.
#[test]
fn test_bound_statement_is_reused() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::permanent();
    let connection = connect(&provider, &consistency);

    let mut statement = connection.create_statement();
    statement.execute_query("SELECT 1").unwrap();
    statement.execute_query("SELECT 2").unwrap();

    assert_eq!(provider.count("replica-1.create_statement"), 1);
    assert_eq!(provider.replica_acquisitions(), 1);
    assert_eq!(consistency.checks(), 1);
}

// =============================================================================
// Consistency Fallback
// =============================================================================

/// A lagging replica is closed and the query runs on main.
#[test]
fn test_inconsistent_replica_falls_back_to_main() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::never();
    let connection = connect(&provider, &consistency);

    let mut statement = connection.create_statement();
    let rows = statement.execute_query("SELECT * FROM issue").unwrap();

    assert_eq!(rows, "main-1:SELECT * FROM issue");
    assert_eq!(provider.count("replica-1.close"), 1);
    assert_eq!(
        statement.last_decision().unwrap().reason(),
        Reason::ReplicaInconsistent
    );
}

/// The fallback is not memoized: each resolution asks the tracker again.
#[test]
fn test_fallback_is_reevaluated_each_time() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::never();
    let mut router = direct_router(&provider, &consistency);

    let (_, first) = router.read_connection().unwrap();
    let (_, second) = router.read_connection().unwrap();

    assert_eq!(first, Reason::ReplicaInconsistent);
    assert_eq!(second, Reason::ReplicaInconsistent);
    assert_eq!(consistency.checks(), 2);
    assert_eq!(provider.replica_acquisitions(), 2);
    assert_eq!(provider.main_acquisitions(), 1);
}

/// A replica that catches up is used again on the next resolution.
#[test]
fn test_replica_used_once_caught_up() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::sequence(&[false, true]);
    let mut router = direct_router(&provider, &consistency);

    let (first, first_reason) = router.read_connection().unwrap();
    let (second, second_reason) = router.read_connection().unwrap();

    assert_eq!(first.name, "main-1");
    assert_eq!(first_reason, Reason::ReplicaInconsistent);
    assert_eq!(second.name, "replica-2");
    assert_eq!(second_reason, Reason::ReadOperation);
}

/// Tracker failures surface to the caller unchanged.
#[test]
fn test_consistency_failure_propagates() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::failing();
    let connection = connect(&provider, &consistency);

    let mut statement = connection.create_statement();
    let err = statement.execute_query("SELECT 1").unwrap_err();

    assert!(matches!(err, DualConnectionError::Driver(_)));
    assert_eq!(err.to_string(), "consistency tracker unreachable");
}

// =============================================================================
// Main-only Reads
// =============================================================================

/// Isolation above read committed never reads from a replica.
#[test]
fn test_strong_isolation_reads_main() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::permanent();
    let connection = connect(&provider, &consistency);
    connection
        .set_transaction_isolation(IsolationLevel::RepeatableRead)
        .unwrap();

    let mut statement = connection.create_statement();
    let rows = statement.execute_query("SELECT 1").unwrap();

    assert_eq!(rows, "main-1:SELECT 1");
    assert_eq!(provider.replica_acquisitions(), 0);
    assert_eq!(consistency.checks(), 0);
    assert_eq!(
        statement.last_decision().unwrap().reason(),
        Reason::HighTransactionIsolationLevel
    );
}

/// Read committed still reads from the replica.
#[test]
fn test_read_committed_reads_replica() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::permanent();
    let connection = connect(&provider, &consistency);
    connection
        .set_transaction_isolation(IsolationLevel::ReadCommitted)
        .unwrap();

    let mut statement = connection.create_statement();
    assert_eq!(statement.execute_query("SELECT 1").unwrap(), "replica-1:SELECT 1");
    assert!(provider
        .calls()
        .contains(&"replica-1.set_transaction_isolation(ReadCommitted)".to_string()));
}

/// Locking reads run on main with reason LOCK.
#[test]
fn test_select_for_update_reads_main() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::permanent();
    let connection = connect(&provider, &consistency);

    let mut statement = connection.create_statement();
    let rows = statement
        .execute_query("SELECT * FROM issue WHERE id = 1 FOR UPDATE  ")
        .unwrap();

    assert!(rows.starts_with("main-1:"));
    assert_eq!(provider.replica_acquisitions(), 0);
    let decision = statement.last_decision().unwrap();
    assert_eq!(decision.reason(), Reason::Lock);
    assert_eq!(decision.is_write(), Some(false));
    assert!(!statement.is_read_only_binding());
}

/// Function calls may write, so they run on main.
#[test]
fn test_function_call_reads_main() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::permanent();
    let connection = connect(&provider, &consistency);

    let mut statement = connection.create_statement();
    let rows = statement.execute_query("SELECT nextval('issue_seq')").unwrap();

    assert!(rows.starts_with("main-1:"));
    assert_eq!(
        statement.last_decision().unwrap().reason(),
        Reason::WriteOperation
    );
}

/// Parentheses after WHERE are not a function call.
#[test]
fn test_parenthesized_predicate_reads_replica() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::permanent();
    let connection = connect(&provider, &consistency);

    let mut statement = connection.create_statement();
    let rows = statement
        .execute_query("SELECT * FROM issue WHERE id IN (1, 2)")
        .unwrap();

    assert!(rows.starts_with("replica-1:"));
}

// =============================================================================
// Replica Unavailable
// =============================================================================

/// Without a replica, reads use main and the read slot is main itself.
#[test]
fn test_unavailable_replica_reads_main() {
    let provider = MockProvider::without_replica();
    let consistency = ScriptedConsistency::never();
    let connection = connect(&provider, &consistency);

    let mut statement = connection.create_statement();
    let rows = statement.execute_query("SELECT 1").unwrap();

    assert_eq!(rows, "main-1:SELECT 1");
    assert_eq!(provider.main_acquisitions(), 1);
    assert_eq!(provider.count("main-1.close"), 0);
    assert_eq!(
        statement.last_decision().unwrap().reason(),
        Reason::ReplicaUnavailable
    );
}

/// Prepared statements classify their fixed SQL.
#[test]
fn test_prepared_query_routes_by_fixed_sql() {
    let provider = MockProvider::new();
    let consistency = ScriptedConsistency::permanent();
    let connection = connect(&provider, &consistency);

    let mut read = connection.prepare_statement("SELECT * FROM issue WHERE id = ?");
    assert_eq!(read.execute_query().unwrap(), "replica-1");

    let mut lock = connection.prepare_statement("SELECT * FROM issue WHERE id = ? for update");
    assert_eq!(lock.execute_query().unwrap(), "main-1");
    assert_eq!(lock.last_decision().unwrap().reason(), Reason::Lock);
}
