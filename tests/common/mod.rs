//! Recording test doubles shared by the integration tests
//!
//! Every physical call lands in one shared log as `<connection>.<call>`,
//! e.g. `replica-1.close` or `main-1.stmt.execute_query(select 1)`.
//! Connections are named by kind and acquisition order.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dual_connection::spi::{
    Connection, ConnectionProvider, IsolationLevel, PreparedStatement, ReplicaConsistency,
    Statement, StatementOptions, Value,
};
use dual_connection::{
    CircuitBreaker, DualConnection, DualConnectionBuilder, DualConnectionError, DualResult,
};

pub type CallLog = Arc<Mutex<Vec<String>>>;

fn driver_failure(message: &str) -> DualConnectionError {
    DualConnectionError::driver(io::Error::new(io::ErrorKind::Other, message.to_string()))
}

// =============================================================================
// Physical connection and statements
// =============================================================================

#[derive(Debug)]
pub struct MockConnection {
    pub name: String,
    log: CallLog,
    fail_close: bool,
}

impl MockConnection {
    fn record(&self, call: impl AsRef<str>) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}.{}", self.name, call.as_ref()));
    }

    fn statement(&self) -> MockStatement {
        MockStatement {
            connection: self.name.clone(),
            log: Arc::clone(&self.log),
            fail_close: self.fail_close,
        }
    }
}

impl Connection for MockConnection {
    type Statement = MockStatement;
    type PreparedStatement = MockStatement;

    fn create_statement(&self, _options: &StatementOptions) -> DualResult<MockStatement> {
        self.record("create_statement");
        Ok(self.statement())
    }

    fn prepare_statement(&self, sql: &str, _options: &StatementOptions) -> DualResult<MockStatement> {
        self.record(format!("prepare_statement({})", sql));
        Ok(self.statement())
    }

    fn prepare_call(&self, sql: &str, _options: &StatementOptions) -> DualResult<MockStatement> {
        self.record(format!("prepare_call({})", sql));
        Ok(self.statement())
    }

    fn native_sql(&self, sql: &str) -> DualResult<String> {
        self.record("native_sql");
        Ok(format!("{}:{}", self.name, sql))
    }

    fn set_auto_commit(&self, auto_commit: bool) -> DualResult<()> {
        self.record(format!("set_auto_commit({})", auto_commit));
        Ok(())
    }

    fn set_transaction_isolation(&self, level: IsolationLevel) -> DualResult<()> {
        self.record(format!("set_transaction_isolation({:?})", level));
        Ok(())
    }

    fn set_read_only(&self, read_only: bool) -> DualResult<()> {
        self.record(format!("set_read_only({})", read_only));
        Ok(())
    }

    fn set_catalog(&self, catalog: &str) -> DualResult<()> {
        self.record(format!("set_catalog({})", catalog));
        Ok(())
    }

    fn commit(&self) -> DualResult<()> {
        self.record("commit");
        Ok(())
    }

    fn rollback(&self) -> DualResult<()> {
        self.record("rollback");
        Ok(())
    }

    fn close(&self) -> DualResult<()> {
        self.record("close");
        if self.fail_close {
            return Err(driver_failure(&format!("{} close failed", self.name)));
        }
        Ok(())
    }

    fn set_savepoint(&self, name: Option<&str>) -> DualResult<()> {
        self.record(format!("set_savepoint({})", name.unwrap_or("unnamed")));
        Ok(())
    }

    fn set_schema(&self, schema: &str) -> DualResult<()> {
        self.record(format!("set_schema({})", schema));
        Ok(())
    }
}

/// Query results are `<connection>:<sql>` so tests see where a query ran
#[derive(Debug)]
pub struct MockStatement {
    connection: String,
    log: CallLog,
    fail_close: bool,
}

impl MockStatement {
    fn record(&self, call: impl AsRef<str>) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}.stmt.{}", self.connection, call.as_ref()));
    }
}

impl Statement for MockStatement {
    type ResultSet = String;

    fn execute_query(&mut self, sql: &str) -> DualResult<String> {
        self.record(format!("execute_query({})", sql));
        Ok(format!("{}:{}", self.connection, sql))
    }

    fn execute_update(&mut self, sql: &str) -> DualResult<u64> {
        self.record(format!("execute_update({})", sql));
        Ok(1)
    }

    fn execute(&mut self, sql: &str) -> DualResult<bool> {
        self.record(format!("execute({})", sql));
        Ok(false)
    }

    fn execute_batch(&mut self) -> DualResult<Vec<u64>> {
        self.record("execute_batch");
        Ok(vec![1, 1])
    }

    fn result_set(&mut self) -> DualResult<Option<String>> {
        self.record("result_set");
        Ok(Some(self.connection.clone()))
    }

    fn update_count(&mut self) -> DualResult<Option<u64>> {
        self.record("update_count");
        Ok(Some(1))
    }

    fn more_results(&mut self) -> DualResult<bool> {
        Ok(false)
    }

    fn generated_keys(&mut self) -> DualResult<String> {
        Ok(format!("{}:keys", self.connection))
    }

    fn set_query_timeout(&mut self, seconds: u32) -> DualResult<()> {
        self.record(format!("set_query_timeout({})", seconds));
        Ok(())
    }

    fn set_fetch_size(&mut self, rows: u32) -> DualResult<()> {
        self.record(format!("set_fetch_size({})", rows));
        Ok(())
    }

    fn set_max_field_size(&mut self, bytes: u32) -> DualResult<()> {
        self.record(format!("set_max_field_size({})", bytes));
        Ok(())
    }

    fn close(&mut self) -> DualResult<()> {
        self.record("close");
        if self.fail_close {
            return Err(driver_failure(&format!("{} statement close failed", self.connection)));
        }
        Ok(())
    }

    fn cancel(&mut self) -> DualResult<()> {
        self.record("cancel");
        Ok(())
    }

    fn is_close_on_completion(&mut self) -> DualResult<bool> {
        self.record("is_close_on_completion");
        Ok(false)
    }
}

impl PreparedStatement for MockStatement {
    fn bind(&mut self, index: usize, value: &Value) -> DualResult<()> {
        self.record(format!("bind({}, {:?})", index, value));
        Ok(())
    }

    fn clear_parameters(&mut self) -> DualResult<()> {
        self.record("clear_parameters");
        Ok(())
    }

    fn execute_prepared_query(&mut self) -> DualResult<String> {
        self.record("execute_prepared_query");
        Ok(self.connection.clone())
    }

    fn execute_prepared_update(&mut self) -> DualResult<u64> {
        self.record("execute_prepared_update");
        Ok(1)
    }

    fn execute_prepared(&mut self) -> DualResult<bool> {
        self.record("execute_prepared");
        Ok(false)
    }

    fn add_parameter_batch(&mut self) -> DualResult<()> {
        self.record("add_parameter_batch");
        Ok(())
    }
}

// =============================================================================
// Provider
// =============================================================================

#[derive(Debug)]
pub struct MockProvider {
    pub log: CallLog,
    replica_available: AtomicBool,
    mains: AtomicUsize,
    replicas: AtomicUsize,
    fail_main_close: AtomicBool,
    fail_replica_close: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(Vec::new())),
            replica_available: AtomicBool::new(true),
            mains: AtomicUsize::new(0),
            replicas: AtomicUsize::new(0),
            fail_main_close: AtomicBool::new(false),
            fail_replica_close: AtomicBool::new(false),
        })
    }

    pub fn without_replica() -> Arc<Self> {
        let provider = Self::new();
        provider.replica_available.store(false, Ordering::SeqCst);
        provider
    }

    pub fn fail_closes(&self, main: bool, replica: bool) {
        self.fail_main_close.store(main, Ordering::SeqCst);
        self.fail_replica_close.store(replica, Ordering::SeqCst);
    }

    pub fn main_acquisitions(&self) -> usize {
        self.mains.load(Ordering::SeqCst)
    }

    pub fn replica_acquisitions(&self) -> usize {
        self.replicas.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Calls recorded so far that start with `prefix`
    pub fn calls_on(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }
}

impl ConnectionProvider<MockConnection> for MockProvider {
    fn is_replica_available(&self) -> bool {
        self.replica_available.load(Ordering::SeqCst)
    }

    fn main_connection(&self) -> DualResult<MockConnection> {
        let n = self.mains.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConnection {
            name: format!("main-{}", n),
            log: Arc::clone(&self.log),
            fail_close: self.fail_main_close.load(Ordering::SeqCst),
        })
    }

    fn replica_connection(&self) -> DualResult<MockConnection> {
        let n = self.replicas.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConnection {
            name: format!("replica-{}", n),
            log: Arc::clone(&self.log),
            fail_close: self.fail_replica_close.load(Ordering::SeqCst),
        })
    }
}

// =============================================================================
// Consistency trackers
// =============================================================================

/// Answers consistency checks from a script, then from a fallback.
/// Counts checks and recorded writes.
#[derive(Debug)]
pub struct ScriptedConsistency {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    failing: bool,
    checks: AtomicUsize,
    writes: Mutex<Vec<String>>,
}

impl ScriptedConsistency {
    fn build(script: &[bool], fallback: bool, failing: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            fallback,
            failing,
            checks: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        })
    }

    /// Replicas are always caught up
    pub fn permanent() -> Arc<Self> {
        Self::build(&[], true, false)
    }

    /// Replicas never catch up
    pub fn never() -> Arc<Self> {
        Self::build(&[], false, false)
    }

    /// Replays `answers`, then reports inconsistent
    pub fn sequence(answers: &[bool]) -> Arc<Self> {
        Self::build(answers, false, false)
    }

    /// Every check fails with a driver error
    pub fn failing() -> Arc<Self> {
        Self::build(&[], false, true)
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    /// Names of the main connections writes were recorded on
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

impl ReplicaConsistency<MockConnection> for ScriptedConsistency {
    fn write(&self, main: &MockConnection) -> DualResult<()> {
        self.writes.lock().unwrap().push(main.name.clone());
        Ok(())
    }

    fn is_consistent(&self, _replica: &MockConnection) -> DualResult<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(driver_failure("consistency tracker unreachable"));
        }
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or(self.fallback))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Builder over the mocks, not yet given a breaker
pub fn builder(
    provider: &Arc<MockProvider>,
    consistency: &Arc<ScriptedConsistency>,
) -> DualConnectionBuilder<MockConnection> {
    let provider: Arc<dyn ConnectionProvider<MockConnection>> = provider.clone();
    let consistency: Arc<dyn ReplicaConsistency<MockConnection>> = consistency.clone();
    DualConnection::builder(provider, consistency)
}

/// Dual connection with its own circuit breaker
pub fn connect(
    provider: &Arc<MockProvider>,
    consistency: &Arc<ScriptedConsistency>,
) -> DualConnection<MockConnection> {
    builder(provider, consistency)
        .circuit_breaker(Arc::new(CircuitBreaker::new()))
        .build()
}
