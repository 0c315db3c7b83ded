//! Physical Connection Contracts
//!
//! The dual connection never talks to a database itself. It drives two
//! physical connections through these traits and forwards their results
//! untouched.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{DualConnectionError, DualResult};

/// Transaction isolation level
///
/// Ordered by the conventional numeric levels, so `level > ReadCommitted`
/// means "stronger than read committed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    None = 0,
    ReadUncommitted = 1,
    ReadCommitted = 2,
    RepeatableRead = 4,
    Serializable = 8,
}

impl IsolationLevel {
    /// Numeric level as used by most drivers.
    pub fn level(&self) -> u8 {
        *self as u8
    }

    /// Whether replica staleness could violate this isolation level.
    pub fn requires_main(&self) -> bool {
        *self > IsolationLevel::ReadCommitted
    }
}

/// Result set scrolling behaviour requested at statement creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultSetType {
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

/// Result set concurrency requested at statement creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concurrency {
    ReadOnly,
    Updatable,
}

/// Result set holdability requested at statement creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Holdability {
    HoldCursorsOverCommit,
    CloseCursorsAtCommit,
}

/// Options carried unchanged to the physical statement constructor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StatementOptions {
    pub result_set_type: Option<ResultSetType>,
    pub concurrency: Option<Concurrency>,
    pub holdability: Option<Holdability>,
}

impl StatementOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result_set_type(mut self, result_set_type: ResultSetType) -> Self {
        self.result_set_type = Some(result_set_type);
        self
    }

    pub fn concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn holdability(mut self, holdability: Holdability) -> Self {
        self.holdability = Some(holdability);
        self
    }
}

/// Bind parameter payload for prepared statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

/// A physical database connection
///
/// Methods take `&self`: the same connection may sit in both the read and
/// the write slot, and statements created from it outlive the borrow.
/// Implementations manage their own interior state.
pub trait Connection: Send + Sync + 'static {
    /// Plain statement type
    type Statement: Statement;
    /// Prepared and callable statement type
    type PreparedStatement: PreparedStatement;

    fn create_statement(&self, options: &StatementOptions) -> DualResult<Self::Statement>;

    fn prepare_statement(
        &self,
        sql: &str,
        options: &StatementOptions,
    ) -> DualResult<Self::PreparedStatement>;

    fn prepare_call(
        &self,
        sql: &str,
        options: &StatementOptions,
    ) -> DualResult<Self::PreparedStatement>;

    fn native_sql(&self, sql: &str) -> DualResult<String>;

    fn set_auto_commit(&self, auto_commit: bool) -> DualResult<()>;

    fn set_transaction_isolation(&self, level: IsolationLevel) -> DualResult<()>;

    fn set_read_only(&self, read_only: bool) -> DualResult<()>;

    fn set_catalog(&self, catalog: &str) -> DualResult<()>;

    fn commit(&self) -> DualResult<()>;

    fn rollback(&self) -> DualResult<()>;

    fn close(&self) -> DualResult<()>;

    // Outside the routed surface: only reached on main once the circuit
    // breaker has tripped. Drivers without the call keep the default.

    fn set_savepoint(&self, _name: Option<&str>) -> DualResult<()> {
        Err(not_implemented("set_savepoint"))
    }

    fn rollback_to_savepoint(&self, _name: &str) -> DualResult<()> {
        Err(not_implemented("rollback_to_savepoint"))
    }

    fn release_savepoint(&self, _name: &str) -> DualResult<()> {
        Err(not_implemented("release_savepoint"))
    }

    fn set_holdability(&self, _holdability: Holdability) -> DualResult<()> {
        Err(not_implemented("set_holdability"))
    }

    fn holdability(&self) -> DualResult<Holdability> {
        Err(not_implemented("holdability"))
    }

    fn set_type_map(&self, _map: HashMap<String, String>) -> DualResult<()> {
        Err(not_implemented("set_type_map"))
    }

    fn type_map(&self) -> DualResult<HashMap<String, String>> {
        Err(not_implemented("type_map"))
    }

    fn set_client_info(&self, _name: &str, _value: &str) -> DualResult<()> {
        Err(not_implemented("set_client_info"))
    }

    fn client_info(&self, _name: &str) -> DualResult<Option<String>> {
        Err(not_implemented("client_info"))
    }

    fn set_network_timeout(&self, _timeout: Duration) -> DualResult<()> {
        Err(not_implemented("set_network_timeout"))
    }

    fn network_timeout(&self) -> DualResult<Duration> {
        Err(not_implemented("network_timeout"))
    }

    fn set_schema(&self, _schema: &str) -> DualResult<()> {
        Err(not_implemented("set_schema"))
    }

    fn schema(&self) -> DualResult<Option<String>> {
        Err(not_implemented("schema"))
    }

    fn warnings(&self) -> DualResult<Vec<String>> {
        Err(not_implemented("warnings"))
    }

    fn clear_warnings(&self) -> DualResult<()> {
        Err(not_implemented("clear_warnings"))
    }

    fn abort(&self) -> DualResult<()> {
        Err(not_implemented("abort"))
    }

    fn is_valid(&self, _timeout: Duration) -> DualResult<bool> {
        Err(not_implemented("is_valid"))
    }
}

/// A physical statement executing ad-hoc SQL
pub trait Statement: Send + 'static {
    /// Rows returned by queries, forwarded untouched
    type ResultSet;

    fn execute_query(&mut self, sql: &str) -> DualResult<Self::ResultSet>;

    fn execute_update(&mut self, sql: &str) -> DualResult<u64>;

    fn execute(&mut self, sql: &str) -> DualResult<bool>;

    fn execute_batch(&mut self) -> DualResult<Vec<u64>>;

    fn result_set(&mut self) -> DualResult<Option<Self::ResultSet>>;

    fn update_count(&mut self) -> DualResult<Option<u64>>;

    fn more_results(&mut self) -> DualResult<bool>;

    fn generated_keys(&mut self) -> DualResult<Self::ResultSet>;

    fn set_query_timeout(&mut self, seconds: u32) -> DualResult<()>;

    fn set_fetch_size(&mut self, rows: u32) -> DualResult<()>;

    fn set_max_field_size(&mut self, bytes: u32) -> DualResult<()>;

    fn close(&mut self) -> DualResult<()>;

    // Outside the routed surface, see `Connection`.

    fn set_max_rows(&mut self, _rows: u64) -> DualResult<()> {
        Err(not_implemented("set_max_rows"))
    }

    fn set_large_max_rows(&mut self, _rows: u64) -> DualResult<()> {
        Err(not_implemented("set_large_max_rows"))
    }

    fn large_max_rows(&mut self) -> DualResult<u64> {
        Err(not_implemented("large_max_rows"))
    }

    fn set_escape_processing(&mut self, _enable: bool) -> DualResult<()> {
        Err(not_implemented("set_escape_processing"))
    }

    fn query_timeout(&mut self) -> DualResult<Duration> {
        Err(not_implemented("query_timeout"))
    }

    fn cancel(&mut self) -> DualResult<()> {
        Err(not_implemented("cancel"))
    }

    fn warnings(&mut self) -> DualResult<Vec<String>> {
        Err(not_implemented("warnings"))
    }

    fn clear_warnings(&mut self) -> DualResult<()> {
        Err(not_implemented("clear_warnings"))
    }

    fn set_cursor_name(&mut self, _name: &str) -> DualResult<()> {
        Err(not_implemented("set_cursor_name"))
    }

    fn set_fetch_direction(&mut self, _direction: i32) -> DualResult<()> {
        Err(not_implemented("set_fetch_direction"))
    }

    fn fetch_direction(&mut self) -> DualResult<i32> {
        Err(not_implemented("fetch_direction"))
    }

    fn fetch_size(&mut self) -> DualResult<u32> {
        Err(not_implemented("fetch_size"))
    }

    fn add_batch(&mut self, _sql: &str) -> DualResult<()> {
        Err(not_implemented("add_batch"))
    }

    fn clear_batch(&mut self) -> DualResult<()> {
        Err(not_implemented("clear_batch"))
    }

    fn set_poolable(&mut self, _poolable: bool) -> DualResult<()> {
        Err(not_implemented("set_poolable"))
    }

    fn is_poolable(&mut self) -> DualResult<bool> {
        Err(not_implemented("is_poolable"))
    }

    fn close_on_completion(&mut self) -> DualResult<()> {
        Err(not_implemented("close_on_completion"))
    }

    fn is_close_on_completion(&mut self) -> DualResult<bool> {
        Err(not_implemented("is_close_on_completion"))
    }
}

/// A physical statement with SQL fixed at creation
pub trait PreparedStatement: Statement {
    /// Bind a parameter; indexes start at 1.
    fn bind(&mut self, index: usize, value: &Value) -> DualResult<()>;

    fn clear_parameters(&mut self) -> DualResult<()>;

    fn execute_prepared_query(&mut self) -> DualResult<Self::ResultSet>;

    fn execute_prepared_update(&mut self) -> DualResult<u64>;

    fn execute_prepared(&mut self) -> DualResult<bool>;

    /// Add the current parameters to the batch. Outside the routed surface.
    fn add_parameter_batch(&mut self) -> DualResult<()> {
        Err(not_implemented("add_parameter_batch"))
    }
}

fn not_implemented(operation: &'static str) -> DualConnectionError {
    DualConnectionError::Unsupported { operation }
}

/// Source of physical connections
///
/// The router never retries or pools here; failures propagate unchanged.
pub trait ConnectionProvider<C>: Send + Sync {
    /// Whether a replica connection can be handed out right now.
    fn is_replica_available(&self) -> bool;

    /// Acquire a connection to the primary.
    fn main_connection(&self) -> DualResult<C>;

    /// Acquire a connection to a replica.
    fn replica_connection(&self) -> DualResult<C>;
}
