//! Logical statements
//!
//! Reads go through the statement router's read path, writes through its
//! write path followed by a consistency write on main. Configuration calls
//! are queued. Calls outside the routed surface fail and trip the circuit
//! breaker; once it has tripped they run on the main statement.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::DualResult;
use crate::internal::{PreparedOperation, StatementOperation, StatementRouter};
use crate::routing::{CircuitBreaker, RouteDecision};
use crate::spi::{CallInterceptor, Connection, PreparedStatement, Statement, Value};

/// Result rows of a physical statement
pub type ResultSetOf<S> = <S as Statement>::ResultSet;

/// A logical statement executing ad-hoc SQL
pub struct DualStatement<C: Connection> {
    inner: StatementRouter<C, C::Statement, StatementOperation>,
    interceptor: Arc<dyn CallInterceptor>,
    breaker: Arc<CircuitBreaker>,
}

impl<C: Connection> DualStatement<C> {
    pub(crate) fn new(
        inner: StatementRouter<C, C::Statement, StatementOperation>,
        interceptor: Arc<dyn CallInterceptor>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            inner,
            interceptor,
            breaker,
        }
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Run a query on the read path.
    pub fn execute_query(&mut self, sql: &str) -> DualResult<ResultSetOf<C::Statement>> {
        self.inner
            .read_call(self.interceptor.as_ref(), "execute_query", sql, |statement| {
                statement.execute_query(sql)
            })
    }

    pub fn execute_update(&mut self, sql: &str) -> DualResult<u64> {
        self.inner
            .write_call(self.interceptor.as_ref(), "execute_update", Some(sql), |statement| {
                statement.execute_update(sql)
            })
    }

    /// Run arbitrary SQL. Always on main, since the shape is unknown.
    pub fn execute(&mut self, sql: &str) -> DualResult<bool> {
        self.inner
            .write_call(self.interceptor.as_ref(), "execute", Some(sql), |statement| {
                statement.execute(sql)
            })
    }

    pub fn execute_batch(&mut self) -> DualResult<Vec<u64>> {
        self.inner
            .write_call(self.interceptor.as_ref(), "execute_batch", None, |statement| {
                statement.execute_batch()
            })
    }

    // =========================================================================
    // Results of the bound statement
    // =========================================================================

    pub fn result_set(&mut self) -> DualResult<Option<ResultSetOf<C::Statement>>> {
        self.inner.current_mut()?.result_set()
    }

    pub fn update_count(&mut self) -> DualResult<Option<u64>> {
        self.inner.current_mut()?.update_count()
    }

    pub fn more_results(&mut self) -> DualResult<bool> {
        self.inner.current_mut()?.more_results()
    }

    pub fn generated_keys(&mut self) -> DualResult<ResultSetOf<C::Statement>> {
        self.inner.current_mut()?.generated_keys()
    }

    // =========================================================================
    // Queued configuration
    // =========================================================================

    pub fn set_query_timeout(&mut self, seconds: u32) {
        self.inner.defer(StatementOperation::QueryTimeout(seconds));
    }

    pub fn set_fetch_size(&mut self, rows: u32) {
        self.inner.defer(StatementOperation::FetchSize(rows));
    }

    pub fn set_max_field_size(&mut self, bytes: u32) {
        self.inner.defer(StatementOperation::MaxFieldSize(bytes));
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Whether the statement is not bound to its write-path statement.
    pub fn is_read_only_binding(&self) -> bool {
        self.inner.is_read_only_binding()
    }

    pub fn last_decision(&self) -> Option<&RouteDecision> {
        self.inner.last_decision()
    }

    /// Close every physical statement created so far.
    pub fn close(&mut self) -> DualResult<()> {
        self.inner.close()
    }

    // =========================================================================
    // Outside the routed surface
    // =========================================================================

    fn on_main<T>(
        &mut self,
        operation: &'static str,
        call: impl FnOnce(&mut C::Statement) -> DualResult<T>,
    ) -> DualResult<T> {
        if !self.breaker.is_tripped() {
            return Err(self.breaker.reject(operation));
        }
        self.inner.main_call(call)
    }

    pub fn set_max_rows(&mut self, rows: u64) -> DualResult<()> {
        self.on_main("set_max_rows", |main| main.set_max_rows(rows))
    }

    pub fn set_large_max_rows(&mut self, rows: u64) -> DualResult<()> {
        self.on_main("set_large_max_rows", |main| main.set_large_max_rows(rows))
    }

    pub fn large_max_rows(&mut self) -> DualResult<u64> {
        self.on_main("large_max_rows", |main| main.large_max_rows())
    }

    pub fn set_escape_processing(&mut self, enable: bool) -> DualResult<()> {
        self.on_main("set_escape_processing", |main| main.set_escape_processing(enable))
    }

    pub fn query_timeout(&mut self) -> DualResult<Duration> {
        self.on_main("query_timeout", |main| main.query_timeout())
    }

    pub fn cancel(&mut self) -> DualResult<()> {
        self.on_main("cancel", |main| main.cancel())
    }

    pub fn warnings(&mut self) -> DualResult<Vec<String>> {
        self.on_main("warnings", |main| main.warnings())
    }

    pub fn clear_warnings(&mut self) -> DualResult<()> {
        self.on_main("clear_warnings", |main| main.clear_warnings())
    }

    pub fn set_cursor_name(&mut self, name: &str) -> DualResult<()> {
        self.on_main("set_cursor_name", |main| main.set_cursor_name(name))
    }

    pub fn set_fetch_direction(&mut self, direction: i32) -> DualResult<()> {
        self.on_main("set_fetch_direction", |main| main.set_fetch_direction(direction))
    }

    pub fn fetch_direction(&mut self) -> DualResult<i32> {
        self.on_main("fetch_direction", |main| main.fetch_direction())
    }

    pub fn fetch_size(&mut self) -> DualResult<u32> {
        self.on_main("fetch_size", |main| main.fetch_size())
    }

    pub fn add_batch(&mut self, sql: &str) -> DualResult<()> {
        self.on_main("add_batch", |main| main.add_batch(sql))
    }

    pub fn clear_batch(&mut self) -> DualResult<()> {
        self.on_main("clear_batch", |main| main.clear_batch())
    }

    pub fn set_poolable(&mut self, poolable: bool) -> DualResult<()> {
        self.on_main("set_poolable", |main| main.set_poolable(poolable))
    }

    pub fn is_poolable(&mut self) -> DualResult<bool> {
        self.on_main("is_poolable", |main| main.is_poolable())
    }

    pub fn close_on_completion(&mut self) -> DualResult<()> {
        self.on_main("close_on_completion", |main| main.close_on_completion())
    }

    pub fn is_close_on_completion(&mut self) -> DualResult<bool> {
        self.on_main("is_close_on_completion", |main| main.is_close_on_completion())
    }
}

/// A logical prepared statement; its fixed SQL decides routing
pub struct DualPreparedStatement<C: Connection> {
    sql: String,
    inner: StatementRouter<C, C::PreparedStatement, PreparedOperation>,
    interceptor: Arc<dyn CallInterceptor>,
    breaker: Arc<CircuitBreaker>,
}

/// Stored procedure calls route like prepared statements
pub type DualCallableStatement<C> = DualPreparedStatement<C>;

impl<C: Connection> DualPreparedStatement<C> {
    pub(crate) fn new(
        sql: &str,
        inner: StatementRouter<C, C::PreparedStatement, PreparedOperation>,
        interceptor: Arc<dyn CallInterceptor>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            sql: sql.to_string(),
            inner,
            interceptor,
            breaker,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn execute_query(&mut self) -> DualResult<ResultSetOf<C::PreparedStatement>> {
        self.inner.read_call(
            self.interceptor.as_ref(),
            "execute_query",
            &self.sql,
            |statement| statement.execute_prepared_query(),
        )
    }

    pub fn execute_update(&mut self) -> DualResult<u64> {
        self.inner.write_call(
            self.interceptor.as_ref(),
            "execute_update",
            Some(&self.sql),
            |statement| statement.execute_prepared_update(),
        )
    }

    pub fn execute(&mut self) -> DualResult<bool> {
        self.inner.write_call(
            self.interceptor.as_ref(),
            "execute",
            Some(&self.sql),
            |statement| statement.execute_prepared(),
        )
    }

    pub fn execute_batch(&mut self) -> DualResult<Vec<u64>> {
        self.inner.write_call(
            self.interceptor.as_ref(),
            "execute_batch",
            Some(&self.sql),
            |statement| statement.execute_batch(),
        )
    }

    // =========================================================================
    // Queued parameters and configuration
    // =========================================================================

    /// Bind parameter `index` (1-based) at the next execute.
    pub fn bind(&mut self, index: usize, value: impl Into<Value>) {
        self.inner.defer(PreparedOperation::Bind(index, value.into()));
    }

    pub fn clear_parameters(&mut self) {
        self.inner.defer(PreparedOperation::ClearParameters);
    }

    pub fn set_query_timeout(&mut self, seconds: u32) {
        self.inner
            .defer(StatementOperation::QueryTimeout(seconds).into());
    }

    pub fn set_fetch_size(&mut self, rows: u32) {
        self.inner.defer(StatementOperation::FetchSize(rows).into());
    }

    pub fn set_max_field_size(&mut self, bytes: u32) {
        self.inner.defer(StatementOperation::MaxFieldSize(bytes).into());
    }

    // =========================================================================
    // Results and state
    // =========================================================================

    pub fn result_set(&mut self) -> DualResult<Option<ResultSetOf<C::PreparedStatement>>> {
        self.inner.current_mut()?.result_set()
    }

    pub fn update_count(&mut self) -> DualResult<Option<u64>> {
        self.inner.current_mut()?.update_count()
    }

    pub fn more_results(&mut self) -> DualResult<bool> {
        self.inner.current_mut()?.more_results()
    }

    pub fn generated_keys(&mut self) -> DualResult<ResultSetOf<C::PreparedStatement>> {
        self.inner.current_mut()?.generated_keys()
    }

    pub fn is_read_only_binding(&self) -> bool {
        self.inner.is_read_only_binding()
    }

    pub fn last_decision(&self) -> Option<&RouteDecision> {
        self.inner.last_decision()
    }

    pub fn close(&mut self) -> DualResult<()> {
        self.inner.close()
    }

    // =========================================================================
    // Outside the routed surface
    // =========================================================================

    fn on_main<T>(
        &mut self,
        operation: &'static str,
        call: impl FnOnce(&mut C::PreparedStatement) -> DualResult<T>,
    ) -> DualResult<T> {
        if !self.breaker.is_tripped() {
            return Err(self.breaker.reject(operation));
        }
        self.inner.main_call(call)
    }

    pub fn set_max_rows(&mut self, rows: u64) -> DualResult<()> {
        self.on_main("set_max_rows", |main| main.set_max_rows(rows))
    }

    pub fn cancel(&mut self) -> DualResult<()> {
        self.on_main("cancel", |main| main.cancel())
    }

    /// Add the current parameters to the batch.
    pub fn add_batch(&mut self) -> DualResult<()> {
        self.on_main("add_batch", |main| main.add_parameter_batch())
    }

    pub fn clear_batch(&mut self) -> DualResult<()> {
        self.on_main("clear_batch", |main| main.clear_batch())
    }

    pub fn warnings(&mut self) -> DualResult<Vec<String>> {
        self.on_main("warnings", |main| main.warnings())
    }

    pub fn clear_warnings(&mut self) -> DualResult<()> {
        self.on_main("clear_warnings", |main| main.clear_warnings())
    }

    pub fn close_on_completion(&mut self) -> DualResult<()> {
        self.on_main("close_on_completion", |main| main.close_on_completion())
    }

    pub fn is_close_on_completion(&mut self) -> DualResult<bool> {
        self.on_main("is_close_on_completion", |main| main.is_close_on_completion())
    }
}
