//! Logical connection
//!
//! Looks like one database connection to the application while routing
//! every statement between a replica and main.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::config::DualConnectionConfig;
use crate::errors::DualResult;
use crate::internal::{lock, ConnectionRouter, SharedRouter, StatementRouter};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::routing::{CircuitBreaker, Reason, RouteDecision};
use crate::spi::{
    forward, CallContext, CallInterceptor, Connection, ConnectionProvider, ForwardCall,
    Holdability, IsolationLevel, ReplicaConsistency, StatementOptions, Value,
};

use super::statement::{DualPreparedStatement, DualStatement};

/// Builder for [`DualConnection`]
pub struct DualConnectionBuilder<C: Connection> {
    provider: Arc<dyn ConnectionProvider<C>>,
    consistency: Arc<dyn ReplicaConsistency<C>>,
    interceptor: Arc<dyn CallInterceptor>,
    breaker: Option<Arc<CircuitBreaker>>,
    config: DualConnectionConfig,
}

impl<C: Connection> DualConnectionBuilder<C> {
    /// Hook wrapped around every executed call (default: forward unchanged).
    pub fn call_interceptor(mut self, interceptor: Arc<dyn CallInterceptor>) -> Self {
        self.interceptor = interceptor;
        self
    }

    /// Use this breaker instead of the one the config selects.
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn config(mut self, config: DualConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the connection. No physical connection is acquired yet.
    ///
    /// A configured log level is applied process-wide.
    pub fn build(self) -> DualConnection<C> {
        if let Some(severity) = self.config.severity() {
            Logger::set_min_severity(severity);
        }

        let breaker = match self.breaker {
            Some(breaker) => breaker,
            None if self.config.isolated_circuit_breaker => Arc::new(CircuitBreaker::new()),
            None => CircuitBreaker::shared(),
        };

        let id = Uuid::new_v4();
        let router = ConnectionRouter::with_id(
            id,
            self.provider,
            self.consistency,
            Arc::clone(&breaker),
        );

        DualConnection {
            id,
            router: Arc::new(Mutex::new(router)),
            breaker,
            interceptor: self.interceptor,
            config: self.config,
        }
    }
}

/// A logical connection over a main and a replica database
pub struct DualConnection<C: Connection> {
    id: Uuid,
    router: SharedRouter<C>,
    breaker: Arc<CircuitBreaker>,
    interceptor: Arc<dyn CallInterceptor>,
    config: DualConnectionConfig,
}

impl<C: Connection> DualConnection<C> {
    pub fn builder(
        provider: Arc<dyn ConnectionProvider<C>>,
        consistency: Arc<dyn ReplicaConsistency<C>>,
    ) -> DualConnectionBuilder<C> {
        DualConnectionBuilder {
            provider,
            consistency,
            interceptor: Arc::new(ForwardCall),
            breaker: None,
            config: DualConnectionConfig::default(),
        }
    }

    /// Identifier attached to this connection's log lines
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn create_statement(&self) -> DualStatement<C> {
        self.create_statement_with(StatementOptions::new())
    }

    /// Create a statement whose physical statements get `options`.
    pub fn create_statement_with(&self, options: StatementOptions) -> DualStatement<C> {
        let inner = StatementRouter::new(
            Arc::clone(&self.router),
            Arc::clone(&self.breaker),
            Box::new(move |connection: &C| connection.create_statement(&options)),
            self.config.statement_routing(),
        );
        DualStatement::new(inner, Arc::clone(&self.interceptor), Arc::clone(&self.breaker))
    }

    pub fn prepare_statement(&self, sql: &str) -> DualPreparedStatement<C> {
        self.prepare_statement_with(sql, StatementOptions::new())
    }

    /// Prepare `sql`; the SQL decides routing at each execute.
    pub fn prepare_statement_with(
        &self,
        sql: &str,
        options: StatementOptions,
    ) -> DualPreparedStatement<C> {
        let fixed = sql.to_string();
        let inner = StatementRouter::new(
            Arc::clone(&self.router),
            Arc::clone(&self.breaker),
            Box::new(move |connection: &C| connection.prepare_statement(&fixed, &options)),
            self.config.statement_routing(),
        );
        DualPreparedStatement::new(
            sql,
            inner,
            Arc::clone(&self.interceptor),
            Arc::clone(&self.breaker),
        )
    }

    pub fn prepare_call(&self, sql: &str) -> DualPreparedStatement<C> {
        self.prepare_call_with(sql, StatementOptions::new())
    }

    /// Prepare a stored procedure call.
    pub fn prepare_call_with(
        &self,
        sql: &str,
        options: StatementOptions,
    ) -> DualPreparedStatement<C> {
        let fixed = sql.to_string();
        let inner = StatementRouter::new(
            Arc::clone(&self.router),
            Arc::clone(&self.breaker),
            Box::new(move |connection: &C| connection.prepare_call(&fixed, &options)),
            self.config.statement_routing(),
        );
        DualPreparedStatement::new(
            sql,
            inner,
            Arc::clone(&self.interceptor),
            Arc::clone(&self.breaker),
        )
    }

    /// Translate `sql` to the driver's native grammar. Always on main.
    pub fn native_sql(&self, sql: &str) -> DualResult<String> {
        let decision = RouteDecision::classified(Some(sql), Reason::RwApiCall, None);
        let connection = {
            let mut router = lock(&self.router)?;
            let connection = router.write_connection()?;
            router.mark_main(&decision);
            connection
        };
        if self.config.trace_decisions {
            let rendered = decision.to_json();
            log_event_with_fields(Event::RouteDecided, &[("decision", rendered.as_str())]);
        }
        let context = CallContext {
            method: "native_sql",
            decision: &decision,
            read_only_binding: false,
        };
        forward(self.interceptor.as_ref(), &context, || connection.native_sql(sql))
    }

    // =========================================================================
    // Session state
    // =========================================================================

    pub fn set_auto_commit(&self, auto_commit: bool) -> DualResult<()> {
        lock(&self.router)?.set_auto_commit(auto_commit)
    }

    pub fn auto_commit(&self) -> DualResult<bool> {
        Ok(lock(&self.router)?.auto_commit())
    }

    pub fn set_transaction_isolation(&self, level: IsolationLevel) -> DualResult<()> {
        lock(&self.router)?.set_transaction_isolation(level);
        Ok(())
    }

    pub fn transaction_isolation(&self) -> DualResult<Option<IsolationLevel>> {
        Ok(lock(&self.router)?.transaction_isolation())
    }

    pub fn set_read_only(&self, read_only: bool) -> DualResult<()> {
        lock(&self.router)?.set_read_only(read_only);
        Ok(())
    }

    /// Read-only flag as last set by the application; unset means false.
    pub fn is_read_only(&self) -> DualResult<bool> {
        Ok(lock(&self.router)?.read_only().unwrap_or(false))
    }

    pub fn set_catalog(&self, catalog: &str) -> DualResult<()> {
        lock(&self.router)?.set_catalog(catalog);
        Ok(())
    }

    pub fn catalog(&self) -> DualResult<Option<String>> {
        Ok(lock(&self.router)?.catalog().map(str::to_string))
    }

    /// The decision that first put this session on main, if any.
    pub fn route_cause(&self) -> DualResult<Option<RouteDecision>> {
        Ok(lock(&self.router)?.route_cause().cloned())
    }

    // =========================================================================
    // Transactions and lifecycle
    // =========================================================================

    pub fn commit(&self) -> DualResult<()> {
        lock(&self.router)?.commit()
    }

    pub fn rollback(&self) -> DualResult<()> {
        lock(&self.router)?.rollback()
    }

    /// Close both physical connections; the last failure is returned.
    pub fn close(&self) -> DualResult<()> {
        lock(&self.router)?.close()
    }

    pub fn is_closed(&self) -> DualResult<bool> {
        Ok(lock(&self.router)?.is_closed())
    }

    // =========================================================================
    // Outside the routed surface
    // =========================================================================

    /// Fail and trip the breaker; once it has tripped, run on main instead.
    fn on_main<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&C) -> DualResult<T>,
    ) -> DualResult<T> {
        if !self.breaker.is_tripped() {
            return Err(self.breaker.reject(operation));
        }
        let connection = {
            let mut router = lock(&self.router)?;
            let connection = router.write_connection()?;
            router.mark_main(&RouteDecision::new(None, Reason::CircuitBreakerTripped, None));
            connection
        };
        call(connection.as_ref())
    }

    fn unsupported<T>(&self, operation: &'static str) -> DualResult<T> {
        Err(self.breaker.reject(operation))
    }

    pub fn set_savepoint(&self, name: Option<&str>) -> DualResult<()> {
        self.on_main("set_savepoint", |main| main.set_savepoint(name))
    }

    pub fn rollback_to_savepoint(&self, name: &str) -> DualResult<()> {
        self.on_main("rollback_to_savepoint", |main| main.rollback_to_savepoint(name))
    }

    pub fn release_savepoint(&self, name: &str) -> DualResult<()> {
        self.on_main("release_savepoint", |main| main.release_savepoint(name))
    }

    pub fn set_holdability(&self, holdability: Holdability) -> DualResult<()> {
        self.on_main("set_holdability", |main| main.set_holdability(holdability))
    }

    pub fn holdability(&self) -> DualResult<Holdability> {
        self.on_main("holdability", |main| main.holdability())
    }

    pub fn set_type_map(&self, map: HashMap<String, String>) -> DualResult<()> {
        self.on_main("set_type_map", |main| main.set_type_map(map))
    }

    pub fn type_map(&self) -> DualResult<HashMap<String, String>> {
        self.on_main("type_map", |main| main.type_map())
    }

    pub fn set_client_info(&self, name: &str, value: &str) -> DualResult<()> {
        self.on_main("set_client_info", |main| main.set_client_info(name, value))
    }

    pub fn client_info(&self, name: &str) -> DualResult<Option<String>> {
        self.on_main("client_info", |main| main.client_info(name))
    }

    pub fn set_network_timeout(&self, timeout: Duration) -> DualResult<()> {
        self.on_main("set_network_timeout", |main| main.set_network_timeout(timeout))
    }

    pub fn network_timeout(&self) -> DualResult<Duration> {
        self.on_main("network_timeout", |main| main.network_timeout())
    }

    pub fn set_schema(&self, schema: &str) -> DualResult<()> {
        self.on_main("set_schema", |main| main.set_schema(schema))
    }

    pub fn schema(&self) -> DualResult<Option<String>> {
        self.on_main("schema", |main| main.schema())
    }

    pub fn warnings(&self) -> DualResult<Vec<String>> {
        self.on_main("warnings", |main| main.warnings())
    }

    pub fn clear_warnings(&self) -> DualResult<()> {
        self.on_main("clear_warnings", |main| main.clear_warnings())
    }

    pub fn abort(&self) -> DualResult<()> {
        self.on_main("abort", |main| main.abort())
    }

    pub fn is_valid(&self, timeout: Duration) -> DualResult<bool> {
        self.on_main("is_valid", |main| main.is_valid(timeout))
    }

    /// Database metadata cannot be attributed to one side; never succeeds,
    /// not even once the breaker has tripped.
    pub fn metadata(&self) -> DualResult<Infallible> {
        self.unsupported("metadata")
    }

    pub fn create_array_of(&self, _type_name: &str, _elements: &[Value]) -> DualResult<Infallible> {
        self.unsupported("create_array_of")
    }

    pub fn create_struct(&self, _type_name: &str, _attributes: &[Value]) -> DualResult<Infallible> {
        self.unsupported("create_struct")
    }

    pub fn create_blob(&self) -> DualResult<Infallible> {
        self.unsupported("create_blob")
    }

    pub fn create_clob(&self) -> DualResult<Infallible> {
        self.unsupported("create_clob")
    }

    pub fn create_sqlxml(&self) -> DualResult<Infallible> {
        self.unsupported("create_sqlxml")
    }
}
