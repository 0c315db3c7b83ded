//! Statement Router
//!
//! Holds up to two lazily created physical statements for one logical
//! statement, one per side of the connection router, and decides per call
//! which of them runs it.
//!
//! Configuration calls are queued until the statement is bound and flushed
//! onto whichever physical statement is bound at the next call.

use std::sync::Arc;

use crate::errors::{DualConnectionError, DualResult};
use crate::observability::{log_event_with_fields, Event};
use crate::routing::{sql, CircuitBreaker, Reason, RouteDecision, Slot};
use crate::spi::{forward, CallContext, CallInterceptor, Connection, Statement};

use super::connection_router::{lock, SharedRouter};
use super::operations::Apply;

/// Builds a physical statement on a chosen physical connection
pub type StatementFactory<C, S> = Box<dyn Fn(&C) -> DualResult<S> + Send>;

/// Which physical statement the logical statement currently uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// The read-path statement, with the reason its connection was chosen
    Read(Reason),
    Write,
}

/// Per-statement routing knobs
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementRouting {
    /// Re-apply already flushed operations when rebinding from read to write
    pub replay_on_rebind: bool,
    /// Log every decision
    pub trace_decisions: bool,
}

/// The outcome of routing one call
#[derive(Debug)]
pub struct Resolved<'a, S> {
    pub decision: RouteDecision,
    pub statement: &'a mut S,
    pub read_only_binding: bool,
}

/// Lazy read/write statement pair with a deferred-operation queue
pub struct StatementRouter<C: Connection, S, O> {
    router: SharedRouter<C>,
    breaker: Arc<CircuitBreaker>,
    factory: StatementFactory<C, S>,
    read: Slot<S>,
    write: Slot<S>,
    /// Physical connection behind the read-path statement
    read_connection: Option<Arc<C>>,
    current: Option<Binding>,
    pending: Vec<O>,
    applied: Vec<O>,
    routing: StatementRouting,
    last_decision: Option<RouteDecision>,
}

impl<C, S, O> StatementRouter<C, S, O>
where
    C: Connection,
    S: Statement,
    O: Apply<S>,
{
    pub fn new(
        router: SharedRouter<C>,
        breaker: Arc<CircuitBreaker>,
        factory: StatementFactory<C, S>,
        routing: StatementRouting,
    ) -> Self {
        Self {
            router,
            breaker,
            factory,
            read: Slot::new(),
            write: Slot::new(),
            read_connection: None,
            current: None,
            pending: Vec::new(),
            applied: Vec::new(),
            routing,
            last_decision: None,
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Pick the physical statement for a query.
    ///
    /// Main is used when the session already touched main, the query locks
    /// rows, or it calls a function. Otherwise the bound statement is reused,
    /// or a new one is created on the connection router's read path.
    pub fn resolve_for_read(&mut self, query: &str) -> DualResult<Resolved<'_, S>> {
        if self.breaker.is_tripped() {
            let decision = RouteDecision::classified(Some(query), Reason::CircuitBreakerTripped, None);
            return self.bind_write(decision);
        }

        let (on_main, main_cause) = {
            let router = lock(&self.router)?;
            (router.has_write_connection(), router.route_cause().cloned())
        };

        let forced = if sql::is_select_for_update(query) {
            Some(Reason::Lock)
        } else if sql::is_function_call(query) {
            Some(Reason::WriteOperation)
        } else if on_main {
            Some(Reason::MainConnectionReuse)
        } else {
            None
        };
        if let Some(reason) = forced {
            let cause = if on_main { main_cause } else { None };
            return self.bind_write(RouteDecision::classified(Some(query), reason, cause));
        }

        let reason = match self.current {
            Some(Binding::Read(reason)) => {
                if let Some(connection) = &self.read_connection {
                    lock(&self.router)?.apply_session(connection)?;
                }
                reason
            }
            Some(Binding::Write) => Reason::MainConnectionReuse,
            None => {
                let (connection, reason) = lock(&self.router)?.read_connection()?;
                let statement = (self.factory)(connection.as_ref())?;
                self.read = Slot::Materialized(statement);
                self.read_connection = Some(connection);
                self.current = Some(Binding::Read(reason));
                reason
            }
        };

        let decision = RouteDecision::classified(Some(query), reason, None);
        lock(&self.router)?.mark_main(&decision);
        self.flush(false)?;
        self.finish(decision)
    }

    /// Pick the physical statement for a write. Always main.
    pub fn resolve_for_write(&mut self, query: Option<&str>) -> DualResult<Resolved<'_, S>> {
        let reason = if self.breaker.is_tripped() {
            Reason::CircuitBreakerTripped
        } else {
            Reason::WriteOperation
        };
        self.bind_write(RouteDecision::classified(query, reason, None))
    }

    /// Route a read call and run it through `interceptor`.
    pub(crate) fn read_call<T>(
        &mut self,
        interceptor: &dyn CallInterceptor,
        method: &'static str,
        query: &str,
        call: impl FnOnce(&mut S) -> DualResult<T>,
    ) -> DualResult<T> {
        let resolved = self.resolve_for_read(query)?;
        let context = CallContext {
            method,
            decision: &resolved.decision,
            read_only_binding: resolved.read_only_binding,
        };
        let statement = resolved.statement;
        forward(interceptor, &context, || call(statement))
    }

    /// Route a write call, run it through `interceptor`, then record the
    /// write with the consistency tracker.
    pub(crate) fn write_call<T>(
        &mut self,
        interceptor: &dyn CallInterceptor,
        method: &'static str,
        query: Option<&str>,
        call: impl FnOnce(&mut S) -> DualResult<T>,
    ) -> DualResult<T> {
        let output = {
            let resolved = self.resolve_for_write(query)?;
            let context = CallContext {
                method,
                decision: &resolved.decision,
                read_only_binding: resolved.read_only_binding,
            };
            let statement = resolved.statement;
            forward(interceptor, &context, || call(statement))?
        };
        lock(&self.router)?.record_write()?;
        Ok(output)
    }

    /// Run a call outside the routed surface on the write-path statement.
    pub(crate) fn main_call<T>(
        &mut self,
        call: impl FnOnce(&mut S) -> DualResult<T>,
    ) -> DualResult<T> {
        let resolved = self.resolve_for_write(None)?;
        call(resolved.statement)
    }

    // =========================================================================
    // Deferred operations
    // =========================================================================

    /// Queue an operation for the next bound statement.
    pub fn defer(&mut self, operation: O) {
        self.pending.push(operation);
    }

    /// Apply queued operations to the bound statement, in call order.
    ///
    /// Applied operations leave the queue. On failure the failing operation
    /// is dropped and later ones stay queued.
    fn flush(&mut self, rebound: bool) -> DualResult<()> {
        let statement = match self.current {
            Some(Binding::Write) => self.write.get_mut(),
            Some(Binding::Read(_)) => self.read.get_mut(),
            None => None,
        };
        let Some(statement) = statement else {
            return Ok(());
        };

        if rebound && self.routing.replay_on_rebind {
            for operation in &self.applied {
                operation.apply(statement)?;
            }
        }

        let mut pending = std::mem::take(&mut self.pending).into_iter();
        while let Some(operation) = pending.next() {
            if let Err(err) = operation.apply(statement) {
                self.pending = pending.collect();
                return Err(err);
            }
            if self.routing.replay_on_rebind {
                self.applied.retain(|earlier| !operation.supersedes(earlier));
                self.applied.push(operation);
            }
        }
        Ok(())
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Whether the statement is not bound to its write-path statement.
    pub fn is_read_only_binding(&self) -> bool {
        !(self.write.is_materialized() && self.current == Some(Binding::Write))
    }

    /// The decision of the last routed call.
    pub fn last_decision(&self) -> Option<&RouteDecision> {
        self.last_decision.as_ref()
    }

    /// The bound physical statement, for result accessors.
    pub fn current_mut(&mut self) -> DualResult<&mut S> {
        let statement = match self.current {
            Some(Binding::Write) => self.write.get_mut(),
            Some(Binding::Read(_)) => self.read.get_mut(),
            None => None,
        };
        statement.ok_or(DualConnectionError::NotExecuted)
    }

    /// Number of operations waiting for a bound statement.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Close every materialized physical statement; returns the last failure.
    pub fn close(&mut self) -> DualResult<()> {
        let mut last_error = None;
        for slot in [&mut self.read, &mut self.write] {
            if let Some(mut statement) = slot.reset() {
                if let Err(e) = statement.close() {
                    last_error = Some(e);
                }
            }
        }
        self.current = None;
        self.read_connection = None;
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Bind the write-path statement. Asking the router for main every time
    /// keeps session state current and closes a diverging replica.
    fn bind_write(&mut self, decision: RouteDecision) -> DualResult<Resolved<'_, S>> {
        let connection = lock(&self.router)?.write_connection()?;
        if !self.write.is_materialized() {
            let statement = (self.factory)(connection.as_ref())?;
            self.write = Slot::Materialized(statement);
        }
        let rebound = matches!(self.current, Some(Binding::Read(_)));
        self.current = Some(Binding::Write);
        lock(&self.router)?.mark_main(&decision);
        self.flush(rebound)?;
        self.finish(decision)
    }

    fn finish(&mut self, decision: RouteDecision) -> DualResult<Resolved<'_, S>> {
        if self.routing.trace_decisions {
            let rendered = decision.to_json();
            log_event_with_fields(Event::RouteDecided, &[("decision", rendered.as_str())]);
        }
        self.last_decision = Some(decision.clone());
        let read_only_binding = self.is_read_only_binding();
        let statement = self.current_mut()?;
        Ok(Resolved {
            decision,
            statement,
            read_only_binding,
        })
    }
}
