//! Connection Router
//!
//! Owns the two lazy physical-connection slots of one logical connection
//! and every piece of connection-level session state.
//!
//! Read path:
//! - isolation stronger than read committed → main
//! - otherwise a replica (or main, if no replica is available), kept only if
//!   the consistency tracker says it has caught up
//! - an inconsistent replica is closed and forgotten; the next read asks again
//!
//! Write path:
//! - main, and a diverging replica connection is closed as soon as main is
//!   in use
//!
//! Invariant: a materialized write slot is only discarded by `close`.

use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::errors::{DualConnectionError, DualResult};
use crate::observability::{log_event_with_fields, Event};
use crate::routing::{CircuitBreaker, Reason, RouteDecision, Slot};
use crate::spi::{Connection, ConnectionProvider, IsolationLevel, ReplicaConsistency};

/// Router state shared by a logical connection and its statements
pub type SharedRouter<C> = Arc<Mutex<ConnectionRouter<C>>>;

/// Lock the shared router, surfacing poisoning as an error.
pub(crate) fn lock<C: Connection>(
    router: &SharedRouter<C>,
) -> DualResult<MutexGuard<'_, ConnectionRouter<C>>> {
    router.lock().map_err(|_| DualConnectionError::Poisoned)
}

/// Lazy read/write connection pair with session state
pub struct ConnectionRouter<C: Connection> {
    connection_id: String,
    provider: Arc<dyn ConnectionProvider<C>>,
    consistency: Arc<dyn ReplicaConsistency<C>>,
    breaker: Arc<CircuitBreaker>,
    read: Slot<Arc<C>>,
    write: Slot<Arc<C>>,
    /// Physical connections that already carry the current session state
    initialized: Vec<Arc<C>>,
    auto_commit: Option<bool>,
    transaction_isolation: Option<IsolationLevel>,
    read_only: Option<bool>,
    catalog: Option<String>,
    closed: bool,
    /// Decision that first put this session on main
    main_cause: Option<RouteDecision>,
}

impl<C: Connection> ConnectionRouter<C> {
    /// Create a router with both slots unmaterialized.
    pub fn new(
        provider: Arc<dyn ConnectionProvider<C>>,
        consistency: Arc<dyn ReplicaConsistency<C>>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), provider, consistency, breaker)
    }

    pub(crate) fn with_id(
        id: Uuid,
        provider: Arc<dyn ConnectionProvider<C>>,
        consistency: Arc<dyn ReplicaConsistency<C>>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            connection_id: id.to_string(),
            provider,
            consistency,
            breaker,
            read: Slot::new(),
            write: Slot::new(),
            initialized: Vec::new(),
            auto_commit: None,
            transaction_isolation: None,
            read_only: None,
            catalog: None,
            closed: false,
            main_cause: None,
        }
    }

    // =========================================================================
    // Session state
    // =========================================================================

    pub fn set_transaction_isolation(&mut self, level: IsolationLevel) {
        self.transaction_isolation = Some(level);
        self.initialized.clear();
    }

    pub fn transaction_isolation(&self) -> Option<IsolationLevel> {
        self.transaction_isolation
    }

    /// Change autocommit.
    ///
    /// Turning autocommit on commits any open transaction, so a false→true
    /// toggle records a write position before the new state applies.
    pub fn set_auto_commit(&mut self, auto_commit: bool) -> DualResult<()> {
        let before = self.auto_commit();
        self.auto_commit = Some(auto_commit);
        self.initialized.clear();
        if before != auto_commit {
            self.record_commit(Some(before))?;
        }
        Ok(())
    }

    /// Autocommit as seen by the application; unset means on.
    pub fn auto_commit(&self) -> bool {
        self.auto_commit.unwrap_or(true)
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = Some(read_only);
        self.initialized.clear();
    }

    pub fn read_only(&self) -> Option<bool> {
        self.read_only
    }

    pub fn set_catalog(&mut self, catalog: impl Into<String>) {
        self.catalog = Some(catalog.into());
        self.initialized.clear();
    }

    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    // =========================================================================
    // Routing
    // =========================================================================

    /// Connection for a read, with the reason it was chosen.
    ///
    /// The fallback to main is not memoized: every call on an unmaterialized
    /// read slot acquires a candidate and checks consistency again.
    pub fn read_connection(&mut self) -> DualResult<(Arc<C>, Reason)> {
        if self.breaker.is_tripped() {
            return Ok((self.write_connection()?, Reason::CircuitBreakerTripped));
        }
        if self
            .transaction_isolation
            .map_or(false, |level| level.requires_main())
        {
            return Ok((self.write_connection()?, Reason::HighTransactionIsolationLevel));
        }

        let candidate = self.materialize_read()?;
        let is_main = self.is_write_connection(&candidate);

        if self.consistency.is_consistent(&candidate)? {
            self.initialize(&candidate)?;
            let reason = if is_main {
                Reason::ReplicaUnavailable
            } else {
                Reason::ReadOperation
            };
            return Ok((candidate, reason));
        }

        if is_main {
            // the read path already is main; main is consistent with itself
            self.initialize(&candidate)?;
            return Ok((candidate, Reason::ReplicaUnavailable));
        }

        log_event_with_fields(
            Event::ReplicaInconsistent,
            &[("connection_id", self.connection_id.as_str())],
        );
        self.read.reset();
        self.forget(&candidate);
        candidate.close()?;
        Ok((self.write_connection()?, Reason::ReplicaInconsistent))
    }

    /// Connection to main. Closes a diverging read connection.
    pub fn write_connection(&mut self) -> DualResult<Arc<C>> {
        let connection = self.materialize_write()?;
        let diverging = self
            .read
            .get()
            .map_or(false, |read| !Arc::ptr_eq(read, &connection));
        if diverging {
            log_event_with_fields(
                Event::ReadConnectionDiscarded,
                &[("connection_id", self.connection_id.as_str())],
            );
            self.close_read()?;
        }
        self.initialize(&connection)?;
        Ok(connection)
    }

    /// Bring a connection handed out earlier up to the current session state.
    pub fn apply_session(&mut self, connection: &Arc<C>) -> DualResult<()> {
        if self.closed {
            return Ok(());
        }
        self.initialize(connection)
    }

    /// Whether the session has touched main.
    pub fn has_write_connection(&self) -> bool {
        self.write.is_materialized()
    }

    /// Whether the read slot holds a connection.
    pub fn has_read_connection(&self) -> bool {
        self.read.is_materialized()
    }

    /// The decision that first put this session on main, if any.
    pub fn route_cause(&self) -> Option<&RouteDecision> {
        self.main_cause.as_ref()
    }

    /// Remember `decision` as the cause of main routing unless one is known.
    pub fn mark_main(&mut self, decision: &RouteDecision) {
        if self.main_cause.is_none() && decision.is_run_on_main() {
            self.main_cause = Some(decision.clone());
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Commit every materialized connection once.
    ///
    /// Records a write position only inside an explicit transaction.
    pub fn commit(&mut self) -> DualResult<()> {
        if let Some(write) = self.write.get().cloned() {
            write.commit()?;
            self.record_commit(self.auto_commit)?;
        }
        if let Some(read) = self.read.get() {
            if !self.is_write_connection(read) {
                read.commit()?;
            }
        }
        Ok(())
    }

    /// Roll back every materialized connection once. Never records a write.
    pub fn rollback(&mut self) -> DualResult<()> {
        if let Some(write) = self.write.get() {
            write.rollback()?;
        }
        if let Some(read) = self.read.get() {
            if !self.is_write_connection(read) {
                read.rollback()?;
            }
        }
        Ok(())
    }

    /// Record the write position reached by a statement executed on main.
    pub fn record_write(&mut self) -> DualResult<()> {
        match self.write.get() {
            Some(write) => {
                self.consistency.write(write)?;
                log_event_with_fields(
                    Event::ConsistencyWriteRecorded,
                    &[("connection_id", self.connection_id.as_str())],
                );
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record_commit(&mut self, auto_commit: Option<bool>) -> DualResult<()> {
        if auto_commit == Some(false) {
            self.record_write()?;
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close both slots.
    ///
    /// Both slots are released even if one close fails; the last failure is
    /// returned. A connection sitting in both slots is closed once.
    pub fn close(&mut self) -> DualResult<()> {
        self.closed = true;
        let mut last_error = None;

        let shared = match (self.read.get(), self.write.get()) {
            (Some(read), Some(write)) => Arc::ptr_eq(read, write),
            _ => false,
        };

        if let Err(e) = self.close_read() {
            self.log_close_failure("read", &e);
            last_error = Some(e);
        }

        if shared {
            self.write.reset();
        } else if let Some(write) = self.write.reset() {
            if let Err(e) = write.close() {
                self.log_close_failure("write", &e);
                last_error = Some(e);
            }
        }

        self.initialized.clear();
        self.main_cause = None;

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn materialize_write(&mut self) -> DualResult<Arc<C>> {
        let provider = &self.provider;
        let connection = self
            .write
            .get_or_try_init(|| provider.main_connection().map(Arc::new))?;
        Ok(Arc::clone(connection))
    }

    fn materialize_read(&mut self) -> DualResult<Arc<C>> {
        if let Some(read) = self.read.get() {
            return Ok(Arc::clone(read));
        }
        let connection = if self.provider.is_replica_available() {
            Arc::new(self.provider.replica_connection()?)
        } else {
            log_event_with_fields(
                Event::ReplicaUnavailable,
                &[("connection_id", self.connection_id.as_str())],
            );
            self.materialize_write()?
        };
        self.read = Slot::Materialized(Arc::clone(&connection));
        Ok(connection)
    }

    fn is_write_connection(&self, connection: &Arc<C>) -> bool {
        self.write
            .get()
            .map_or(false, |write| Arc::ptr_eq(write, connection))
    }

    fn close_read(&mut self) -> DualResult<()> {
        match self.read.reset() {
            Some(read) => {
                self.forget(&read);
                read.close()
            }
            None => Ok(()),
        }
    }

    /// Apply pending session state to `connection` unless it already has it.
    fn initialize(&mut self, connection: &Arc<C>) -> DualResult<()> {
        if self.initialized.iter().any(|c| Arc::ptr_eq(c, connection)) {
            return Ok(());
        }
        if let Some(auto_commit) = self.auto_commit {
            connection.set_auto_commit(auto_commit)?;
        }
        if let Some(level) = self.transaction_isolation {
            connection.set_transaction_isolation(level)?;
        }
        if let Some(read_only) = self.read_only {
            connection.set_read_only(read_only)?;
        }
        if let Some(catalog) = &self.catalog {
            connection.set_catalog(catalog)?;
        }
        self.initialized.push(Arc::clone(connection));
        Ok(())
    }

    fn forget(&mut self, connection: &Arc<C>) {
        self.initialized.retain(|c| !Arc::ptr_eq(c, connection));
    }

    fn log_close_failure(&self, slot: &str, error: &DualConnectionError) {
        let message = error.to_string();
        log_event_with_fields(
            Event::ConnectionCloseFailed,
            &[
                ("connection_id", self.connection_id.as_str()),
                ("error", message.as_str()),
                ("slot", slot),
            ],
        );
    }
}
