//! Route Decisions
//!
//! Reveals why, and on which database, a call ran. Decisions are immutable
//! values; `cause` points back at the decision that first pinned the session
//! to main, so the chain is finite and acyclic by construction.

use std::fmt;

use serde::Serialize;

use super::sql;

/// Why a call was routed where it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// Plain read served by a consistent replica
    ReadOperation,
    /// Update, execute or batch call
    WriteOperation,
    /// Locking read (`... for update`)
    Lock,
    /// Connection-level API call that needs main, e.g. `native_sql`
    RwApiCall,
    /// Replica lagged behind the last recorded write
    ReplicaInconsistent,
    /// No replica could be handed out; the read path is main
    ReplicaUnavailable,
    /// Isolation level stronger than read committed
    HighTransactionIsolationLevel,
    /// Session already uses main
    MainConnectionReuse,
    /// An unsupported operation degraded routing to main only
    CircuitBreakerTripped,
}

impl Reason {
    /// Whether a call with this reason runs on main.
    pub fn is_run_on_main(&self) -> bool {
        !matches!(self, Reason::ReadOperation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::ReadOperation => "READ_OPERATION",
            Reason::WriteOperation => "WRITE_OPERATION",
            Reason::Lock => "LOCK",
            Reason::RwApiCall => "RW_API_CALL",
            Reason::ReplicaInconsistent => "REPLICA_INCONSISTENT",
            Reason::ReplicaUnavailable => "REPLICA_UNAVAILABLE",
            Reason::HighTransactionIsolationLevel => "HIGH_TRANSACTION_ISOLATION_LEVEL",
            Reason::MainConnectionReuse => "MAIN_CONNECTION_REUSE",
            Reason::CircuitBreakerTripped => "CIRCUIT_BREAKER_TRIPPED",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why, and which database, a call used
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RouteDecision {
    sql: Option<String>,
    reason: Reason,
    cause: Option<Box<RouteDecision>>,
    is_write: Option<bool>,
}

impl RouteDecision {
    /// Create a decision without a write classification.
    pub fn new(sql: Option<&str>, reason: Reason, cause: Option<RouteDecision>) -> Self {
        Self {
            sql: sql.map(str::to_string),
            reason,
            cause: cause.map(Box::new),
            is_write: None,
        }
    }

    /// Create a decision and classify its SQL with the write classifier.
    pub fn classified(sql: Option<&str>, reason: Reason, cause: Option<RouteDecision>) -> Self {
        Self {
            is_write: sql.map(sql::is_write),
            ..Self::new(sql, reason, cause)
        }
    }

    /// Reason for the current route. The state of the connection may enforce it.
    pub fn reason(&self) -> Reason {
        self.reason
    }

    /// The SQL corresponding to the current route, if any.
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// The earlier decision that forced this one, if any.
    pub fn cause(&self) -> Option<&RouteDecision> {
        self.cause.as_deref()
    }

    /// Audit classification of the SQL, when it was classified.
    pub fn is_write(&self) -> Option<bool> {
        self.is_write
    }

    /// Whether the call ran on main.
    pub fn is_run_on_main(&self) -> bool {
        self.reason.is_run_on_main()
    }

    /// The first decision of the causal chain.
    pub fn root_cause(&self) -> &RouteDecision {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }

    /// JSON rendering for log lines
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("\"{}\"", self.reason))
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouteDecision{{reason={}", self.reason)?;
        if let Some(sql) = &self.sql {
            write!(f, ", sql='{}'", sql)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ", cause={}", cause)?;
        }
        if let Some(is_write) = self.is_write {
            write!(f, ", is_write={}", is_write)?;
        }
        write!(f, "}}")
    }
}
