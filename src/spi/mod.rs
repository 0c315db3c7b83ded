//! Service Provider Interfaces
//!
//! Boundaries to the collaborators the router drives but does not own:
//! - physical connections and statements
//! - the connection provider
//! - the replica consistency tracker
//! - the call interception hook

mod call;
mod connection;
mod consistency;

pub use call::{CallContext, CallInterceptor, CallOutcome, ForwardCall};
pub(crate) use call::forward;
pub use connection::{
    Concurrency, Connection, ConnectionProvider, Holdability, IsolationLevel, PreparedStatement,
    ResultSetType, Statement, StatementOptions, Value,
};
pub use consistency::ReplicaConsistency;
