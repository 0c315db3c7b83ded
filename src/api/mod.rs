//! Logical Connection API
//!
//! The surface applications use in place of a single database connection.
//!
//! # Routing
//!
//! - queries run on a consistent replica until the session touches main
//! - updates, `execute`, batches and locking reads run on main
//! - strong isolation levels pin the session to main
//! - unsupported operations fail and trip the circuit breaker; after the
//!   trip they run on main
//!
//! # Usage
//!
//! ```ignore
//! let connection = DualConnection::builder(provider, consistency).build();
//! let mut statement = connection.create_statement();
//! let rows = statement.execute_query("SELECT * FROM issue")?;
//! ```

mod connection;
mod statement;

pub use connection::{DualConnection, DualConnectionBuilder};
pub use statement::{DualCallableStatement, DualPreparedStatement, DualStatement, ResultSetOf};
