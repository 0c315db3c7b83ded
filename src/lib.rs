//! dual-connection - read/write splitting at the connection level
//!
//! One logical connection backed by two lazily acquired physical
//! connections: a replica for reads, main for everything else.

pub mod api;
pub mod config;
pub mod errors;
pub mod internal;
pub mod observability;
pub mod routing;
pub mod spi;

pub use api::{
    DualCallableStatement, DualConnection, DualConnectionBuilder, DualPreparedStatement,
    DualStatement,
};
pub use config::DualConnectionConfig;
pub use errors::{DualConnectionError, DualResult};
pub use routing::{CircuitBreaker, Reason, RouteDecision};
