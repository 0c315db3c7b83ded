//! Routing state machines
//!
//! - [`ConnectionRouter`]: lazy read/write physical connections plus session state
//! - [`StatementRouter`]: lazy read/write physical statements plus deferred operations

mod connection_router;
mod operations;
mod statement_router;

pub use connection_router::{ConnectionRouter, SharedRouter};
pub(crate) use connection_router::lock;
pub use operations::{Apply, PreparedOperation, StatementOperation};
pub use statement_router::{Resolved, StatementFactory, StatementRouter, StatementRouting};
