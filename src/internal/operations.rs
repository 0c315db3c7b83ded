//! Deferred statement operations
//!
//! Configuration calls made before a statement is bound to a physical
//! statement are recorded here and applied, in call order, right after
//! binding.

use crate::errors::DualResult;
use crate::spi::{PreparedStatement, Statement, Value};

/// An operation that can be replayed onto a physical statement
pub trait Apply<S> {
    fn apply(&self, statement: &mut S) -> DualResult<()>;

    /// Whether applying `self` makes an earlier `other` irrelevant for replay.
    fn supersedes(&self, other: &Self) -> bool;
}

/// Configuration of a plain statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOperation {
    QueryTimeout(u32),
    FetchSize(u32),
    MaxFieldSize(u32),
}

impl<S: Statement> Apply<S> for StatementOperation {
    fn apply(&self, statement: &mut S) -> DualResult<()> {
        match self {
            StatementOperation::QueryTimeout(seconds) => statement.set_query_timeout(*seconds),
            StatementOperation::FetchSize(rows) => statement.set_fetch_size(*rows),
            StatementOperation::MaxFieldSize(bytes) => statement.set_max_field_size(*bytes),
        }
    }

    /// A setting replaces an earlier value of the same setting.
    fn supersedes(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Configuration and parameter binding of a prepared statement
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedOperation {
    Configure(StatementOperation),
    Bind(usize, Value),
    ClearParameters,
}

impl From<StatementOperation> for PreparedOperation {
    fn from(operation: StatementOperation) -> Self {
        PreparedOperation::Configure(operation)
    }
}

impl<S: PreparedStatement> Apply<S> for PreparedOperation {
    fn apply(&self, statement: &mut S) -> DualResult<()> {
        match self {
            PreparedOperation::Configure(operation) => operation.apply(statement),
            PreparedOperation::Bind(index, value) => statement.bind(*index, value),
            PreparedOperation::ClearParameters => statement.clear_parameters(),
        }
    }

    fn supersedes(&self, other: &Self) -> bool {
        match (self, other) {
            (PreparedOperation::Configure(new), PreparedOperation::Configure(old)) => {
                <StatementOperation as Apply<S>>::supersedes(new, old)
            }
            (PreparedOperation::Bind(new, _), PreparedOperation::Bind(old, _)) => new == old,
            (
                PreparedOperation::ClearParameters,
                PreparedOperation::Bind(..) | PreparedOperation::ClearParameters,
            ) => true,
            _ => false,
        }
    }
}
