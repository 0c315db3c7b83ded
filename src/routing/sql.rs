//! SQL Shape Classifier
//!
//! Literal prefix/suffix/substring checks on the SQL text. This is not a
//! parser: only the exact casings listed below are recognised, and a
//! statement such as `Select ... For Update` is not a locking read.

const FOR_UPDATE_LOWER: &str = "for update";
const FOR_UPDATE_UPPER: &str = "FOR UPDATE";
const WHERE_KEYWORD: &str = "WHERE";

/// Whether the statement is a locking read (`... for update`).
///
/// Trailing whitespace is ignored.
pub fn is_select_for_update(sql: &str) -> bool {
    let sql = sql.trim_end();
    sql.ends_with(FOR_UPDATE_LOWER) || sql.ends_with(FOR_UPDATE_UPPER)
}

/// Whether the statement probably invokes a function or procedure.
///
/// True iff the text before the first upper-case `WHERE` contains `(`.
pub fn is_function_call(sql: &str) -> bool {
    sql.split(WHERE_KEYWORD)
        .next()
        .map_or(false, |head| head.contains('('))
}

/// Whether the statement starts with `update` or `UPDATE`.
pub fn is_update(sql: &str) -> bool {
    sql.starts_with("update") || sql.starts_with("UPDATE")
}

/// Whether the statement starts with `delete` or `DELETE`.
pub fn is_delete(sql: &str) -> bool {
    sql.starts_with("delete") || sql.starts_with("DELETE")
}

/// Whether the statement sets a session variable (lower-case `set` only).
pub fn is_session_set(sql: &str) -> bool {
    sql.starts_with("set")
}

/// Update, delete, or probable function call.
pub fn is_write_operation(sql: &str) -> bool {
    is_function_call(sql) || is_update(sql) || is_delete(sql)
}

/// Secondary write classifier, used for the audit flag on route decisions.
///
/// A statement is a write iff it is a write operation, is not a locking
/// read, and is not a session-variable `set`.
pub fn is_write(sql: &str) -> bool {
    is_write_operation(sql) && !is_select_for_update(sql) && !is_session_set(sql)
}
