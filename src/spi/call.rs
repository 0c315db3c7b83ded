//! Call Interception
//!
//! Every executed statement call passes through a [`CallInterceptor`]
//! together with the decision that routed it. The interceptor may measure or
//! trace. It only sees a [`CallOutcome`]; the call's own result is kept aside
//! and is what reaches the caller, whatever the interceptor returns.

use crate::errors::{DualConnectionError, DualResult};
use crate::observability::{log_event_with_fields, Event};
use crate::routing::RouteDecision;

/// What an interceptor learns about a call
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// Logical method being executed, e.g. `execute_query`
    pub method: &'static str,
    /// Why the call runs where it runs
    pub decision: &'a RouteDecision,
    /// Whether the statement is not bound to its write-path statement
    pub read_only_binding: bool,
}

/// How a forwarded call went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Succeeded,
    Failed,
    /// Already ran; a second invocation is not executed
    Replayed,
}

impl CallOutcome {
    pub fn is_failure(&self) -> bool {
        *self == CallOutcome::Failed
    }
}

/// Hook wrapped around each executed call
pub trait CallInterceptor: Send + Sync {
    /// Run `call` once.
    ///
    /// An error returned here is logged and otherwise ignored.
    fn intercept(
        &self,
        context: &CallContext<'_>,
        call: &mut dyn FnMut() -> CallOutcome,
    ) -> DualResult<()>;
}

/// Default interceptor: forwards without looking
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardCall;

impl CallInterceptor for ForwardCall {
    fn intercept(
        &self,
        _context: &CallContext<'_>,
        call: &mut dyn FnMut() -> CallOutcome,
    ) -> DualResult<()> {
        call();
        Ok(())
    }
}

/// Run `call` through `interceptor` and hand back its result.
///
/// `CallNotForwarded` only when the interceptor never ran the call.
pub(crate) fn forward<T>(
    interceptor: &dyn CallInterceptor,
    context: &CallContext<'_>,
    call: impl FnOnce() -> DualResult<T>,
) -> DualResult<T> {
    let mut call = Some(call);
    let mut output: Option<DualResult<T>> = None;
    let intercepted = interceptor.intercept(context, &mut || match call.take() {
        Some(call) => {
            let result = call();
            let outcome = if result.is_ok() {
                CallOutcome::Succeeded
            } else {
                CallOutcome::Failed
            };
            output = Some(result);
            outcome
        }
        None => CallOutcome::Replayed,
    });
    if let Err(err) = intercepted {
        let rendered = err.to_string();
        log_event_with_fields(
            Event::InterceptorFailed,
            &[("method", context.method), ("error", rendered.as_str())],
        );
    }
    output.unwrap_or(Err(DualConnectionError::CallNotForwarded))
}
