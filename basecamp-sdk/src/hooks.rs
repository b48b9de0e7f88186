// ABOUTME: Observability hooks invoked around operations, requests, and retries
// ABOUTME: Hook panics are caught and discarded so they never break a request

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;

/// Context for a semantic SDK operation such as "todos.create".
#[derive(Debug, Clone, Default)]
pub struct OperationInfo {
    pub service: String,
    pub operation: String,
    pub resource_type: String,
    pub is_mutation: bool,
    pub project_id: Option<i64>,
    pub resource_id: Option<i64>,
}

/// Context for a single HTTP request attempt.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Outcome of a single HTTP request attempt.
#[derive(Debug, Clone, Default)]
pub struct RequestResult {
    /// HTTP status, or 0 when the transport failed before a response arrived.
    pub status: u16,
    pub duration: Duration,
    pub error: Option<String>,
    pub from_cache: bool,
}

/// Observer interface for SDK activity. All methods have no-op defaults, so
/// implementations override only what they need. Implementations must be
/// cheap and non-blocking; they run inline on the request path.
pub trait Hooks: Send + Sync {
    fn on_operation_start(&self, _op: &OperationInfo) {}
    fn on_operation_end(&self, _op: &OperationInfo, _error: Option<&Error>, _duration: Duration) {}
    fn on_request_start(&self, _info: &RequestInfo) {}
    fn on_request_end(&self, _info: &RequestInfo, _result: &RequestResult) {}
    fn on_retry(&self, _info: &RequestInfo, _next_attempt: u32, _error: &Error, _delay: Duration) {}
}

/// Hooks implementation that observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}

/// Hooks implementation that emits `tracing` events for all SDK activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

impl Hooks for TracingHooks {
    fn on_operation_start(&self, op: &OperationInfo) {
        tracing::debug!(
            service = %op.service,
            operation = %op.operation,
            resource_type = %op.resource_type,
            is_mutation = op.is_mutation,
            "operation start"
        );
    }

    fn on_operation_end(&self, op: &OperationInfo, error: Option<&Error>, duration: Duration) {
        match error {
            Some(err) => tracing::debug!(
                service = %op.service,
                operation = %op.operation,
                duration_ms = duration.as_millis() as u64,
                error = %err,
                "operation failed"
            ),
            None => tracing::debug!(
                service = %op.service,
                operation = %op.operation,
                duration_ms = duration.as_millis() as u64,
                "operation complete"
            ),
        }
    }

    fn on_request_start(&self, info: &RequestInfo) {
        tracing::debug!(
            method = %info.method,
            url = %info.url,
            attempt = info.attempt,
            "request start"
        );
    }

    fn on_request_end(&self, info: &RequestInfo, result: &RequestResult) {
        match &result.error {
            Some(err) => tracing::debug!(
                method = %info.method,
                url = %info.url,
                duration_ms = result.duration.as_millis() as u64,
                error = %err,
                "request failed"
            ),
            None => tracing::debug!(
                method = %info.method,
                url = %info.url,
                status = result.status,
                from_cache = result.from_cache,
                duration_ms = result.duration.as_millis() as u64,
                "request complete"
            ),
        }
    }

    fn on_retry(&self, info: &RequestInfo, next_attempt: u32, error: &Error, delay: Duration) {
        tracing::debug!(
            method = %info.method,
            url = %info.url,
            next_attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retrying request"
        );
    }
}

/// Runs a hook callback, swallowing any panic it raises.
pub(crate) fn shielded(f: impl FnOnce()) {
    let _ = catch_unwind(AssertUnwindSafe(f));
}

/// Composite that fans out to multiple hooks.
///
/// Start callbacks run in registration order, end callbacks in reverse order
/// so hook pairs nest like scopes. Each delegate is shielded individually; a
/// panicking hook never prevents the others from running.
struct CompositeHooks {
    hooks: Vec<Arc<dyn Hooks>>,
}

impl Hooks for CompositeHooks {
    fn on_operation_start(&self, op: &OperationInfo) {
        for hook in &self.hooks {
            shielded(|| hook.on_operation_start(op));
        }
    }

    fn on_operation_end(&self, op: &OperationInfo, error: Option<&Error>, duration: Duration) {
        for hook in self.hooks.iter().rev() {
            shielded(|| hook.on_operation_end(op, error, duration));
        }
    }

    fn on_request_start(&self, info: &RequestInfo) {
        for hook in &self.hooks {
            shielded(|| hook.on_request_start(info));
        }
    }

    fn on_request_end(&self, info: &RequestInfo, result: &RequestResult) {
        for hook in self.hooks.iter().rev() {
            shielded(|| hook.on_request_end(info, result));
        }
    }

    fn on_retry(&self, info: &RequestInfo, next_attempt: u32, error: &Error, delay: Duration) {
        for hook in &self.hooks {
            shielded(|| hook.on_retry(info, next_attempt, error, delay));
        }
    }
}

/// Collapses a list of hooks into one.
///
/// Zero hooks yields a no-op, one hook is returned as-is, and more are
/// wrapped in a composite with scope-like ordering.
pub fn chain_hooks(mut hooks: Vec<Arc<dyn Hooks>>) -> Arc<dyn Hooks> {
    match hooks.len() {
        0 => Arc::new(NoopHooks),
        1 => hooks.remove(0),
        _ => Arc::new(CompositeHooks { hooks }),
    }
}
