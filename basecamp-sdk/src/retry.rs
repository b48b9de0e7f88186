// ABOUTME: Retry policies keyed by operation name with method-based fallbacks
// ABOUTME: Exponential backoff with jitter, honoring Retry-After on 429s

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;

use crate::constants::retry::{BASE_DELAY_MS, MAX_ATTEMPTS, MAX_JITTER_MS};

/// Retry behavior for one operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Statuses that trigger a retry.
    pub retry_on: Vec<u16>,
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
    /// Whether repeating the operation cannot change the outcome.
    pub idempotent: bool,
}

impl RetryPolicy {
    /// Policy for idempotent requests: retry throttles and brief outages.
    pub fn idempotent() -> Self {
        RetryPolicy {
            retry_on: vec![429, 503],
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_DELAY_MS,
            idempotent: true,
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        RetryPolicy {
            retry_on: Vec::new(),
            max_attempts: 1,
            base_delay_ms: BASE_DELAY_MS,
            idempotent: false,
        }
    }

    pub fn should_retry(&self, status: u16) -> bool {
        self.retry_on.contains(&status)
    }
}

/// Lookup table mapping operation names to retry policies.
///
/// Operations without an entry fall back to a method-derived default:
/// idempotent methods (GET, HEAD, PUT, DELETE) retry on 429 and 503, while
/// POST and PATCH never retry since a duplicate could double-create.
#[derive(Debug, Clone, Default)]
pub struct RetryTable {
    policies: HashMap<String, RetryPolicy>,
}

impl RetryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, operation: impl Into<String>, policy: RetryPolicy) {
        self.policies.insert(operation.into(), policy);
    }

    pub fn with(mut self, operation: impl Into<String>, policy: RetryPolicy) -> Self {
        self.insert(operation, policy);
        self
    }

    /// Resolves the policy for a request, preferring an exact operation entry.
    pub fn resolve(&self, operation: Option<&str>, method: &Method) -> RetryPolicy {
        if let Some(policy) = operation.and_then(|op| self.policies.get(op)) {
            return policy.clone();
        }
        if is_idempotent(method) {
            RetryPolicy::idempotent()
        } else {
            RetryPolicy::none()
        }
    }
}

/// Methods safe to repeat without changing the outcome. PUT and DELETE
/// qualify per HTTP semantics; POST and PATCH do not.
pub(crate) fn is_idempotent(method: &Method) -> bool {
    *method == Method::GET
        || *method == Method::HEAD
        || *method == Method::PUT
        || *method == Method::DELETE
}

/// Exponential backoff delay for the attempt that just failed (1-based),
/// with random jitter so synchronized clients do not stampede.
pub(crate) fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = base_delay_ms.saturating_mul(1u64 << exponent);
    let jitter = rand::random_range(0..MAX_JITTER_MS);
    Duration::from_millis(base.saturating_add(jitter))
}
