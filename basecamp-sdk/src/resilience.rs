// ABOUTME: Client-side resilience: circuit breakers, bulkheads, and rate limiting
// ABOUTME: Gates operations before any HTTP attempt and learns from their outcomes

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::constants::resilience as defaults;
use crate::error::{Error, Result};

/// Circuit breaker tuning for one operation scope.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Successes needed to close the circuit from half-open.
    pub success_threshold: u32,
    /// Time an open circuit waits before allowing a probe request.
    pub open_timeout: Duration,
    /// Failure percentage over the sliding window that opens the circuit.
    /// Only evaluated once the window has filled.
    pub failure_rate_threshold: f64,
    /// Number of recent requests considered for the failure rate.
    pub sliding_window: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            failure_threshold: defaults::FAILURE_THRESHOLD,
            success_threshold: defaults::SUCCESS_THRESHOLD,
            open_timeout: defaults::OPEN_TIMEOUT,
            failure_rate_threshold: defaults::FAILURE_RATE_THRESHOLD,
            sliding_window: defaults::SLIDING_WINDOW,
        }
    }
}

/// Concurrency limit for one operation scope.
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Maximum requests in flight at once.
    pub max_concurrent: usize,
    /// How long to wait for a slot. Zero rejects immediately when full.
    pub max_wait: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        BulkheadConfig {
            max_concurrent: defaults::MAX_CONCURRENT,
            max_wait: defaults::MAX_WAIT,
        }
    }
}

/// Client-side rate limit shared across all operations.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sustained request rate.
    pub requests_per_second: f64,
    /// Requests allowed in a burst above the sustained rate.
    pub burst_size: u32,
    /// Whether 429/503 Retry-After responses block the limiter until the
    /// server-specified time has passed.
    pub respect_retry_after: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            requests_per_second: defaults::REQUESTS_PER_SECOND,
            burst_size: defaults::BURST_SIZE,
            respect_retry_after: true,
        }
    }
}

/// Opt-in resilience features. Each `None` disables that feature.
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub bulkhead: Option<BulkheadConfig>,
    pub rate_limit: Option<RateLimitConfig>,
}

impl ResilienceConfig {
    /// Enables every feature with its default tuning.
    pub fn all() -> Self {
        ResilienceConfig {
            circuit_breaker: Some(CircuitBreakerConfig::default()),
            bulkhead: Some(BulkheadConfig::default()),
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
    // Ring buffer of recent outcomes, true = success.
    window: Vec<bool>,
    window_index: usize,
    window_filled: bool,
}

/// One circuit breaker. Opens after too many failures, rejects while open,
/// probes after `open_timeout`, and closes again after enough successes.
struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        let window = vec![false; config.sliding_window.max(1)];
        CircuitBreaker {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
                window,
                window_index: 0,
                window_filled: false,
            }),
        }
    }

    fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| now.duration_since(at))
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.open_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        Self::push_window(&mut inner, true);
        match inner.state {
            BreakerState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                }
            }
            BreakerState::Closed => inner.failures = 0,
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(now);
        Self::push_window(&mut inner, false);
        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold
                    || self.failure_rate_exceeded(&inner)
                {
                    inner.state = BreakerState::Open;
                }
            }
            BreakerState::HalfOpen => {
                // The probe failed; back to open.
                inner.state = BreakerState::Open;
                inner.successes = 0;
            }
            BreakerState::Open => {}
        }
    }

    fn push_window(inner: &mut BreakerInner, success: bool) {
        let index = inner.window_index;
        inner.window[index] = success;
        inner.window_index = (index + 1) % inner.window.len();
        if inner.window_index == 0 {
            inner.window_filled = true;
        }
    }

    fn failure_rate_exceeded(&self, inner: &BreakerInner) -> bool {
        if !inner.window_filled {
            return false;
        }
        let failures = inner.window.iter().filter(|success| !**success).count();
        let rate = failures as f64 / inner.window.len() as f64 * 100.0;
        rate >= self.config.failure_rate_threshold
    }

    fn state_name(&self) -> &'static str {
        match self.inner.lock().state {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

/// Concurrency limiter backed by a semaphore. The returned permit releases
/// the slot when dropped.
struct Bulkhead {
    semaphore: Arc<Semaphore>,
    max_wait: Duration,
}

impl Bulkhead {
    fn new(config: &BulkheadConfig) -> Self {
        Bulkhead {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            max_wait: config.max_wait,
        }
    }

    async fn acquire(&self, scope: &str) -> Result<OwnedSemaphorePermit> {
        if self.max_wait.is_zero() {
            return self
                .semaphore
                .clone()
                .try_acquire_owned()
                .map_err(|_| bulkhead_full(scope));
        }
        match tokio::time::timeout(self.max_wait, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            _ => Err(bulkhead_full(scope)),
        }
    }
}

fn bulkhead_full(scope: &str) -> Error {
    Error::api(0, format!("Too many concurrent requests for {scope}"))
}

struct LimiterInner {
    tokens: f64,
    last_refill: Instant,
    blocked_until: Option<Instant>,
}

/// Token bucket rate limiter, optionally blocked by server Retry-After.
struct RateLimiter {
    config: RateLimitConfig,
    inner: Mutex<LimiterInner>,
}

impl RateLimiter {
    fn new(config: RateLimitConfig) -> Self {
        let inner = LimiterInner {
            tokens: config.burst_size as f64,
            last_refill: Instant::now(),
            blocked_until: None,
        };
        RateLimiter {
            config,
            inner: Mutex::new(inner),
        }
    }

    fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        if self.config.respect_retry_after {
            if let Some(until) = inner.blocked_until {
                if now < until {
                    return false;
                }
                inner.blocked_until = None;
            }
        }
        self.refill(&mut inner, now);
        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&self, inner: &mut LimiterInner, now: Instant) {
        let elapsed = now.saturating_duration_since(inner.last_refill);
        inner.last_refill = now;
        inner.tokens = (inner.tokens + elapsed.as_secs_f64() * self.config.requests_per_second)
            .min(self.config.burst_size as f64);
    }

    /// Blocks the limiter for `delay` from now. A later existing block wins.
    fn note_retry_after(&self, delay: Duration) {
        self.note_retry_after_at(Instant::now(), delay);
    }

    fn note_retry_after_at(&self, now: Instant, delay: Duration) {
        if !self.config.respect_retry_after {
            return;
        }
        let until = now + delay;
        let mut inner = self.inner.lock();
        if inner.blocked_until.is_none_or(|existing| until > existing) {
            inner.blocked_until = Some(until);
        }
    }

    fn retry_after_remaining_at(&self, now: Instant) -> Option<Duration> {
        let inner = self.inner.lock();
        inner
            .blocked_until
            .map(|until| until.saturating_duration_since(now))
            .filter(|remaining| !remaining.is_zero())
    }
}

/// Lazily creates one breaker or bulkhead per operation scope.
struct Registry<T> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Registry {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, scope: &str, create: impl FnOnce() -> T) -> Arc<T> {
        if let Some(entry) = self.entries.read().get(scope) {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write();
        // Another task may have created it between the locks.
        if let Some(entry) = entries.get(scope) {
            return Arc::clone(entry);
        }
        let entry = Arc::new(create());
        entries.insert(scope.to_string(), Arc::clone(&entry));
        entry
    }
}

/// Gate released when the operation finishes. Holds the bulkhead slot.
pub(crate) struct ResilienceGuard {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Runtime state for the enabled resilience features. Checked by
/// `run_operation` before any HTTP attempt; outcomes feed back in afterward.
pub(crate) struct ResilienceLayer {
    breaker_config: Option<CircuitBreakerConfig>,
    breakers: Registry<CircuitBreaker>,
    bulkhead_config: Option<BulkheadConfig>,
    bulkheads: Registry<Bulkhead>,
    rate_limiter: Option<RateLimiter>,
}

impl ResilienceLayer {
    /// Returns `None` when every feature is disabled.
    pub(crate) fn new(config: ResilienceConfig) -> Option<Self> {
        if config.circuit_breaker.is_none()
            && config.bulkhead.is_none()
            && config.rate_limit.is_none()
        {
            return None;
        }
        Some(ResilienceLayer {
            breaker_config: config.circuit_breaker,
            breakers: Registry::new(),
            bulkhead_config: config.bulkhead,
            bulkheads: Registry::new(),
            rate_limiter: config.rate_limit.map(RateLimiter::new),
        })
    }

    /// Checks every gate for the scope: circuit breaker first, then a
    /// bulkhead slot, then the rate limiter. An early return drops the
    /// acquired permit, so nothing leaks on rejection.
    pub(crate) async fn admit(&self, scope: &str) -> Result<ResilienceGuard> {
        if let Some(config) = &self.breaker_config {
            let breaker = self.breakers.get(scope, || CircuitBreaker::new(config.clone()));
            if !breaker.allow() {
                tracing::debug!(scope, state = breaker.state_name(), "circuit rejected operation");
                return Err(Error::api(0, format!("Circuit breaker is open for {scope}")));
            }
        }

        let permit = match &self.bulkhead_config {
            Some(config) => {
                let bulkhead = self.bulkheads.get(scope, || Bulkhead::new(config));
                Some(bulkhead.acquire(scope).await?)
            }
            None => None,
        };

        if let Some(limiter) = &self.rate_limiter {
            if !limiter.allow() {
                let retry_after = limiter
                    .retry_after_remaining_at(Instant::now())
                    .map(|remaining| remaining.as_secs().max(1));
                return Err(Error::RateLimit {
                    message: "Client-side rate limit exceeded".to_string(),
                    retry_after,
                    hint: Some("Reduce request rate or raise the rate limit config".to_string()),
                    request_id: None,
                });
            }
        }

        Ok(ResilienceGuard { _permit: permit })
    }

    /// Feeds an operation outcome into the scope's circuit breaker. Only
    /// server-side failures count against it; 4xx responses describe the
    /// request, not the service.
    pub(crate) fn record_outcome(&self, scope: &str, error: Option<&Error>) {
        if let Some(config) = &self.breaker_config {
            let breaker = self.breakers.get(scope, || CircuitBreaker::new(config.clone()));
            match error {
                None => breaker.record_success(),
                Some(error) if should_trip(error) => breaker.record_failure(),
                Some(_) => {}
            }
        }
    }

    /// Propagates server throttling into the client-side limiter. A 429
    /// without Retry-After blocks for a default window; 503 blocks only
    /// when the header is explicit.
    pub(crate) fn observe_response(&self, status: u16, retry_after: Option<u64>) {
        let Some(limiter) = &self.rate_limiter else {
            return;
        };
        match (status, retry_after) {
            (429, secs) => limiter.note_retry_after(Duration::from_secs(
                secs.unwrap_or(defaults::DEFAULT_RETRY_AFTER_SECS),
            )),
            (503, Some(secs)) => limiter.note_retry_after(Duration::from_secs(secs)),
            _ => {}
        }
    }
}

/// Whether an error counts as a circuit breaker failure.
fn should_trip(error: &Error) -> bool {
    match error {
        Error::Network { .. } => true,
        Error::Api { status, .. } => *status >= 500,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(config: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new(config)
    }

    #[test]
    fn circuit_opens_after_consecutive_failures() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });
        let now = Instant::now();
        assert!(cb.allow_at(now));
        for _ in 0..3 {
            cb.record_failure_at(now);
        }
        assert!(!cb.allow_at(now));
        assert_eq!(cb.state_name(), "open");
    }

    #[test]
    fn success_resets_consecutive_failure_count() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });
        let now = Instant::now();
        cb.record_failure_at(now);
        cb.record_failure_at(now);
        cb.record_success();
        cb.record_failure_at(now);
        cb.record_failure_at(now);
        assert!(cb.allow_at(now));
    }

    #[test]
    fn open_circuit_probes_after_timeout_and_closes_on_successes() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            ..Default::default()
        });
        let t0 = Instant::now();
        cb.record_failure_at(t0);
        assert!(!cb.allow_at(t0 + Duration::from_secs(1)));

        // After the timeout the circuit half-opens and lets a probe through.
        assert!(cb.allow_at(t0 + Duration::from_secs(30)));
        assert_eq!(cb.state_name(), "half-open");

        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state_name(), "closed");
    }

    #[test]
    fn half_open_failure_reopens_the_circuit() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            open_timeout: Duration::from_secs(30),
            ..Default::default()
        });
        let t0 = Instant::now();
        cb.record_failure_at(t0);
        assert!(cb.allow_at(t0 + Duration::from_secs(30)));
        cb.record_failure_at(t0 + Duration::from_secs(30));
        assert!(!cb.allow_at(t0 + Duration::from_secs(31)));
    }

    #[test]
    fn failure_rate_opens_circuit_once_window_fills() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 100,
            failure_rate_threshold: 50.0,
            sliding_window: 4,
            ..Default::default()
        });
        let now = Instant::now();
        // Alternating outcomes: 50% failure rate, but the window is not
        // full until the fourth result.
        cb.record_failure_at(now);
        cb.record_success();
        cb.record_failure_at(now);
        assert!(cb.allow_at(now));
        cb.record_success();
        cb.record_failure_at(now);
        assert!(!cb.allow_at(now));
    }

    #[tokio::test]
    async fn bulkhead_rejects_when_full_and_recovers_on_release() {
        let bulkhead = Bulkhead::new(&BulkheadConfig {
            max_concurrent: 1,
            max_wait: Duration::ZERO,
        });
        let permit = bulkhead.acquire("test.op").await.unwrap();
        let err = bulkhead.acquire("test.op").await.unwrap_err();
        assert!(err.message().contains("concurrent"));

        drop(permit);
        assert!(bulkhead.acquire("test.op").await.is_ok());
    }

    #[tokio::test]
    async fn bulkhead_times_out_waiting_for_a_slot() {
        let bulkhead = Bulkhead::new(&BulkheadConfig {
            max_concurrent: 1,
            max_wait: Duration::from_millis(10),
        });
        let _held = bulkhead.acquire("test.op").await.unwrap();
        assert!(bulkhead.acquire("test.op").await.is_err());
    }

    #[test]
    fn limiter_allows_burst_then_refills_over_time() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 1.0,
            burst_size: 2,
            respect_retry_after: true,
        });
        let t0 = Instant::now();
        assert!(limiter.allow_at(t0));
        assert!(limiter.allow_at(t0));
        assert!(!limiter.allow_at(t0));
        assert!(limiter.allow_at(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn retry_after_blocks_the_limiter_until_it_expires() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let t0 = Instant::now();
        limiter.note_retry_after_at(t0, Duration::from_secs(60));
        assert!(!limiter.allow_at(t0 + Duration::from_secs(30)));
        assert!(limiter.allow_at(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn later_retry_after_extends_an_existing_block() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let t0 = Instant::now();
        limiter.note_retry_after_at(t0, Duration::from_secs(60));
        limiter.note_retry_after_at(t0, Duration::from_secs(10));
        assert!(!limiter.allow_at(t0 + Duration::from_secs(30)));
    }

    #[test]
    fn retry_after_is_ignored_when_disabled() {
        let limiter = RateLimiter::new(RateLimitConfig {
            respect_retry_after: false,
            ..Default::default()
        });
        let t0 = Instant::now();
        limiter.note_retry_after_at(t0, Duration::from_secs(60));
        assert!(limiter.allow_at(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn only_server_side_errors_trip_the_circuit() {
        assert!(should_trip(&Error::network("connection reset")));
        assert!(should_trip(&Error::api(500, "boom")));
        assert!(should_trip(&Error::api(503, "unavailable")));
        assert!(!should_trip(&Error::not_found("gone")));
        assert!(!should_trip(&Error::rate_limit(Some(5))));
        assert!(!should_trip(&Error::validation("bad field")));
        assert!(!should_trip(&Error::api(0, "origin mismatch")));
    }

    mod gating {
        use std::sync::Arc;

        use reqwest::Method;

        use crate::error::Error;
        use crate::hooks::OperationInfo;
        use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, ResilienceConfig};
        use crate::retry::{RetryPolicy, RetryTable};
        use crate::test_helpers::mock_api_server;
        use crate::{Client, StaticTokenProvider, TokenProvider};

        fn resilient_client(server: &mockito::ServerGuard, config: ResilienceConfig) -> Client {
            Client::builder()
                .token_provider(
                    Arc::new(StaticTokenProvider::new("test-token")) as Arc<dyn TokenProvider>
                )
                .base_url(server.url())
                .retry_table(RetryTable::new().with("projects.list", RetryPolicy::none()))
                .resilience(Some(config))
                .build()
                .unwrap()
        }

        fn list_op() -> OperationInfo {
            OperationInfo {
                service: "projects".to_string(),
                operation: "list".to_string(),
                ..Default::default()
            }
        }

        #[tokio::test]
        async fn repeated_server_errors_open_the_circuit() {
            let mut server = mock_api_server().await;
            let mock = server
                .mock("GET", "/projects.json")
                .with_status(500)
                .with_body("{}")
                .expect(2)
                .create_async()
                .await;

            let client = resilient_client(
                &server,
                ResilienceConfig {
                    circuit_breaker: Some(CircuitBreakerConfig {
                        failure_threshold: 2,
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            );

            let info = list_op();
            for _ in 0..2 {
                let result = client
                    .run_operation(&info, async {
                        client
                            .execute(Method::GET, "/projects.json", None, Some("projects.list"))
                            .await?
                            .into_result()
                    })
                    .await;
                assert!(result.is_err());
            }

            // The third operation is rejected before any HTTP attempt.
            let err = client
                .run_operation(&info, async {
                    client
                        .execute(Method::GET, "/projects.json", None, Some("projects.list"))
                        .await?
                        .into_result()
                })
                .await
                .unwrap_err();
            assert!(err.message().contains("Circuit breaker is open"));
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn not_found_responses_do_not_open_the_circuit() {
            let mut server = mock_api_server().await;
            server
                .mock("GET", "/projects.json")
                .with_status(404)
                .with_body("{}")
                .expect(3)
                .create_async()
                .await;

            let client = resilient_client(
                &server,
                ResilienceConfig {
                    circuit_breaker: Some(CircuitBreakerConfig {
                        failure_threshold: 2,
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            );

            let info = list_op();
            for _ in 0..3 {
                let err = client
                    .run_operation(&info, async {
                        client
                            .execute(Method::GET, "/projects.json", None, Some("projects.list"))
                            .await?
                            .into_result()
                    })
                    .await
                    .unwrap_err();
                assert!(matches!(err, Error::NotFound { .. }));
            }
        }

        #[tokio::test]
        async fn exhausted_burst_rejects_client_side() {
            let mut server = mock_api_server().await;
            let mock = server
                .mock("GET", "/projects.json")
                .with_status(200)
                .with_body("[]")
                .expect(1)
                .create_async()
                .await;

            let client = resilient_client(
                &server,
                ResilienceConfig {
                    rate_limit: Some(RateLimitConfig {
                        requests_per_second: 0.001,
                        burst_size: 1,
                        respect_retry_after: true,
                    }),
                    ..Default::default()
                },
            );

            let info = list_op();
            client
                .run_operation(&info, async {
                    client
                        .execute(Method::GET, "/projects.json", None, Some("projects.list"))
                        .await?
                        .into_result()
                })
                .await
                .unwrap();

            let err = client
                .run_operation(&info, async {
                    client
                        .execute(Method::GET, "/projects.json", None, Some("projects.list"))
                        .await?
                        .into_result()
                })
                .await
                .unwrap_err();
            assert!(matches!(err, Error::RateLimit { .. }));
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn server_retry_after_blocks_later_operations() {
            let mut server = mock_api_server().await;
            let mock = server
                .mock("GET", "/projects.json")
                .with_status(429)
                .with_header("retry-after", "60")
                .with_body("{}")
                .expect(1)
                .create_async()
                .await;

            let client = resilient_client(
                &server,
                ResilienceConfig {
                    rate_limit: Some(RateLimitConfig::default()),
                    ..Default::default()
                },
            );

            let info = list_op();
            let first = client
                .run_operation(&info, async {
                    client
                        .execute(Method::GET, "/projects.json", None, Some("projects.list"))
                        .await?
                        .into_result()
                })
                .await
                .unwrap_err();
            assert!(matches!(first, Error::RateLimit { .. }));

            // The limiter saw the 429 and refuses to send more requests.
            let second = client
                .run_operation(&info, async {
                    client
                        .execute(Method::GET, "/projects.json", None, Some("projects.list"))
                        .await?
                        .into_result()
                })
                .await
                .unwrap_err();
            assert!(matches!(second, Error::RateLimit { .. }));
            mock.assert_async().await;
        }
    }
}
