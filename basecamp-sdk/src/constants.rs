// ABOUTME: Centralized constants for the Basecamp SDK
// ABOUTME: Retry tuning, body size limits, pagination caps, and endpoint URLs

use std::time::Duration;

/// Default User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("basecamp-sdk-rs/", env!("CARGO_PKG_VERSION"));

/// Retry behavior configuration.
pub mod retry {
    /// Maximum attempts per request (initial attempt plus retries).
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff, in milliseconds.
    pub const BASE_DELAY_MS: u64 = 1_000;

    /// Upper bound (exclusive) on the random jitter added to each backoff delay.
    pub const MAX_JITTER_MS: u64 = 100;
}

/// Timeout configuration.
pub mod timeouts {
    use super::Duration;

    /// Timeout applied to every HTTP request.
    pub const HTTP_REQUEST: Duration = Duration::from_secs(30);
}

/// Body size limits. Reading stops as soon as a limit is exceeded so a
/// hostile or broken server cannot exhaust memory.
pub mod limits {
    /// Largest successful response body the SDK will buffer (50 MB).
    pub const MAX_RESPONSE_BODY: usize = 50 * 1024 * 1024;

    /// Largest error response body the SDK will buffer (1 MB).
    pub const MAX_ERROR_BODY: usize = 1024 * 1024;

    /// Largest OAuth token endpoint response the SDK will buffer (1 MB).
    pub const MAX_TOKEN_RESPONSE: usize = 1024 * 1024;

    /// Maximum length of an error message before truncation.
    pub const MAX_ERROR_MESSAGE: usize = 500;

    /// Maximum redirects followed per request.
    pub const MAX_REDIRECTS: usize = 10;
}

/// Defaults for the opt-in resilience layer.
pub mod resilience {
    use super::Duration;

    /// Consecutive failures before a circuit opens.
    pub const FAILURE_THRESHOLD: u32 = 5;

    /// Successes needed to close a half-open circuit.
    pub const SUCCESS_THRESHOLD: u32 = 2;

    /// Time an open circuit waits before probing with a half-open request.
    pub const OPEN_TIMEOUT: Duration = Duration::from_secs(30);

    /// Failure percentage over the sliding window that opens a circuit.
    pub const FAILURE_RATE_THRESHOLD: f64 = 50.0;

    /// Requests considered when computing the failure rate.
    pub const SLIDING_WINDOW: usize = 10;

    /// Maximum requests in flight per operation scope.
    pub const MAX_CONCURRENT: usize = 10;

    /// How long a request waits for a bulkhead slot before being rejected.
    pub const MAX_WAIT: Duration = Duration::from_secs(5);

    /// Sustained client-side request rate.
    pub const REQUESTS_PER_SECOND: f64 = 50.0;

    /// Requests allowed in a burst above the sustained rate.
    pub const BURST_SIZE: u32 = 10;

    /// Assumed Retry-After for a 429 that carries no header, in seconds.
    pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
}

/// Pagination configuration.
pub mod pagination {
    /// Safety cap on pages fetched per paginated listing.
    pub const MAX_PAGES: u32 = 1_000;
}

/// Endpoint URLs.
pub mod urls {
    /// Base URL for the Basecamp 3 API.
    pub const API_BASE: &str = "https://3.basecampapi.com";

    /// Base URL for the 37signals Launchpad (OAuth authorization server).
    pub const LAUNCHPAD_BASE: &str = "https://launchpad.37signals.com";

    /// Well-known path for OAuth authorization server metadata discovery.
    pub const OAUTH_DISCOVERY_PATH: &str = "/.well-known/oauth-authorization-server";
}

/// Token lifetime configuration.
pub mod auth {
    use super::Duration;

    /// Tokens are treated as expired this long before their actual expiry,
    /// so in-flight requests do not race the deadline.
    pub const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);
}
