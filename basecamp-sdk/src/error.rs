// ABOUTME: Error taxonomy for the Basecamp SDK
// ABOUTME: Maps HTTP statuses to typed variants with hints, request IDs, and exit codes

use reqwest::header::HeaderMap;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::limits::MAX_ERROR_MESSAGE;

/// Convenience alias used throughout the SDK.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All errors the SDK surfaces to callers.
///
/// HTTP responses only become errors at the convenience layer; the executor
/// itself returns any status as a value. `Network` covers transport failures
/// where no HTTP status was received.
#[derive(Debug, Error)]
pub enum Error {
    /// Authentication failed or the token was rejected (HTTP 401).
    #[error("{message}")]
    Auth {
        message: String,
        hint: Option<String>,
        request_id: Option<String>,
    },

    /// The token is valid but lacks permission (HTTP 403).
    #[error("{message}")]
    Forbidden {
        message: String,
        hint: Option<String>,
        request_id: Option<String>,
    },

    /// The requested resource does not exist (HTTP 404).
    #[error("{message}")]
    NotFound {
        message: String,
        hint: Option<String>,
        request_id: Option<String>,
    },

    /// The server rejected the request payload (HTTP 422).
    #[error("{message}")]
    Validation {
        message: String,
        hint: Option<String>,
        request_id: Option<String>,
    },

    /// The server is rate limiting the client (HTTP 429).
    #[error("{message}")]
    RateLimit {
        message: String,
        /// Seconds to wait before retrying, from the Retry-After header.
        retry_after: Option<u64>,
        hint: Option<String>,
        request_id: Option<String>,
    },

    /// Any other non-success HTTP response.
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        hint: Option<String>,
        request_id: Option<String>,
        retryable: bool,
    },

    /// The request never produced an HTTP response.
    #[error("{message}")]
    Network {
        message: String,
        hint: Option<String>,
    },

    /// A name or reference matched more than one resource.
    #[error("{message}")]
    Ambiguous {
        message: String,
        matches: Vec<String>,
    },

    /// The caller supplied invalid arguments or configuration.
    #[error("{message}")]
    Usage {
        message: String,
        hint: Option<String>,
    },
}

/// Shape of Basecamp API error bodies.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth {
            message: truncate_message(message.into()),
            hint: None,
            request_id: None,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Error::Forbidden {
            message: truncate_message(message.into()),
            hint: None,
            request_id: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            message: truncate_message(message.into()),
            hint: None,
            request_id: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: truncate_message(message.into()),
            hint: None,
            request_id: None,
        }
    }

    pub fn rate_limit(retry_after: Option<u64>) -> Self {
        let message = match retry_after {
            Some(secs) => format!("Rate limited, retry after {secs}s"),
            None => "Rate limited".to_string(),
        };
        Error::RateLimit {
            message,
            retry_after,
            hint: None,
            request_id: None,
        }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Error::Api {
            status,
            message: truncate_message(message.into()),
            hint: None,
            request_id: None,
            retryable: is_retryable_status(status),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Error::Network {
            message: truncate_message(message.into()),
            hint: None,
        }
    }

    pub fn ambiguous(message: impl Into<String>, matches: Vec<String>) -> Self {
        Error::Ambiguous {
            message: truncate_message(message.into()),
            matches,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage {
            message: truncate_message(message.into()),
            hint: None,
        }
    }

    pub fn usage_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::Usage {
            message: truncate_message(message.into()),
            hint: Some(hint.into()),
        }
    }

    /// Maps a non-success HTTP response to the matching error variant.
    ///
    /// The body, when parseable as a Basecamp error payload, contributes the
    /// message and hint. The X-Request-Id header is attached when present so
    /// users can reference it in support requests.
    pub fn from_response(status: u16, headers: &HeaderMap, body: &[u8]) -> Self {
        let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();
        let server_message = parsed.as_ref().and_then(|b| b.error.clone());
        let hint = parsed
            .as_ref()
            .and_then(|b| b.error_description.clone())
            .map(truncate_message);
        let request_id = header_value(headers, "x-request-id");

        let message = |fallback: &str| {
            truncate_message(server_message.clone().unwrap_or_else(|| fallback.to_string()))
        };

        match status {
            401 => Error::Auth {
                message: message("Authentication failed"),
                hint,
                request_id,
            },
            403 => Error::Forbidden {
                message: message("Access forbidden"),
                hint,
                request_id,
            },
            404 => Error::NotFound {
                message: message("Resource not found"),
                hint,
                request_id,
            },
            422 => Error::Validation {
                message: message("Validation failed"),
                hint,
                request_id,
            },
            429 => {
                let retry_after = parse_retry_after(headers);
                let fallback = match retry_after {
                    Some(secs) => format!("Rate limited, retry after {secs}s"),
                    None => "Rate limited".to_string(),
                };
                Error::RateLimit {
                    message: message(&fallback),
                    retry_after,
                    hint,
                    request_id,
                }
            }
            _ => Error::Api {
                status,
                message: message(&format!("Request failed with status {status}")),
                hint,
                request_id,
                retryable: is_retryable_status(status),
            },
        }
    }

    /// The primary human-readable message.
    pub fn message(&self) -> &str {
        match self {
            Error::Auth { message, .. }
            | Error::Forbidden { message, .. }
            | Error::NotFound { message, .. }
            | Error::Validation { message, .. }
            | Error::RateLimit { message, .. }
            | Error::Api { message, .. }
            | Error::Network { message, .. }
            | Error::Ambiguous { message, .. }
            | Error::Usage { message, .. } => message,
        }
    }

    /// An optional actionable hint for resolving the error.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Error::Auth { hint, .. }
            | Error::Forbidden { hint, .. }
            | Error::NotFound { hint, .. }
            | Error::Validation { hint, .. }
            | Error::RateLimit { hint, .. }
            | Error::Api { hint, .. }
            | Error::Network { hint, .. }
            | Error::Usage { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    /// The server-assigned request ID, when one was returned.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::Auth { request_id, .. }
            | Error::Forbidden { request_id, .. }
            | Error::NotFound { request_id, .. }
            | Error::Validation { request_id, .. }
            | Error::RateLimit { request_id, .. }
            | Error::Api { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimit { .. } | Error::Network { .. } => true,
            Error::Api { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Process exit code for CLI front ends built on this SDK.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage { .. } => 1,
            Error::NotFound { .. } => 2,
            Error::Auth { .. } => 3,
            Error::Forbidden { .. } => 4,
            Error::RateLimit { .. } => 5,
            Error::Network { .. } => 6,
            Error::Api { .. } | Error::Validation { .. } => 7,
            Error::Ambiguous { .. } => 8,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::network(format!("Network error: {err}"))
    }
}

/// Statuses worth retrying: explicit throttling and transient server errors.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || status == 503 || (500..600).contains(&status)
}

/// Truncates a message to the display limit, appending "..." when cut.
pub(crate) fn truncate_message(message: String) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE {
        return message;
    }
    let kept: String = message.chars().take(MAX_ERROR_MESSAGE - 3).collect();
    format!("{kept}...")
}

/// Parses Retry-After as whole seconds. Dates and garbage yield None.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    let raw = header_value(headers, "retry-after")?;
    raw.trim().parse::<u64>().ok().filter(|secs| *secs > 0)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
