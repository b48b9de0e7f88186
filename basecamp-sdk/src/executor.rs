// ABOUTME: Request executor with retries, token refresh, and conditional caching
// ABOUTME: Returns any HTTP status as a value; only transport failures are errors

use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap};
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use crate::cache::ResponseCache;
use crate::constants::limits::{MAX_ERROR_BODY, MAX_RESPONSE_BODY};
use crate::error::{parse_retry_after, Error, Result};
use crate::hooks::{shielded, RequestInfo, RequestResult};
use crate::retry::backoff_delay;
use crate::security::{read_body_limited, require_https};
use crate::Client;

/// A fully buffered HTTP response.
///
/// The executor hands back every status code as a value; callers decide
/// whether a 404 is an error or an answer. `url` is the final URL after
/// redirects, which pagination uses to resolve relative links;
/// `request_url` is the URL the request was sent to, which anchors the
/// pagination origin check so a redirect cannot move the walk off-site.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub url: Url,
    pub request_url: Url,
    /// Whether the body was served from the local ETag cache after a 304.
    pub from_cache: bool,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserializes the body. An empty body (204 No Content) decodes as JSON
    /// null so `Option<T>` targets work.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes: &[u8] = if self.body.is_empty() {
            b"null"
        } else {
            &self.body
        };
        serde_json::from_slice(bytes)
            .map_err(|e| Error::api(self.status, format!("Failed to parse response body: {e}")))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header("x-request-id")
    }

    /// Converts non-success statuses into their typed error.
    pub fn into_result(self) -> Result<ApiResponse> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::from_response(self.status, &self.headers, &self.body))
        }
    }
}

/// Request body, borrowed so retries can resend it.
#[derive(Clone, Copy)]
pub(crate) enum Payload<'a> {
    Empty,
    Json(&'a serde_json::Value),
    Binary {
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

impl Client {
    /// Executes a request against an API path (or absolute URL) and returns
    /// the response whatever its status.
    ///
    /// Retries follow the policy resolved for `operation`, falling back to
    /// method semantics: idempotent methods retry 429 and 503 with backoff,
    /// mutating methods never retry. A 401 gets one extra attempt if the
    /// token provider reports a successful refresh.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        operation: Option<&str>,
    ) -> Result<ApiResponse> {
        let url = self.request_url(path)?;
        let payload = match body {
            Some(value) => Payload::Json(value),
            None => Payload::Empty,
        };
        self.execute_with_retries(method, url, payload, operation)
            .await
    }

    /// Uploads raw bytes with the given content type. Uploads are never
    /// retried: the server may have stored the file even when the response
    /// was lost, and resending would duplicate it.
    pub async fn upload(
        &self,
        path: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<ApiResponse> {
        let url = self.request_url(path)?;
        self.send_once(
            &Method::POST,
            &url,
            Payload::Binary {
                content_type,
                bytes,
            },
            1,
        )
        .await
    }

    async fn execute_with_retries(
        &self,
        method: Method,
        url: Url,
        payload: Payload<'_>,
        operation: Option<&str>,
    ) -> Result<ApiResponse> {
        let policy = self.inner.retry_table.resolve(operation, &method);
        let mut attempt: u32 = 1;
        let mut refreshed = false;

        loop {
            let response = self.send_once(&method, &url, payload, attempt).await?;

            if response.status == 401 && !refreshed {
                refreshed = true;
                match self.inner.token_provider.refresh().await {
                    Ok(true) => {
                        let info = request_info(&method, &url, attempt);
                        let error = Error::auth("Token rejected, retrying after refresh");
                        shielded(|| {
                            self.inner
                                .hooks
                                .on_retry(&info, attempt + 1, &error, Duration::ZERO)
                        });
                        attempt += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(error) => {
                        tracing::debug!(error = %error, "token refresh failed");
                    }
                }
            }

            if attempt < policy.max_attempts && policy.should_retry(response.status) {
                let delay = retry_delay(&policy, response.status, &response.headers, attempt);
                let error =
                    Error::from_response(response.status, &response.headers, &response.body);
                let info = request_info(&method, &url, attempt);
                shielded(|| self.inner.hooks.on_retry(&info, attempt + 1, &error, delay));
                tracing::debug!(
                    status = response.status,
                    next_attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Ok(response);
        }
    }

    /// One request attempt: resolve the token, send, read a bounded body,
    /// and consult the ETag cache for GETs.
    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        payload: Payload<'_>,
        attempt: u32,
    ) -> Result<ApiResponse> {
        let token = self.inner.token_provider.access_token().await?;

        let mut request = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::USER_AGENT, &self.inner.user_agent)
            .header(header::ACCEPT, "application/json");

        match payload {
            Payload::Empty => {}
            Payload::Json(value) => {
                request = request
                    .header(header::CONTENT_TYPE, "application/json")
                    .json(value);
            }
            Payload::Binary {
                content_type,
                bytes,
            } => {
                request = request
                    .header(header::CONTENT_TYPE, content_type)
                    .body(bytes.to_vec());
            }
        }

        let cache_key = if self.inner.cache.is_some() && *method == Method::GET {
            Some(ResponseCache::key(url.as_str(), "", &token))
        } else {
            None
        };
        if let (Some(cache), Some(key)) = (&self.inner.cache, &cache_key) {
            if let Some(etag) = cache.etag(key) {
                request = request.header(header::IF_NONE_MATCH, etag);
            }
        }

        let info = request_info(method, url, attempt);
        shielded(|| self.inner.hooks.on_request_start(&info));
        let started = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                let result = RequestResult {
                    status: 0,
                    duration: started.elapsed(),
                    error: Some(error.to_string()),
                    from_cache: false,
                };
                shielded(|| self.inner.hooks.on_request_end(&info, &result));
                return Err(Error::from(error));
            }
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let final_url = response.url().clone();

        if let Some(resilience) = &self.inner.resilience {
            resilience.observe_response(status, parse_retry_after(&headers));
        }

        if status == 304 {
            let result = RequestResult {
                status,
                duration: started.elapsed(),
                error: None,
                from_cache: true,
            };
            shielded(|| self.inner.hooks.on_request_end(&info, &result));
            if let (Some(cache), Some(key)) = (&self.inner.cache, &cache_key) {
                if let Some(body) = cache.body(key) {
                    return Ok(ApiResponse {
                        status: 200,
                        headers,
                        body,
                        url: final_url,
                        request_url: url.clone(),
                        from_cache: true,
                    });
                }
            }
            return Err(Error::api(
                304,
                "Server returned 304 but no cached response is available",
            ));
        }

        let result = RequestResult {
            status,
            duration: started.elapsed(),
            error: None,
            from_cache: false,
        };
        shielded(|| self.inner.hooks.on_request_end(&info, &result));

        let limit = if (200..300).contains(&status) {
            MAX_RESPONSE_BODY
        } else {
            MAX_ERROR_BODY
        };
        let body = read_body_limited(response, limit).await?;

        if status == 200 {
            if let (Some(cache), Some(key)) = (&self.inner.cache, &cache_key) {
                if let Some(etag) = headers.get(header::ETAG).and_then(|v| v.to_str().ok()) {
                    if let Err(error) = cache.store(key, etag, &body) {
                        tracing::debug!(error = %error, "failed to write response cache");
                    }
                }
            }
        }

        Ok(ApiResponse {
            status,
            headers,
            body,
            url: final_url,
            request_url: url.clone(),
            from_cache: false,
        })
    }

    /// Resolves a path against the base URL. Absolute URLs pass through
    /// after the scheme check, which pagination relies on.
    pub(crate) fn request_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            let url = Url::parse(path)
                .map_err(|e| Error::usage(format!("Invalid request URL {path}: {e}")))?;
            require_https(&url)?;
            return Ok(url);
        }
        let joined = format!(
            "{}/{}",
            self.inner.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| Error::usage(format!("Invalid request path {path}: {e}")))
    }
}

fn request_info(method: &Method, url: &Url, attempt: u32) -> RequestInfo {
    RequestInfo {
        method: method.to_string(),
        url: url.to_string(),
        attempt,
    }
}

/// Delay before the next attempt. Retry-After wins for 429s when the server
/// provides one; everything else gets exponential backoff with jitter.
fn retry_delay(
    policy: &crate::retry::RetryPolicy,
    status: u16,
    headers: &HeaderMap,
    attempt: u32,
) -> Duration {
    if status == 429 {
        if let Some(secs) = parse_retry_after(headers) {
            return Duration::from_secs(secs);
        }
    }
    backoff_delay(policy.base_delay_ms, attempt)
}
