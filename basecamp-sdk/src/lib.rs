// ABOUTME: Basecamp 3 API client runtime with retries, pagination, and caching
// ABOUTME: Exposes Client, AccountClient, and the supporting modules

//! Rust client runtime for the Basecamp 3 API.
//!
//! [`Client`] executes HTTP requests with automatic retries, bearer token
//! management, observability hooks, and an optional ETag response cache.
//! Most API paths live under an account, so typical use goes through
//! [`AccountClient`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use basecamp_sdk::{Client, StaticTokenProvider};
//!
//! # async fn example() -> basecamp_sdk::Result<()> {
//! let client = Client::builder()
//!     .token_provider(Arc::new(StaticTokenProvider::new("my-token")))
//!     .build()?;
//! let account = client.for_account("1234567")?;
//! let response = account.get("/projects.json").await?;
//! let projects: serde_json::Value = response.json()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;

pub mod builder;
pub mod cache;
pub mod constants;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod oauth;
pub mod pagination;
pub mod resilience;
pub mod retry;
mod security;
pub mod test_helpers;
pub mod token;

pub use builder::ClientConfig;
pub use cache::ResponseCache;
pub use error::{Error, Result};
pub use executor::ApiResponse;
pub use hooks::{
    chain_hooks, Hooks, NoopHooks, OperationInfo, RequestInfo, RequestResult, TracingHooks,
};
pub use oauth::{OAuthToken, Pkce};
pub use pagination::{ListMeta, ListResult, PaginationOptions};
pub use reqwest::Method;
pub use resilience::{BulkheadConfig, CircuitBreakerConfig, RateLimitConfig, ResilienceConfig};
pub use retry::{RetryPolicy, RetryTable};
pub use token::{RefreshingTokenProvider, StaticTokenProvider, TokenProvider};

use hooks::shielded;

/// Thread-safe handle to the API. Cloning is cheap; all clones share one
/// connection pool, token provider, and cache.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: url::Url,
    pub(crate) user_agent: String,
    pub(crate) token_provider: Arc<dyn TokenProvider>,
    pub(crate) hooks: Arc<dyn Hooks>,
    pub(crate) cache: Option<ResponseCache>,
    pub(crate) retry_table: RetryTable,
    pub(crate) max_pages: u32,
    pub(crate) resilience: Option<resilience::ResilienceLayer>,
}

impl Client {
    /// Scopes this client to one account. Nearly all Basecamp endpoints
    /// live under `/{account_id}/...`.
    pub fn for_account(&self, account_id: impl Into<String>) -> Result<AccountClient> {
        let account_id = account_id.into();
        if account_id.is_empty() || !account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::usage(format!(
                "Invalid account ID {account_id:?}: expected a numeric ID"
            )));
        }
        Ok(AccountClient {
            client: self.clone(),
            account_id,
        })
    }

    /// GET a path, mapping non-success statuses to typed errors.
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.execute(Method::GET, path, None, None)
            .await?
            .into_result()
    }

    /// POST a JSON body, mapping non-success statuses to typed errors.
    pub async fn post(&self, path: &str, body: Option<&serde_json::Value>) -> Result<ApiResponse> {
        self.execute(Method::POST, path, body, None)
            .await?
            .into_result()
    }

    /// PUT a JSON body, mapping non-success statuses to typed errors.
    pub async fn put(&self, path: &str, body: Option<&serde_json::Value>) -> Result<ApiResponse> {
        self.execute(Method::PUT, path, body, None)
            .await?
            .into_result()
    }

    /// DELETE a path, mapping non-success statuses to typed errors.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.execute(Method::DELETE, path, None, None)
            .await?
            .into_result()
    }

    /// Wraps a semantic operation with operation-level hooks. Start fires
    /// before the work, end fires after with the outcome and duration.
    ///
    /// When resilience is configured, the operation is gated first: an open
    /// circuit, a full bulkhead, or an exhausted rate limit rejects it
    /// before the hooks fire or any HTTP attempt is made, and the outcome
    /// feeds the circuit breaker for the operation's scope.
    pub async fn run_operation<T, F>(&self, info: &OperationInfo, work: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let scope = format!("{}.{}", info.service, info.operation);
        let _guard = match &self.inner.resilience {
            Some(layer) => Some(layer.admit(&scope).await?),
            None => None,
        };

        shielded(|| self.inner.hooks.on_operation_start(info));
        let started = Instant::now();
        let result = work.await;
        let duration = started.elapsed();

        if let Some(layer) = &self.inner.resilience {
            layer.record_outcome(&scope, result.as_ref().err());
        }
        shielded(|| {
            self.inner
                .hooks
                .on_operation_end(info, result.as_ref().err(), duration)
        });
        result
    }
}

/// A [`Client`] scoped to one account: every path is prefixed with the
/// account ID before dispatch.
#[derive(Clone)]
pub struct AccountClient {
    client: Client,
    account_id: String,
}

impl AccountClient {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// The unscoped client, for endpoints outside the account prefix.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn account_path(&self, path: &str) -> String {
        // Absolute URLs (pagination links) are already fully qualified, and
        // paths that begin with the account ID must not be prefixed twice.
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let trimmed = path.trim_start_matches('/');
        if trimmed == self.account_id
            || trimmed.starts_with(&format!("{}/", self.account_id))
        {
            return format!("/{trimmed}");
        }
        format!("/{}/{trimmed}", self.account_id)
    }

    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        operation: Option<&str>,
    ) -> Result<ApiResponse> {
        self.client
            .execute(method, &self.account_path(path), body, operation)
            .await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.client.get(&self.account_path(path)).await
    }

    pub async fn post(&self, path: &str, body: Option<&serde_json::Value>) -> Result<ApiResponse> {
        self.client.post(&self.account_path(path), body).await
    }

    pub async fn put(&self, path: &str, body: Option<&serde_json::Value>) -> Result<ApiResponse> {
        self.client.put(&self.account_path(path), body).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.client.delete(&self.account_path(path)).await
    }

    pub async fn upload(
        &self,
        path: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<ApiResponse> {
        self.client
            .upload(&self.account_path(path), content_type, bytes)
            .await
    }

    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        options: PaginationOptions,
        operation: Option<&str>,
    ) -> Result<ListResult<T>> {
        self.client
            .get_paginated(&self.account_path(path), options, operation)
            .await
    }

    pub fn stream_paginated<T>(
        &self,
        path: &str,
    ) -> impl futures_util::Stream<Item = Result<T>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.client.stream_paginated(&self.account_path(path))
    }

    pub async fn run_operation<T, F>(&self, info: &OperationInfo, work: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        self.client.run_operation(info, work).await
    }
}
