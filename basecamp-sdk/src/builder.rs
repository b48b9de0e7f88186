// ABOUTME: Builder pattern implementation for Client configuration
// ABOUTME: Provides type-safe configuration with compile-time required fields

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use typed_builder::TypedBuilder;
use url::Url;

use crate::cache::ResponseCache;
use crate::constants;
use crate::constants::limits::MAX_REDIRECTS;
use crate::error::{Error, Result};
use crate::hooks::{chain_hooks, Hooks};
use crate::resilience::{ResilienceConfig, ResilienceLayer};
use crate::retry::RetryTable;
use crate::security::require_https;
use crate::token::TokenProvider;
use crate::{Client, ClientInner};

#[derive(TypedBuilder)]
#[builder(build_method(into = Result<Client, Error>))]
pub struct ClientConfig {
    pub token_provider: Arc<dyn TokenProvider>,

    #[builder(default = constants::urls::API_BASE.to_string(), setter(into))]
    pub base_url: String,

    #[builder(default = constants::DEFAULT_USER_AGENT.to_string(), setter(into))]
    pub user_agent: String,

    #[builder(default = constants::timeouts::HTTP_REQUEST)]
    pub timeout: Duration,

    #[builder(default = None)]
    pub proxy: Option<reqwest::Proxy>,

    #[builder(default)]
    pub retry_table: RetryTable,

    #[builder(default)]
    pub hooks: Vec<Arc<dyn Hooks>>,

    #[builder(default = None)]
    pub cache_dir: Option<PathBuf>,

    #[builder(default = false)]
    pub cache_enabled: bool,

    #[builder(default = constants::pagination::MAX_PAGES)]
    pub max_pages: u32,

    /// Opt-in circuit breaker, bulkhead, and client-side rate limiting.
    #[builder(default = None)]
    pub resilience: Option<ResilienceConfig>,
}

impl From<ClientConfig> for Result<Client, Error> {
    fn from(config: ClientConfig) -> Self {
        Client::from_config(config)
    }
}

impl Client {
    pub fn builder() -> ClientConfigBuilder<((), (), (), (), (), (), (), (), (), (), ())> {
        ClientConfig::builder()
    }

    pub(crate) fn from_config(config: ClientConfig) -> Result<Client> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::usage(format!("Invalid base URL {}: {e}", config.base_url)))?;
        require_https(&base_url)?;

        let mut http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));
        if let Some(proxy) = config.proxy {
            http = http.proxy(proxy);
        }
        let http = http
            .build()
            .map_err(|e| Error::usage(format!("Failed to build HTTP client: {e}")))?;

        let cache = if config.cache_enabled {
            let dir = config
                .cache_dir
                .or_else(ResponseCache::default_dir)
                .ok_or_else(|| {
                    Error::usage("No cache directory available; set cache_dir explicitly")
                })?;
            Some(ResponseCache::new(dir))
        } else {
            None
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                user_agent: config.user_agent,
                token_provider: config.token_provider,
                hooks: chain_hooks(config.hooks),
                cache,
                retry_table: config.retry_table,
                max_pages: config.max_pages,
                resilience: config.resilience.and_then(ResilienceLayer::new),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticTokenProvider;

    fn provider() -> Arc<dyn TokenProvider> {
        Arc::new(StaticTokenProvider::new("test-token"))
    }

    #[test]
    fn builds_with_minimal_config() {
        let client = Client::builder().token_provider(provider()).build();
        assert!(client.is_ok());
    }

    #[test]
    fn builds_with_all_options() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::builder()
            .token_provider(provider())
            .base_url("https://3.basecampapi.com")
            .user_agent("custom-agent/1.0")
            .timeout(Duration::from_secs(60))
            .retry_table(RetryTable::new())
            .hooks(vec![Arc::new(crate::hooks::TracingHooks) as Arc<dyn Hooks>])
            .cache_enabled(true)
            .cache_dir(Some(dir.path().to_path_buf()))
            .max_pages(10)
            .resilience(Some(ResilienceConfig::all()))
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let result = Client::builder()
            .token_provider(provider())
            .base_url("not a url")
            .build();
        assert!(matches!(result, Err(Error::Usage { .. })));
    }

    #[test]
    fn rejects_plain_http_base_url() {
        let result = Client::builder()
            .token_provider(provider())
            .base_url("http://example.com")
            .build();
        assert!(matches!(result, Err(Error::Usage { .. })));
    }

    #[test]
    fn allows_localhost_http_base_url() {
        let result = Client::builder()
            .token_provider(provider())
            .base_url("http://127.0.0.1:8080")
            .build();
        assert!(result.is_ok());
    }
}
