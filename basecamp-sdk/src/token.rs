// ABOUTME: Token providers that supply bearer credentials to the executor
// ABOUTME: Static tokens and self-refreshing OAuth tokens with single-flight refresh

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use typed_builder::TypedBuilder;

use crate::constants::auth::TOKEN_EXPIRY_BUFFER;
use crate::error::{Error, Result};
use crate::oauth::{self, OAuthToken, RefreshRequest};

/// Source of bearer tokens for API requests.
///
/// `access_token` is called before every request attempt, so implementations
/// should be cheap on the happy path. `refresh` is invoked after a 401 to
/// give the provider one chance to obtain fresh credentials; returning
/// `Ok(false)` means nothing changed and the 401 stands.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token to authenticate the next request.
    async fn access_token(&self) -> Result<String>;

    /// Attempts to obtain fresh credentials. Returns whether the token
    /// actually changed.
    async fn refresh(&self) -> Result<bool> {
        Ok(false)
    }
}

/// Provider for a fixed token, such as a personal access token.
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<SecretString>) -> Self {
        StaticTokenProvider {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.expose_secret().to_string())
    }
}

/// Provider that refreshes an OAuth token before it expires.
///
/// The token is held behind an async mutex, so concurrent requests that all
/// observe an expired token perform a single refresh rather than a stampede.
#[derive(TypedBuilder)]
#[builder(build_method(into = RefreshingTokenProvider))]
pub struct RefreshingTokenConfig {
    pub token: OAuthToken,
    #[builder(setter(into))]
    pub token_endpoint: String,
    #[builder(default, setter(into, strip_option))]
    pub client_id: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub client_secret: Option<String>,
    /// Use the pre-standard Launchpad refresh form parameters.
    #[builder(default = false)]
    pub legacy: bool,
    #[builder(default = TOKEN_EXPIRY_BUFFER)]
    pub expiry_buffer: Duration,
    #[builder(default = reqwest::Client::new())]
    pub http: reqwest::Client,
}

pub struct RefreshingTokenProvider {
    config: RefreshingTokenConfig,
    state: Mutex<OAuthToken>,
}

impl From<RefreshingTokenConfig> for RefreshingTokenProvider {
    fn from(config: RefreshingTokenConfig) -> Self {
        let state = Mutex::new(config.token.clone());
        RefreshingTokenProvider { config, state }
    }
}

impl RefreshingTokenProvider {
    pub fn builder() -> RefreshingTokenConfigBuilder<((), (), (), (), (), (), ())> {
        RefreshingTokenConfig::builder()
    }

    /// Snapshot of the current token, for persisting across sessions.
    pub async fn current_token(&self) -> OAuthToken {
        self.state.lock().await.clone()
    }

    fn refresh_request(&self, refresh_token: &str) -> RefreshRequest {
        RefreshRequest {
            token_endpoint: self.config.token_endpoint.clone(),
            refresh_token: refresh_token.to_string(),
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
            legacy: self.config.legacy,
        }
    }

    /// Refreshes the guarded token in place. The lock is held across the
    /// refresh so concurrent callers wait instead of refreshing again.
    async fn refresh_locked(&self, state: &mut OAuthToken) -> Result<()> {
        let refresh_token = state
            .refresh_token
            .clone()
            .ok_or_else(|| Error::auth("Token expired and no refresh token is available"))?;
        let request = self.refresh_request(&refresh_token);
        *state = oauth::refresh(&self.config.http, &request).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenProvider for RefreshingTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.is_expired_within(self.config.expiry_buffer) && state.refresh_token.is_some() {
            self.refresh_locked(&mut state).await?;
        }
        Ok(state.access_token.clone())
    }

    async fn refresh(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.refresh_token.is_none() {
            return Ok(false);
        }
        self.refresh_locked(&mut state).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn token(access: &str, refresh: Option<&str>, expires_at: Option<SystemTime>) -> OAuthToken {
        OAuthToken {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            token_type: "Bearer".to_string(),
            expires_in: None,
            scope: None,
            expires_at,
        }
    }

    #[tokio::test]
    async fn static_provider_returns_token_and_declines_refresh() {
        let provider = StaticTokenProvider::new("secret-token");
        assert_eq!(provider.access_token().await.unwrap(), "secret-token");
        assert!(!provider.refresh().await.unwrap());
    }

    #[tokio::test]
    async fn unexpired_token_is_served_without_refresh() {
        let expires = SystemTime::now() + Duration::from_secs(3600);
        let provider = RefreshingTokenProvider::builder()
            .token(token("live", Some("refresh"), Some(expires)))
            .token_endpoint("https://launchpad.37signals.com/authorization/token")
            .build();
        assert_eq!(provider.access_token().await.unwrap(), "live");
    }

    #[tokio::test]
    async fn expired_token_triggers_refresh_on_access() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(200)
            .with_body(r#"{"access_token": "fresh", "token_type": "Bearer", "expires_in": 3600}"#)
            .expect(1)
            .create_async()
            .await;

        let expired = SystemTime::now() - Duration::from_secs(10);
        let provider = RefreshingTokenProvider::builder()
            .token(token("stale", Some("refresh"), Some(expired)))
            .token_endpoint(format!("{}/token", server.url()))
            .build();

        assert_eq!(provider.access_token().await.unwrap(), "fresh");
        // Second call serves the cached fresh token without another refresh.
        assert_eq!(provider.access_token().await.unwrap(), "fresh");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn forced_refresh_reports_whether_token_changed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token": "fresh", "token_type": "Bearer"}"#)
            .create_async()
            .await;

        let provider = RefreshingTokenProvider::builder()
            .token(token("stale", Some("refresh"), None))
            .token_endpoint(format!("{}/token", server.url()))
            .build();
        assert!(provider.refresh().await.unwrap());
        assert_eq!(provider.current_token().await.access_token, "fresh");

        let no_refresh = RefreshingTokenProvider::builder()
            .token(token("only-access", None, None))
            .token_endpoint(format!("{}/token", server.url()))
            .build();
        assert!(!no_refresh.refresh().await.unwrap());
    }

    #[tokio::test]
    async fn expired_without_refresh_token_serves_stale_access_token() {
        let expired = SystemTime::now() - Duration::from_secs(10);
        let provider = RefreshingTokenProvider::builder()
            .token(token("stale", None, Some(expired)))
            .token_endpoint("https://launchpad.37signals.com/authorization/token")
            .build();
        // Nothing to refresh with, so the stale token goes out and the
        // server's 401 drives the caller's error path.
        assert_eq!(provider.access_token().await.unwrap(), "stale");
    }
}
