// ABOUTME: OAuth 2.0 support for the Launchpad authorization server
// ABOUTME: PKCE generation, metadata discovery, and token exchange/refresh

use std::time::{Duration, SystemTime};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use typed_builder::TypedBuilder;
use url::Url;

use crate::constants::auth::TOKEN_EXPIRY_BUFFER;
use crate::constants::limits::{MAX_ERROR_BODY, MAX_TOKEN_RESPONSE};
use crate::constants::urls::OAUTH_DISCOVERY_PATH;
use crate::error::{truncate_message, Error, Result};
use crate::security::{read_body_limited, require_https};

/// A PKCE verifier/challenge pair for the S256 method.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// The secret sent with the token exchange.
    pub verifier: String,
    /// SHA-256 of the verifier, sent with the authorization request.
    pub challenge: String,
}

impl Pkce {
    /// The only challenge method this SDK supports.
    pub const METHOD: &'static str = "S256";

    /// Generates a fresh verifier from 32 random bytes and derives its
    /// challenge.
    pub fn generate() -> Self {
        let verifier = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>());
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Pkce {
            verifier,
            challenge,
        }
    }
}

/// Generates a random state parameter for CSRF protection.
pub fn generate_state() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>())
}

/// Authorization server metadata from the well-known discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(default)]
    pub code_challenge_methods_supported: Option<Vec<String>>,
}

/// An OAuth access token with optional refresh material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Absolute expiry instant, derived from `expires_in` at receipt time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<SystemTime>,
}

impl OAuthToken {
    /// Whether the token is expired or within the default safety buffer of
    /// its expiry. Tokens without an expiry never expire.
    pub fn is_expired(&self) -> bool {
        self.is_expired_within(TOKEN_EXPIRY_BUFFER)
    }

    /// Whether the token expires within `buffer` from now.
    pub fn is_expired_within(&self, buffer: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => match expires_at.duration_since(SystemTime::now()) {
                Ok(remaining) => remaining <= buffer,
                Err(_) => true,
            },
            None => false,
        }
    }

    fn finalize(mut self) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self
                .expires_in
                .map(|secs| SystemTime::now() + Duration::from_secs(secs));
        }
        self
    }
}

/// Parameters for exchanging an authorization code for a token.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ExchangeRequest {
    #[builder(setter(into))]
    pub token_endpoint: String,
    #[builder(setter(into))]
    pub code: String,
    #[builder(setter(into))]
    pub redirect_uri: String,
    #[builder(setter(into))]
    pub client_id: String,
    #[builder(default, setter(into, strip_option))]
    pub client_secret: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub code_verifier: Option<String>,
    /// Use the pre-standard Launchpad form parameters (`type=web_server`)
    /// instead of RFC 6749 `grant_type`.
    #[builder(default = false)]
    pub legacy: bool,
}

/// Parameters for refreshing an expired token.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RefreshRequest {
    #[builder(setter(into))]
    pub token_endpoint: String,
    #[builder(setter(into))]
    pub refresh_token: String,
    #[builder(default, setter(into, strip_option))]
    pub client_id: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub client_secret: Option<String>,
    /// Use the pre-standard Launchpad form parameter (`type=refresh`).
    #[builder(default = false)]
    pub legacy: bool,
}

/// Fetches authorization server metadata from the well-known endpoint under
/// `base_url`.
pub async fn discover(http: &reqwest::Client, base_url: &str) -> Result<AuthServerMetadata> {
    let url = Url::parse(&format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        OAUTH_DISCOVERY_PATH
    ))
    .map_err(|e| Error::usage(format!("Invalid discovery base URL {base_url}: {e}")))?;
    require_https(&url)?;

    let response = http.get(url).send().await?;
    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        return Err(Error::auth(format!(
            "OAuth discovery failed with status {status}"
        )));
    }

    let body = read_body_limited(response, MAX_TOKEN_RESPONSE).await?;
    serde_json::from_slice(&body)
        .map_err(|e| Error::auth(format!("Invalid OAuth discovery response: {e}")))
}

/// Exchanges an authorization code for an access token.
pub async fn exchange(http: &reqwest::Client, request: &ExchangeRequest) -> Result<OAuthToken> {
    let mut form: Vec<(&str, &str)> = Vec::new();
    if request.legacy {
        form.push(("type", "web_server"));
    } else {
        form.push(("grant_type", "authorization_code"));
    }
    form.push(("code", &request.code));
    form.push(("redirect_uri", &request.redirect_uri));
    form.push(("client_id", &request.client_id));
    if let Some(secret) = &request.client_secret {
        form.push(("client_secret", secret));
    }
    if let Some(verifier) = &request.code_verifier {
        form.push(("code_verifier", verifier));
    }

    token_request(http, &request.token_endpoint, &form).await
}

/// Obtains a new access token from a refresh token. The caller should
/// replace its stored token wholesale with the result.
pub async fn refresh(http: &reqwest::Client, request: &RefreshRequest) -> Result<OAuthToken> {
    let mut form: Vec<(&str, &str)> = Vec::new();
    if request.legacy {
        form.push(("type", "refresh"));
    } else {
        form.push(("grant_type", "refresh_token"));
    }
    form.push(("refresh_token", &request.refresh_token));
    if let Some(client_id) = &request.client_id {
        form.push(("client_id", client_id));
    }
    if let Some(secret) = &request.client_secret {
        form.push(("client_secret", secret));
    }

    token_request(http, &request.token_endpoint, &form).await
}

async fn token_request(
    http: &reqwest::Client,
    endpoint: &str,
    form: &[(&str, &str)],
) -> Result<OAuthToken> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::usage(format!("Invalid token endpoint {endpoint}: {e}")))?;
    require_https(&url)?;

    let response = http.post(url).form(form).send().await?;
    let status = response.status().as_u16();

    if !(200..300).contains(&status) {
        let body = read_body_limited(response, MAX_ERROR_BODY).await?;
        return Err(token_error(status, &body));
    }

    let body = read_body_limited(response, MAX_TOKEN_RESPONSE).await?;
    let token: OAuthToken = serde_json::from_slice(&body)
        .map_err(|e| Error::auth(format!("Invalid token response: {e}")))?;
    if token.access_token.is_empty() {
        return Err(Error::auth("Token response missing access_token"));
    }
    Ok(token.finalize())
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

fn token_error(status: u16, body: &[u8]) -> Error {
    let parsed: Option<OAuthErrorBody> = serde_json::from_slice(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|b| b.error.clone())
        .unwrap_or_else(|| format!("token request failed with status {status}"));
    let message = match parsed.as_ref().and_then(|b| b.error_description.clone()) {
        Some(description) => truncate_message(format!("OAuth error {code}: {description}")),
        None => truncate_message(format!("OAuth error: {code}")),
    };
    Error::Auth {
        message,
        hint: None,
        request_id: None,
    }
}
