/// OAuth 2.0 provider clients
///
/// Supported providers:
/// - Google (OpenID userinfo)
/// - GitHub (profile, with a verified-email fallback)
/// - Microsoft (Graph `/me`)
/// - Facebook (Graph `/me`)
/// - Email (pass-through for already verified local accounts)
///
/// ## Security
///
/// - Authorization-code flow with PKCE (S256) on every provider
/// - Token exchange and user info over HTTPS, bearer-authenticated
/// - User info must come back `200 OK`; anything else is an error, never a
///   partial identity
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::config::OAuthSettings;
use crate::error::{IdentityError, Result};
use crate::models::{OAuthClientConfig, OAuthIdentity, OAuthProvider};
use crate::security::pkce::CHALLENGE_METHOD;

pub mod email;
pub mod facebook;
pub mod github;
pub mod google;
pub mod microsoft;

pub use email::EmailProvider;
pub use facebook::FacebookProvider;
pub use github::GithubProvider;
pub use google::GoogleProvider;
pub use microsoft::MicrosoftProvider;

const USER_AGENT: &str = "identity-service";

/// One OAuth provider: static client configuration plus the two network calls
/// of the authorization-code flow.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    fn provider(&self) -> OAuthProvider;

    /// Client registration and endpoints. Deterministic, no I/O.
    fn client_config(&self) -> &OAuthClientConfig;

    /// Exchange an authorization code plus PKCE verifier for a provider access token.
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<String>;

    /// Resolve the identity behind a provider access token.
    async fn fetch_identity(&self, access_token: &str) -> Result<OAuthIdentity>;
}

/// Authorization URL for `config` carrying the state and an S256 challenge.
pub fn authorization_url(
    config: &OAuthClientConfig,
    state: &str,
    code_challenge: &str,
) -> Result<String> {
    if config.auth_url.is_empty() {
        return Err(IdentityError::Validation(
            "provider has no authorization endpoint".to_string(),
        ));
    }

    let scope = config.scopes.join(" ");
    let url = Url::parse_with_params(
        &config.auth_url,
        &[
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", CHALLENGE_METHOD),
            ("access_type", "offline"),
        ],
    )
    .map_err(|e| IdentityError::Internal(format!("invalid authorization endpoint: {e}")))?;

    Ok(url.into())
}

/// HTTP client shared by every provider. `timeout` bounds each request.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| IdentityError::Internal(format!("failed to build HTTP client: {e}")))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Standard authorization-code + PKCE exchange against `config.token_url`.
pub(crate) async fn exchange_authorization_code(
    http: &Client,
    provider: OAuthProvider,
    config: &OAuthClientConfig,
    code: &str,
    verifier: &str,
) -> Result<String> {
    let response = http
        .post(&config.token_url)
        .header(ACCEPT, "application/json")
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", config.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| IdentityError::OAuthError(format!("{provider} token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(IdentityError::OAuthError(format!(
            "{provider} token endpoint returned {status}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| IdentityError::OAuthError(format!("{provider} token response: {e}")))?;

    // GitHub reports exchange errors with a 200 and an `error` field
    match (token.access_token, token.error) {
        (Some(access_token), None) if !access_token.is_empty() => Ok(access_token),
        (_, error) => Err(IdentityError::OAuthError(format!(
            "{provider} token exchange rejected: {}",
            token
                .error_description
                .or(error)
                .unwrap_or_else(|| "no access token".to_string())
        ))),
    }
}

/// Bearer-authenticated GET that insists on `200 OK` and a well-formed body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    http: &Client,
    provider: OAuthProvider,
    url: &str,
    access_token: &str,
) -> Result<T> {
    let response = http
        .get(url)
        .bearer_auth(access_token)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| IdentityError::OAuthError(format!("{provider} request failed: {e}")))?;

    let status = response.status();
    if status != StatusCode::OK {
        warn!(provider = %provider, status = %status, "Identity request rejected");
        return Err(IdentityError::OAuthError(format!(
            "{provider} returned {status}"
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| {
            IdentityError::OAuthError(format!("{provider} returned malformed payload: {e}"))
        })
}

/// Configured providers by identifier.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<OAuthProvider, Arc<dyn OAuthClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every provider that has credentials, plus the email pass-through.
    pub fn from_settings(settings: &OAuthSettings, http: Client) -> Self {
        let redirect_uri = settings.redirect_uri();
        let mut registry = Self::new().with(Arc::new(EmailProvider::new()));

        if let Some(credentials) = &settings.google {
            registry = registry.with(Arc::new(GoogleProvider::new(
                credentials,
                redirect_uri.clone(),
                http.clone(),
            )));
        }
        if let Some(credentials) = &settings.github {
            registry = registry.with(Arc::new(GithubProvider::new(
                credentials,
                redirect_uri.clone(),
                http.clone(),
            )));
        }
        if let Some(credentials) = &settings.microsoft {
            registry = registry.with(Arc::new(MicrosoftProvider::new(
                credentials,
                &settings.microsoft_tenant,
                redirect_uri.clone(),
                http.clone(),
            )));
        }
        if let Some(credentials) = &settings.facebook {
            registry = registry.with(Arc::new(FacebookProvider::new(
                credentials,
                redirect_uri,
                http,
            )));
        }

        info!(
            providers = ?registry.providers.keys().map(|p| p.as_str()).collect::<Vec<_>>(),
            "OAuth providers registered"
        );
        registry
    }

    /// Add or replace the client for its provider.
    pub fn with(mut self, client: Arc<dyn OAuthClient>) -> Self {
        self.providers.insert(client.provider(), client);
        self
    }

    /// Look up a provider by identifier. Unknown or unconfigured identifiers
    /// are a bad request.
    pub fn resolve(&self, provider: &str) -> Result<Arc<dyn OAuthClient>> {
        self.get(provider.parse()?)
    }

    pub fn get(&self, provider: OAuthProvider) -> Result<Arc<dyn OAuthClient>> {
        self.providers
            .get(&provider)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownProvider(provider.to_string()))
    }
}
