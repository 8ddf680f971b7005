use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{exchange_authorization_code, fetch_json, OAuthClient};
use crate::config::OAuthClientCredentials;
use crate::error::{IdentityError, Result};
use crate::models::{OAuthClientConfig, OAuthIdentity, OAuthProvider};

const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const API_BASE: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// The address GitHub marks as both primary and verified.
fn primary_verified_email(emails: Vec<GithubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}

#[derive(Clone)]
pub struct GithubProvider {
    config: OAuthClientConfig,
    api_base: String,
    http: Client,
}

impl GithubProvider {
    pub fn new(credentials: &OAuthClientCredentials, redirect_uri: String, http: Client) -> Self {
        Self {
            config: OAuthClientConfig {
                client_id: credentials.client_id.clone(),
                client_secret: credentials.client_secret.clone(),
                auth_url: AUTH_URL.to_string(),
                token_url: TOKEN_URL.to_string(),
                redirect_uri,
                scopes: vec!["read:user".into(), "user:email".into()],
            },
            api_base: API_BASE.to_string(),
            http,
        }
    }

    /// Serve both the token exchange and the REST API from `base`.
    pub fn with_api_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.config.token_url = format!("{base}/login/oauth/access_token");
        self.api_base = base.to_string();
        self
    }
}

#[async_trait]
impl OAuthClient for GithubProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Github
    }

    fn client_config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<String> {
        exchange_authorization_code(&self.http, self.provider(), &self.config, code, verifier).await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<OAuthIdentity> {
        let user: GithubUser = fetch_json(
            &self.http,
            self.provider(),
            &format!("{}/user", self.api_base),
            access_token,
        )
        .await?;

        let email = match user.email.filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => {
                debug!(github_id = user.id, "Profile email hidden, reading /user/emails");
                let emails: Vec<GithubEmail> = fetch_json(
                    &self.http,
                    self.provider(),
                    &format!("{}/user/emails", self.api_base),
                    access_token,
                )
                .await?;
                primary_verified_email(emails).ok_or_else(|| {
                    IdentityError::OAuthError(
                        "github account has no primary verified email".into(),
                    )
                })?
            }
        };

        Ok(OAuthIdentity {
            email,
            subject: user.id.to_string(),
            avatar_url: user.avatar_url.unwrap_or_default(),
        })
    }
}
