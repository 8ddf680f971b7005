use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{exchange_authorization_code, fetch_json, OAuthClient};
use crate::config::OAuthClientCredentials;
use crate::error::{IdentityError, Result};
use crate::models::{OAuthClientConfig, OAuthIdentity, OAuthProvider};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    picture: Option<String>,
}

impl TryFrom<GoogleUserInfo> for OAuthIdentity {
    type Error = IdentityError;

    fn try_from(info: GoogleUserInfo) -> Result<Self> {
        let email = info
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| IdentityError::OAuthError("google account has no email".into()))?;
        if !info.email_verified {
            return Err(IdentityError::OAuthError(
                "google email is not verified".into(),
            ));
        }

        Ok(OAuthIdentity {
            email,
            subject: info.sub,
            avatar_url: info.picture.unwrap_or_default(),
        })
    }
}

#[derive(Clone)]
pub struct GoogleProvider {
    config: OAuthClientConfig,
    userinfo_url: String,
    http: Client,
}

impl GoogleProvider {
    pub fn new(credentials: &OAuthClientCredentials, redirect_uri: String, http: Client) -> Self {
        Self {
            config: OAuthClientConfig {
                client_id: credentials.client_id.clone(),
                client_secret: credentials.client_secret.clone(),
                auth_url: AUTH_URL.to_string(),
                token_url: TOKEN_URL.to_string(),
                redirect_uri,
                scopes: vec!["openid".into(), "email".into(), "profile".into()],
            },
            userinfo_url: USERINFO_URL.to_string(),
            http,
        }
    }

    /// Point the token and userinfo calls at another host (`{base}/token`, `{base}/userinfo`).
    pub fn with_api_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.config.token_url = format!("{base}/token");
        self.userinfo_url = format!("{base}/userinfo");
        self
    }
}

#[async_trait]
impl OAuthClient for GoogleProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Google
    }

    fn client_config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<String> {
        exchange_authorization_code(&self.http, self.provider(), &self.config, code, verifier).await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<OAuthIdentity> {
        let info: GoogleUserInfo =
            fetch_json(&self.http, self.provider(), &self.userinfo_url, access_token).await?;
        info.try_into()
    }
}
