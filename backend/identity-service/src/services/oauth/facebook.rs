use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{exchange_authorization_code, fetch_json, OAuthClient};
use crate::config::OAuthClientCredentials;
use crate::error::{IdentityError, Result};
use crate::models::{OAuthClientConfig, OAuthIdentity, OAuthProvider};

const AUTH_URL: &str = "https://www.facebook.com/v19.0/dialog/oauth";
const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Deserialize)]
struct FacebookUser {
    id: String,
    email: Option<String>,
    picture: Option<FacebookPicture>,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: String,
}

impl TryFrom<FacebookUser> for OAuthIdentity {
    type Error = IdentityError;

    fn try_from(user: FacebookUser) -> Result<Self> {
        let email = user
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| IdentityError::OAuthError("facebook account has no email".into()))?;

        Ok(OAuthIdentity {
            email,
            subject: user.id,
            avatar_url: user.picture.map(|p| p.data.url).unwrap_or_default(),
        })
    }
}

#[derive(Clone)]
pub struct FacebookProvider {
    config: OAuthClientConfig,
    graph_base: String,
    http: Client,
}

impl FacebookProvider {
    pub fn new(credentials: &OAuthClientCredentials, redirect_uri: String, http: Client) -> Self {
        Self {
            config: OAuthClientConfig {
                client_id: credentials.client_id.clone(),
                client_secret: credentials.client_secret.clone(),
                auth_url: AUTH_URL.to_string(),
                token_url: format!("{GRAPH_BASE}/oauth/access_token"),
                redirect_uri,
                scopes: vec!["email".into(), "public_profile".into()],
            },
            graph_base: GRAPH_BASE.to_string(),
            http,
        }
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.config.token_url = format!("{base}/oauth/access_token");
        self.graph_base = base.to_string();
        self
    }
}

#[async_trait]
impl OAuthClient for FacebookProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Facebook
    }

    fn client_config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<String> {
        exchange_authorization_code(&self.http, self.provider(), &self.config, code, verifier).await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<OAuthIdentity> {
        let user: FacebookUser = fetch_json(
            &self.http,
            self.provider(),
            &format!("{}/me?fields=id,email,picture", self.graph_base),
            access_token,
        )
        .await?;
        user.try_into()
    }
}
