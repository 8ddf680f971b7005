use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{exchange_authorization_code, fetch_json, OAuthClient};
use crate::config::OAuthClientCredentials;
use crate::error::{IdentityError, Result};
use crate::models::{OAuthClientConfig, OAuthIdentity, OAuthProvider};

const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    mail: Option<String>,
    user_principal_name: Option<String>,
}

impl TryFrom<GraphUser> for OAuthIdentity {
    type Error = IdentityError;

    fn try_from(user: GraphUser) -> Result<Self> {
        // Personal accounts often leave `mail` unset
        let email = user
            .mail
            .filter(|m| !m.is_empty())
            .or(user.user_principal_name.filter(|u| !u.is_empty()))
            .ok_or_else(|| IdentityError::OAuthError("microsoft account has no email".into()))?;

        Ok(OAuthIdentity {
            email,
            subject: user.id,
            avatar_url: String::new(),
        })
    }
}

#[derive(Clone)]
pub struct MicrosoftProvider {
    config: OAuthClientConfig,
    graph_base: String,
    http: Client,
}

impl MicrosoftProvider {
    pub fn new(
        credentials: &OAuthClientCredentials,
        tenant: &str,
        redirect_uri: String,
        http: Client,
    ) -> Self {
        Self {
            config: OAuthClientConfig {
                client_id: credentials.client_id.clone(),
                client_secret: credentials.client_secret.clone(),
                auth_url: format!("{LOGIN_BASE}/{tenant}/oauth2/v2.0/authorize"),
                token_url: format!("{LOGIN_BASE}/{tenant}/oauth2/v2.0/token"),
                redirect_uri,
                scopes: vec![
                    "openid".into(),
                    "email".into(),
                    "profile".into(),
                    "offline_access".into(),
                    "User.Read".into(),
                ],
            },
            graph_base: GRAPH_BASE.to_string(),
            http,
        }
    }

    /// Serve the token exchange (`{base}/token`) and Graph (`{base}/me`) from `base`.
    pub fn with_api_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.config.token_url = format!("{base}/token");
        self.graph_base = base.to_string();
        self
    }
}

#[async_trait]
impl OAuthClient for MicrosoftProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Microsoft
    }

    fn client_config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<String> {
        exchange_authorization_code(&self.http, self.provider(), &self.config, code, verifier).await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<OAuthIdentity> {
        let user: GraphUser = fetch_json(
            &self.http,
            self.provider(),
            &format!("{}/me", self.graph_base),
            access_token,
        )
        .await?;
        user.try_into()
    }
}
