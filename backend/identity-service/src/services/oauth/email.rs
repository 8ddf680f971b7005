use async_trait::async_trait;

use super::OAuthClient;
use crate::error::Result;
use crate::models::{OAuthClientConfig, OAuthIdentity, OAuthProvider};

/// Pass-through provider for accounts whose email is already verified
/// locally. It performs no I/O and yields an empty identity, so callers must
/// already know the user.
#[derive(Debug, Clone, Default)]
pub struct EmailProvider {
    config: OAuthClientConfig,
}

impl EmailProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OAuthClient for EmailProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Email
    }

    fn client_config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn exchange_code(&self, _code: &str, _verifier: &str) -> Result<String> {
        Ok(String::new())
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<OAuthIdentity> {
        Ok(OAuthIdentity::default())
    }
}
