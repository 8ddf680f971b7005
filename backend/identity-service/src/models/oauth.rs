use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// OAuth provider enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Github,
    Microsoft,
    Facebook,
    /// Pass-through for already verified local accounts
    Email,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 5] = [
        OAuthProvider::Google,
        OAuthProvider::Github,
        OAuthProvider::Microsoft,
        OAuthProvider::Facebook,
        OAuthProvider::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
            OAuthProvider::Microsoft => "microsoft",
            OAuthProvider::Facebook => "facebook",
            OAuthProvider::Email => "email",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            "microsoft" => Ok(OAuthProvider::Microsoft),
            "facebook" => Ok(OAuthProvider::Facebook),
            "email" => Ok(OAuthProvider::Email),
            _ => Err(IdentityError::UnknownProvider(s.to_string())),
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client registration and endpoints for one provider
#[derive(Debug, Clone, Default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Identity returned by a provider after a successful code exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthIdentity {
    pub email: String,
    /// Provider-scoped user id
    pub subject: String,
    pub avatar_url: String,
}

impl OAuthIdentity {
    pub fn is_empty(&self) -> bool {
        self.subject.is_empty() || self.email.is_empty()
    }
}
