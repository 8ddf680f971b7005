use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::User;

/// Effective entitlements computed at issuance time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlements {
    pub subscription_active: bool,
    /// Base bits plus at most one plan bit
    pub access: i64,
}

/// User view embedded in token responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub avatar: String,
    pub access: i64,
    pub subscription_active: bool,
}

impl AuthUser {
    pub fn new(user: &User, entitlements: Entitlements) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            access: entitlements.access,
            subscription_active: entitlements.subscription_active,
        }
    }
}

/// Access/refresh pair plus the user it was issued for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: AuthUser,
    pub entitlements: Entitlements,
    /// `false` when an existing access token was returned unchanged
    pub fresh: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub url: String,
}

/// Result of an OAuth callback. Tokens are absent while a second factor is pending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub return_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    pub has_phone: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
    pub fresh: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneResponse {
    pub session_token: String,
}
