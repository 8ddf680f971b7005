//! Ephemeral authentication records.
//!
//! Login attempts and refresh tokens share one store and one key space, but
//! are distinct variants so a revoked refresh row can never be read as a
//! login attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::oauth::OAuthProvider;

/// An OAuth login in flight, keyed by its `state` value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub state: String,
    pub provider: OAuthProvider,
    /// PKCE code verifier
    pub verifier: String,
    pub return_url: String,
    pub expires: DateTime<Utc>,
}

impl PendingLogin {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }
}

/// A server-side refresh token row; the signed refresh JWT carries its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: String,
    /// `None` once revoked
    pub user_id: Option<Uuid>,
    pub expires: DateTime<Utc>,
    pub rotated_from: Option<String>,
    pub rotated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    Issued,
    /// Exchanged once; lingers until the grace window closes
    Rotated,
    Expired,
    Revoked,
}

impl RefreshToken {
    pub fn issue(
        id: String,
        user_id: Uuid,
        expires: DateTime<Utc>,
        rotated_from: Option<String>,
    ) -> Self {
        Self {
            id,
            user_id: Some(user_id),
            expires,
            rotated_from,
            rotated_at: None,
        }
    }

    /// Revoked is checked first, then expiry, then rotation.
    pub fn status(&self, now: DateTime<Utc>) -> RefreshStatus {
        if self.user_id.is_none() {
            RefreshStatus::Revoked
        } else if now > self.expires {
            RefreshStatus::Expired
        } else if self.rotated_at.is_some() {
            RefreshStatus::Rotated
        } else {
            RefreshStatus::Issued
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingAuth {
    Login(PendingLogin),
    Refresh(RefreshToken),
}

impl PendingAuth {
    pub fn id(&self) -> &str {
        match self {
            PendingAuth::Login(login) => &login.state,
            PendingAuth::Refresh(token) => &token.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingAuth::Login(_) => "login",
            PendingAuth::Refresh(_) => "refresh",
        }
    }
}
