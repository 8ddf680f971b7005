//! Access, refresh and session token issuance.
//!
//! All three are JWTs signed with the same keys and told apart by
//! `token_type`; validating one kind never accepts another.

use chrono::{DateTime, Duration, Utc};
use crypto_core::jwt::JwtKeys;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::config::{JwtSettings, MAX_TOKEN_TTL_SECONDS};
use crate::error::{IdentityError, Result};
use crate::models::{AuthUser, Entitlements, RefreshToken, User};

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";
pub const TOKEN_TYPE_SESSION: &str = "session";

/// Claims of a short-lived access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub token_type: String,
    /// Base bits plus the active plan bit
    pub access: i64,
    pub avatar: String,
    pub email: String,
    pub subscribed: bool,
}

impl AccessClaims {
    pub fn user(&self) -> AuthUser {
        AuthUser {
            id: self.sub,
            email: self.email.clone(),
            avatar: self.avatar.clone(),
            access: self.access,
            subscription_active: self.subscribed,
        }
    }
}

/// Claims of a refresh token; `jti` is the server-side row id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub jti: String,
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub token_type: String,
}

/// Claims of a second-factor session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    /// Empty when the user still has to enrol a phone
    pub phone: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub token_type: String,
}

#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: JwtKeys,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    session_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(keys: JwtKeys, settings: &JwtSettings) -> Self {
        Self {
            keys: keys.with_issuer(settings.issuer.clone()),
            issuer: settings.issuer.clone(),
            access_ttl: ttl(settings.access_ttl_seconds),
            refresh_ttl: ttl(settings.refresh_ttl_seconds),
            session_ttl: ttl(settings.session_ttl_seconds),
        }
    }

    pub fn from_settings(settings: &JwtSettings) -> anyhow::Result<Self> {
        settings.validate_ttls()?;
        Ok(Self::new(settings.keys()?, settings))
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    // ========================================================================
    // Issuance
    // ========================================================================

    pub fn issue_access(
        &self,
        user: &User,
        entitlements: Entitlements,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let claims = AccessClaims {
            sub: user.id,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            access: entitlements.access,
            avatar: user.avatar.clone(),
            email: user.email.clone(),
            subscribed: entitlements.subscription_active,
        };

        Ok(self.keys.sign(&claims)?)
    }

    /// Sign a refresh token for `row`; the token expires with the row.
    pub fn issue_refresh(&self, row: &RefreshToken, now: DateTime<Utc>) -> Result<String> {
        let user_id = row
            .user_id
            .ok_or_else(|| IdentityError::Internal("refresh row has no owner".to_string()))?;

        let claims = RefreshClaims {
            jti: row.id.clone(),
            sub: user_id,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: row.expires.timestamp(),
            token_type: TOKEN_TYPE_REFRESH.to_string(),
        };

        Ok(self.keys.sign(&claims)?)
    }

    pub fn issue_session(&self, user_id: Uuid, phone: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = SessionClaims {
            sub: user_id,
            phone: phone.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.session_ttl).timestamp(),
            token_type: TOKEN_TYPE_SESSION.to_string(),
        };

        Ok(self.keys.sign(&claims)?)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    pub fn validate_access(&self, token: &str) -> Result<AccessClaims> {
        let claims: AccessClaims = self.keys.verify(token)?;
        expect_type(&claims.token_type, TOKEN_TYPE_ACCESS)?;
        Ok(claims)
    }

    pub fn validate_refresh(&self, token: &str) -> Result<RefreshClaims> {
        let claims: RefreshClaims = self.keys.verify(token)?;
        expect_type(&claims.token_type, TOKEN_TYPE_REFRESH)?;
        Ok(claims)
    }

    /// Signature and type checks only; used to revoke a token that may have expired.
    pub fn validate_refresh_allow_expired(&self, token: &str) -> Result<RefreshClaims> {
        let claims: RefreshClaims = self.keys.verify_allow_expired(token)?;
        expect_type(&claims.token_type, TOKEN_TYPE_REFRESH)?;
        Ok(claims)
    }

    pub fn validate_session(&self, token: &str) -> Result<SessionClaims> {
        let claims: SessionClaims = self.keys.verify(token)?;
        expect_type(&claims.token_type, TOKEN_TYPE_SESSION)?;
        Ok(claims)
    }
}

/// Lifetimes past `MAX_TOKEN_TTL_SECONDS` are clamped to it.
fn ttl(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_TOKEN_TTL_SECONDS) as i64)
}

fn expect_type(actual: &str, expected: &str) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        warn!(expected, actual, "Rejected token of the wrong type");
        Err(IdentityError::InvalidToken)
    }
}
