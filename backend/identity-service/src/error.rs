use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

/// Coarse classification callers branch on instead of matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    BadRequest,
    Internal,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("User not found")]
    UserNotFound,

    #[error("Login attempt not found")]
    LoginNotFound,

    #[error("Refresh token not found")]
    RefreshTokenNotFound,

    #[error("Login attempt expired")]
    LoginExpired,

    #[error("Failed to start login: {0}")]
    LoginStartFailed(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Refresh token already rotated")]
    TokenAlreadyRotated,

    #[error("Invalid code")]
    InvalidTwoFACode,

    #[error("Two FA not enabled")]
    TwoFANotEnabled,

    #[error("Unknown OAuth provider: {0}")]
    UnknownProvider(String),

    #[error("OAuth provider error: {0}")]
    OAuthError(String),

    #[error("Verification provider error: {0}")]
    Verification(String),

    #[error("Random generation failed: {0}")]
    Random(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::UserNotFound
            | IdentityError::LoginNotFound
            | IdentityError::RefreshTokenNotFound => ErrorKind::NotFound,

            IdentityError::LoginExpired
            | IdentityError::LoginStartFailed(_)
            | IdentityError::InvalidToken
            | IdentityError::TokenExpired
            | IdentityError::TokenRevoked
            | IdentityError::TokenAlreadyRotated
            | IdentityError::InvalidTwoFACode
            | IdentityError::OAuthError(_)
            | IdentityError::Verification(_)
            | IdentityError::Random(_) => ErrorKind::Unauthorized,

            IdentityError::UnknownProvider(_)
            | IdentityError::Validation(_)
            | IdentityError::TwoFANotEnabled => ErrorKind::BadRequest,

            IdentityError::Database(_)
            | IdentityError::JwtError(_)
            | IdentityError::Timeout(_)
            | IdentityError::Internal(_) => ErrorKind::Internal,
        }
    }
}

// Conversions from external error types
impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        IdentityError::Database(err.to_string())
    }
}

impl From<crypto_core::jwt::JwtError> for IdentityError {
    fn from(err: crypto_core::jwt::JwtError) -> Self {
        use crypto_core::jwt::JwtError;

        match err {
            JwtError::Expired => IdentityError::TokenExpired,
            JwtError::Invalid(_) => IdentityError::InvalidToken,
            JwtError::Signing(msg) | JwtError::Key(msg) => {
                tracing::error!("JWT error: {}", msg);
                IdentityError::JwtError(msg)
            }
        }
    }
}

impl From<crypto_core::CryptoError> for IdentityError {
    fn from(err: crypto_core::CryptoError) -> Self {
        tracing::error!("Crypto error: {}", err);
        IdentityError::Random(err.to_string())
    }
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        IdentityError::OAuthError(err.to_string())
    }
}
