//! Configuration management for Identity Service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! Each component receives only its own section; nothing downstream reads the
//! environment.
//!
//! # Example
//!
//! ```no_run
//! use identity_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("JWT issuer: {}", settings.jwt.issuer);
//!     Ok(())
//! }
//! ```

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crypto_core::jwt::JwtKeys;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub oauth: OAuthSettings,
    pub twilio: TwilioSettings,
    pub flow: FlowSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Load .env file in development
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            oauth: OAuthSettings::from_env()?,
            twilio: TwilioSettings::from_env(),
            flow: FlowSettings::from_env()?,
        })
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            acquire_timeout: env::var("DATABASE_ACQUIRE_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_ACQUIRE_TIMEOUT")?,
        })
    }
}

/// Upper bound for any token lifetime (ten years)
pub const MAX_TOKEN_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// JWT signing settings and token lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub signing_key: String,
    pub validation_key: Option<String>,
    pub algorithm: String,
    pub issuer: String,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    pub session_ttl_seconds: u64,
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        // PEM keys take precedence over the shared secret
        let (signing_key, validation_key, algorithm) = match env::var("JWT_PRIVATE_KEY") {
            Ok(private_pem) => (
                private_pem,
                env::var("JWT_PUBLIC_KEY").ok(),
                "RS256".to_string(),
            ),
            Err(_) => (
                env::var("JWT_SECRET")
                    .context("JWT_SECRET must be set when no PEM keys are configured")?,
                None,
                env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            ),
        };

        Ok(Self {
            signing_key,
            validation_key,
            algorithm,
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "identity-service".to_string()),
            access_ttl_seconds: ttl_from_env("ACCESS_TOKEN_TTL_SECONDS", 900)?,
            refresh_ttl_seconds: ttl_from_env("REFRESH_TOKEN_TTL_SECONDS", 2_592_000)?,
            session_ttl_seconds: ttl_from_env("SESSION_TOKEN_TTL_SECONDS", 600)?,
        })
    }

    /// Every lifetime must lie in `1..=MAX_TOKEN_TTL_SECONDS`.
    pub fn validate_ttls(&self) -> Result<()> {
        check_ttl("ACCESS_TOKEN_TTL_SECONDS", self.access_ttl_seconds)?;
        check_ttl("REFRESH_TOKEN_TTL_SECONDS", self.refresh_ttl_seconds)?;
        check_ttl("SESSION_TOKEN_TTL_SECONDS", self.session_ttl_seconds)?;
        Ok(())
    }

    /// Build the signing keys described by these settings.
    pub fn keys(&self) -> Result<JwtKeys> {
        let keys = match self.algorithm.as_str() {
            "HS256" => JwtKeys::from_secret(self.signing_key.as_bytes())
                .context("Invalid JWT_SECRET")?,
            "RS256" => {
                let public_pem = self
                    .validation_key
                    .as_deref()
                    .context("JWT_PUBLIC_KEY must be set for RS256")?;
                JwtKeys::from_rsa_pem(&self.signing_key, public_pem)
                    .context("Invalid JWT PEM keys")?
            }
            other => bail!("Unsupported JWT_ALGORITHM: {other}"),
        };

        Ok(keys.with_issuer(self.issuer.clone()))
    }
}

fn ttl_from_env(name: &str, default: u64) -> Result<u64> {
    let seconds = match env::var(name) {
        Ok(value) => value.parse().with_context(|| format!("Invalid {name}"))?,
        Err(_) => default,
    };
    check_ttl(name, seconds)?;
    Ok(seconds)
}

fn check_ttl(name: &str, seconds: u64) -> Result<()> {
    if seconds == 0 || seconds > MAX_TOKEN_TTL_SECONDS {
        bail!("Invalid {name}: {seconds} is outside 1..={MAX_TOKEN_TTL_SECONDS} seconds");
    }
    Ok(())
}

/// Client credentials for one OAuth provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthClientCredentials {
    fn from_env(prefix: &str) -> Option<Self> {
        let client_id = env::var(format!("OAUTH_{prefix}_CLIENT_ID")).ok()?;
        let client_secret = env::var(format!("OAUTH_{prefix}_CLIENT_SECRET")).ok()?;
        if client_id.is_empty() {
            return None;
        }
        Some(Self {
            client_id,
            client_secret,
        })
    }
}

/// OAuth provider settings. A provider without credentials is not registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    /// Public base the providers redirect back to; `/auth/callback` is appended
    pub redirect_base: String,
    pub google: Option<OAuthClientCredentials>,
    pub github: Option<OAuthClientCredentials>,
    pub microsoft: Option<OAuthClientCredentials>,
    pub microsoft_tenant: String,
    pub facebook: Option<OAuthClientCredentials>,
}

impl OAuthSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            redirect_base: env::var("OAUTH_REDIRECT_BASE")
                .context("OAUTH_REDIRECT_BASE must be set")?,
            google: OAuthClientCredentials::from_env("GOOGLE"),
            github: OAuthClientCredentials::from_env("GITHUB"),
            microsoft: OAuthClientCredentials::from_env("MICROSOFT"),
            microsoft_tenant: env::var("OAUTH_MICROSOFT_TENANT")
                .unwrap_or_else(|_| "common".to_string()),
            facebook: OAuthClientCredentials::from_env("FACEBOOK"),
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.redirect_base.trim_end_matches('/'))
    }
}

/// Twilio Verify settings. An empty service id disables the second factor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub service_id: String,
}

impl TwilioSettings {
    fn from_env() -> Self {
        Self {
            account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            service_id: env::var("TWILIO_VERIFY_SERVICE_ID").unwrap_or_default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.service_id.is_empty()
    }
}

/// Login/refresh flow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Public base URL of this deployment, e.g. `https://pr-42.app.example.com`
    pub base_url: String,
    pub context_timeout_seconds: u64,
    pub rotation_grace_seconds: u64,
    /// Base access bits granted to newly created users
    pub default_access: i64,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            context_timeout_seconds: 10,
            rotation_grace_seconds: 60,
            default_access: 1,
        }
    }
}

impl FlowSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            context_timeout_seconds: env::var("CONTEXT_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid CONTEXT_TIMEOUT_SECONDS")?,
            rotation_grace_seconds: env::var("REFRESH_ROTATION_GRACE_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid REFRESH_ROTATION_GRACE_SECONDS")?,
            default_access: env::var("DEFAULT_USER_ACCESS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("Invalid DEFAULT_USER_ACCESS")?,
        })
    }

    pub fn context_timeout(&self) -> Duration {
        Duration::from_secs(self.context_timeout_seconds)
    }

    pub fn rotation_grace(&self) -> Duration {
        Duration::from_secs(self.rotation_grace_seconds)
    }
}
