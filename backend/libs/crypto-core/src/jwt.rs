//! JWT signing and validation bound to an explicit key set
//!
//! Services build a `JwtKeys` once at startup from their own settings and hand
//! it to whatever mints or validates tokens. No key material lives in globals.
//!
//! ## Algorithms
//!
//! - **HS256**: shared secret, for single-service deployments
//! - **RS256**: PEM key pair, when other services validate with the public key
//!
//! Validation is pinned to the algorithm the keys were built with, so a token
//! signed under a different algorithm is rejected.
//!
//! ## Usage
//!
//! ```rust
//! use crypto_core::jwt::JwtKeys;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Claims { sub: String, exp: i64 }
//!
//! let keys = JwtKeys::from_secret(b"local-development-secret").unwrap();
//! let token = keys.sign(&Claims { sub: "u1".into(), exp: 4_102_444_800 }).unwrap();
//! let claims: Claims = keys.verify(&token).unwrap();
//! assert_eq!(claims.sub, "u1");
//! ```

use std::fmt;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("invalid key material: {0}")]
    Key(String),
}

pub type Result<T> = std::result::Result<T, JwtError>;

// ============================================================================
// Keys
// ============================================================================

#[derive(Clone)]
pub struct JwtKeys {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: Option<String>,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    /// HS256 keys from a shared secret. An empty secret is refused.
    pub fn from_secret(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(JwtError::Key("JWT secret must not be empty".to_string()));
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: None,
        })
    }

    /// RS256 keys from PEM-encoded private and public keys.
    pub fn from_rsa_pem(private_key_pem: &str, public_key_pem: &str) -> Result<Self> {
        let encoding = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("Failed to parse RSA private key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("Failed to parse RSA public key: {e}")))?;

        Ok(Self {
            algorithm: Algorithm::RS256,
            encoding,
            decoding,
            issuer: None,
        })
    }

    /// Require `iss` to match on validation. Signed claims must carry it.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    // ========================================================================
    // Signing / validation
    // ========================================================================

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        encode(&Header::new(self.algorithm), claims, &self.encoding)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Validate signature, algorithm, issuer and expiry, then decode the claims.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        self.decode_with(token, true)
    }

    /// Same as `verify` but accepts an expired token.
    ///
    /// Only for flows that act on a token's identity after its lifetime, such
    /// as revoking it.
    pub fn verify_allow_expired<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        self.decode_with(token, false)
    }

    fn decode_with<T: DeserializeOwned>(&self, token: &str, validate_exp: bool) -> Result<T> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = validate_exp;
        validation.leeway = 0;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        decode::<T>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e.to_string()),
            })
    }
}

// ============================================================================
// Tests
// ============================================================================
