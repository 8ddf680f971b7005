/// OAuth PKCE (Proof Key for Code Exchange) helpers
///
/// RFC 7636 compliant PKCE for the authorization-code flow:
/// 1. Generate a code_verifier (43-128 characters of [A-Za-z0-9._~-])
/// 2. code_challenge = BASE64URL(SHA256(code_verifier))
/// 3. Send the challenge with the authorization request (method S256)
/// 4. Send the verifier with the token exchange
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::Engine;
use thiserror::Error;

use crate::error::IdentityError;

/// Random bytes behind a verifier; 32 bytes encode to 43 characters
const VERIFIER_BYTES: usize = 32;

pub const CHALLENGE_METHOD: &str = "S256";

/// PKCE errors
#[derive(Debug, Error)]
pub enum PkceError {
    #[error("Invalid code verifier: {0}")]
    InvalidVerifier(String),
}

impl From<PkceError> for IdentityError {
    fn from(err: PkceError) -> Self {
        IdentityError::OAuthError(err.to_string())
    }
}

/// Validate if a string is a valid PKCE code verifier
///
/// RFC 7636 specifies:
/// - 43-128 characters long
/// - Unreserved characters: [A-Z] [a-z] [0-9] - . _ ~
pub fn is_valid_code_verifier(verifier: &str) -> bool {
    (43..=128).contains(&verifier.len())
        && verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

/// Generate a fresh code verifier from the OS RNG
pub fn generate_code_verifier() -> Result<String, IdentityError> {
    Ok(crypto_core::random::random_token(VERIFIER_BYTES)?)
}

/// Generate the S256 code challenge for a verifier
pub fn generate_code_challenge(code_verifier: &str) -> Result<String, PkceError> {
    if !is_valid_code_verifier(code_verifier) {
        return Err(PkceError::InvalidVerifier(format!(
            "Code verifier must be 43-128 characters, got {}",
            code_verifier.len()
        )));
    }

    Ok(URL_SAFE_NO_PAD.encode(crypto_core::hash::sha256(code_verifier.as_bytes())))
}
