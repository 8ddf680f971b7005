//! Random material drawn from the operating system RNG.
//!
//! Every helper is fallible: a failing entropy source is reported instead of
//! silently producing weak output.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{rngs::OsRng, RngCore};

use crate::CryptoError;

pub fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| CryptoError::Random(e.to_string()))?;
    Ok(buf)
}

/// URL-safe base64 (no padding) encoding of `len` random bytes.
///
/// 32 bytes yield a 43 character token, which is also a valid PKCE verifier.
pub fn random_token(len: usize) -> Result<String, CryptoError> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes(len)?))
}

/// Lowercase hex encoding of `len` random bytes.
pub fn random_hex(len: usize) -> Result<String, CryptoError> {
    Ok(hex::encode(random_bytes(len)?))
}
