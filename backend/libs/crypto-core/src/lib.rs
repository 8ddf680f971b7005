//! Cryptographic primitives shared by the backend services.
//!
//! - `jwt`: per-instance signing keys and claim encoding/validation
//! - `random`: OS-backed random tokens
//! - `hash`: SHA-256 helpers

pub mod hash;
pub mod jwt;
pub mod random;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("random generation failed: {0}")]
    Random(String),
}
