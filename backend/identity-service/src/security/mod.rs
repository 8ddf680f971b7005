/// Security primitives for identity-service
///
/// - **tokens**: access / refresh / session JWT issuance and validation
/// - **pkce**: RFC 7636 verifier and S256 challenge helpers
///
/// Key material comes from `crypto_core::jwt::JwtKeys`; nothing here reads
/// configuration on its own.
pub mod pkce;
pub mod tokens;

pub use tokens::{AccessClaims, RefreshClaims, SessionClaims, TokenIssuer};
