/// Data models for identity and authentication
pub mod auth;
pub mod oauth;
pub mod pending_auth;
pub mod subscription;
pub mod user;

pub use auth::{AuthTokens, AuthUser, CallbackResponse, Entitlements, LoginResponse, PhoneResponse};
pub use oauth::{OAuthClientConfig, OAuthIdentity, OAuthProvider};
pub use pending_auth::{PendingAuth, PendingLogin, RefreshStatus, RefreshToken};
pub use subscription::Subscription;
pub use user::{NewUser, User};
