/// Service layer for identity-service
///
/// Provides business logic and integrations:
/// - OAuth 2.0 login (Google, GitHub, Microsoft, Facebook, Email)
/// - Access policy (base bits plus subscription plan)
/// - Two-factor gate (SMS codes via Twilio Verify)
/// - Login orchestration (login, callback, second factor, refresh rotation)
pub mod access;
pub mod login;
pub mod oauth;
pub mod two_fa;
pub mod verification;

pub use access::AccessPolicy;
pub use login::LoginOrchestrator;
pub use oauth::{OAuthClient, ProviderRegistry};
pub use two_fa::TwoFactorGate;
pub use verification::{TwilioVerifyClient, VerificationProvider, VerificationStatus};
