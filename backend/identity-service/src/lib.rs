/// Identity Service Library
///
/// Provides OAuth login, an optional SMS second factor and the access/refresh
/// token lifecycle.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Store traits with PostgreSQL and in-memory backends
/// - `error`: Error types
/// - `models`: Data models
/// - `security`: PKCE and JWT issuance
/// - `services`: Business logic (oauth, access policy, 2FA, login orchestration)
/// - `telemetry`: Logging setup
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod security;
pub mod services;
pub mod telemetry;

// Re-export commonly used types
pub use error::{ErrorKind, IdentityError, Result};
pub use services::LoginOrchestrator;
