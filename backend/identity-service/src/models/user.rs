use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User model - core identity entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Composite `<provider>:<provider subject>`
    pub sub: String,
    pub avatar: String,
    /// Empty until the second factor is enrolled
    pub phone: String,
    /// Base entitlement bits, never including plan bits
    pub access: i64,
    pub api_key: String,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_phone(&self) -> bool {
        !self.phone.is_empty()
    }
}

/// Fields required to create a user on first login
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub sub: String,
    pub avatar: String,
    pub access: i64,
    pub api_key: String,
}

/// Composite subject stored on the user: `<provider>:<provider subject>`
pub fn composite_sub(provider: &str, subject: &str) -> String {
    format!("{provider}:{subject}")
}
