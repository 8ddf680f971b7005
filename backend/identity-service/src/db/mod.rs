//! Database operations for identity service
//!
//! Flows depend on the store traits below. The `Pg*` types back them with
//! PostgreSQL; `memory::InMemoryStore` backs all three in process.

pub mod memory;
pub mod pending_auth;
pub mod subscriptions;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::DatabaseSettings;
use crate::error::Result;
use crate::models::{NewUser, PendingAuth, Subscription, User};

pub use memory::InMemoryStore;
pub use pending_auth::PgPendingAuthStore;
pub use subscriptions::PgSubscriptionStore;
pub use users::PgUserStore;

/// Login attempts and refresh token rows.
///
/// Every state transition is a single conditional update so concurrent
/// callers cannot both observe success.
#[async_trait]
pub trait PendingAuthStore: Send + Sync {
    async fn insert(&self, record: &PendingAuth) -> Result<()>;

    async fn find(&self, id: &str) -> Result<Option<PendingAuth>>;

    /// Collapse a live login attempt's expiry to `now`.
    /// Returns `false` when the attempt was already consumed or expired.
    async fn consume_login(&self, state: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Issued -> Rotated: stamp `rotated_at` and shorten expiry to `grace_until`.
    /// Returns `false` when the row was not Issued at `now`.
    async fn rotate_refresh(
        &self,
        id: &str,
        now: DateTime<Utc>,
        grace_until: DateTime<Utc>,
    ) -> Result<bool>;

    /// Clear the owner of a refresh row. Returns `false` when no row matched.
    async fn revoke_refresh(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_identity(&self, email: &str, sub: &str) -> Result<Option<User>>;

    async fn create(&self, new_user: NewUser) -> Result<User>;

    async fn set_phone(&self, id: Uuid, phone: &str) -> Result<()>;

    async fn touch_last_active(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Most recent subscription in an active status, if any.
    async fn find_active(&self, user_id: Uuid) -> Result<Option<Subscription>>;
}

/// Open the PostgreSQL pool described by `settings`.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout))
        .connect(&settings.url)
        .await?;

    Ok(pool)
}

/// Apply the bundled schema migrations.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
