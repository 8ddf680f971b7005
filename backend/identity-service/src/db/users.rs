/// User database operations
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::UserStore;
use crate::error::{IdentityError, Result};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str =
    "id, email, sub, avatar, phone, access, api_key, last_active_at, created_at";

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IdentityError::Database(e.to_string()))?;

        Ok(user)
    }

    async fn find_by_identity(&self, email: &str, sub: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND sub = $2");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(sub)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IdentityError::Database(e.to_string()))?;

        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, sub, avatar, phone, access, api_key, created_at)
            VALUES ($1, $2, $3, $4, '', $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_user.email)
            .bind(&new_user.sub)
            .bind(&new_user.avatar)
            .bind(new_user.access)
            .bind(&new_user.api_key)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IdentityError::Database(e.to_string()))?;

        Ok(user)
    }

    async fn set_phone(&self, id: Uuid, phone: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET phone = $2 WHERE id = $1")
            .bind(id)
            .bind(phone)
            .execute(&self.pool)
            .await
            .map_err(|e| IdentityError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::UserNotFound);
        }
        Ok(())
    }

    async fn touch_last_active(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_active_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| IdentityError::Database(e.to_string()))?;

        Ok(())
    }
}
