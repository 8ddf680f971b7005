/// Pending login / refresh token database operations
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::PendingAuthStore;
use crate::error::{IdentityError, Result};
use crate::models::{PendingAuth, PendingLogin, RefreshToken};

#[derive(Debug, FromRow)]
struct PendingAuthRow {
    id: String,
    kind: String,
    provider: Option<String>,
    verifier: Option<String>,
    return_url: Option<String>,
    user_id: Option<Uuid>,
    expires: DateTime<Utc>,
    rotated_from: Option<String>,
    rotated_at: Option<DateTime<Utc>>,
}

impl TryFrom<PendingAuthRow> for PendingAuth {
    type Error = IdentityError;

    fn try_from(row: PendingAuthRow) -> Result<Self> {
        match row.kind.as_str() {
            "login" => {
                let provider = row
                    .provider
                    .ok_or_else(|| IdentityError::Database("login row without provider".into()))?
                    .parse()?;
                Ok(PendingAuth::Login(PendingLogin {
                    state: row.id,
                    provider,
                    verifier: row.verifier.unwrap_or_default(),
                    return_url: row.return_url.unwrap_or_default(),
                    expires: row.expires,
                }))
            }
            "refresh" => Ok(PendingAuth::Refresh(RefreshToken {
                id: row.id,
                user_id: row.user_id,
                expires: row.expires,
                rotated_from: row.rotated_from,
                rotated_at: row.rotated_at,
            })),
            other => Err(IdentityError::Database(format!(
                "unknown pending_auth kind: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgPendingAuthStore {
    pool: PgPool,
}

impl PgPendingAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PendingAuthStore for PgPendingAuthStore {
    async fn insert(&self, record: &PendingAuth) -> Result<()> {
        let query = sqlx::query(
            r#"
            INSERT INTO pending_auth (id, kind, provider, verifier, return_url, user_id, expires, rotated_from, rotated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id())
        .bind(record.kind());

        let query = match record {
            PendingAuth::Login(login) => query
                .bind(Some(login.provider.as_str()))
                .bind(Some(login.verifier.as_str()))
                .bind(Some(login.return_url.as_str()))
                .bind(None::<Uuid>)
                .bind(login.expires)
                .bind(None::<String>)
                .bind(None::<DateTime<Utc>>),
            PendingAuth::Refresh(token) => query
                .bind(None::<&str>)
                .bind(None::<&str>)
                .bind(None::<&str>)
                .bind(token.user_id)
                .bind(token.expires)
                .bind(token.rotated_from.clone())
                .bind(token.rotated_at),
        };

        query
            .execute(&self.pool)
            .await
            .map_err(|e| IdentityError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<PendingAuth>> {
        let row = sqlx::query_as::<_, PendingAuthRow>(
            r#"
            SELECT id, kind, provider, verifier, return_url, user_id, expires, rotated_from, rotated_at
            FROM pending_auth
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IdentityError::Database(e.to_string()))?;

        row.map(PendingAuth::try_from).transpose()
    }

    async fn consume_login(&self, state: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pending_auth
            SET expires = $2
            WHERE id = $1 AND kind = 'login' AND expires > $2
            "#,
        )
        .bind(state)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| IdentityError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn rotate_refresh(
        &self,
        id: &str,
        now: DateTime<Utc>,
        grace_until: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pending_auth
            SET rotated_at = $2, expires = LEAST(expires, $3)
            WHERE id = $1
              AND kind = 'refresh'
              AND user_id IS NOT NULL
              AND rotated_at IS NULL
              AND expires >= $2
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(grace_until)
        .execute(&self.pool)
        .await
        .map_err(|e| IdentityError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_refresh(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pending_auth
            SET user_id = NULL
            WHERE id = $1 AND kind = 'refresh'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| IdentityError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}
