use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::models::{RefreshToken, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate email")]
    Conflict,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persistence contract for user and refresh-token records. The engine
/// depends on this trait only; `PgCredentialStore` is the production
/// implementation.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        name: Option<&str>,
    ) -> Result<User, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn create_refresh_token(
        &self,
        user_id: i64,
        expires_at: OffsetDateTime,
    ) -> Result<RefreshToken, StoreError>;

    /// Look up a refresh-token row by its `jti`, joined with its owning
    /// user. A row whose owner is gone counts as absent.
    async fn find_refresh_token_by_uuid(
        &self,
        jti: Uuid,
    ) -> Result<Option<(RefreshToken, User)>, StoreError>;

    async fn update_refresh_token_hash(&self, id: i64, hash: &str) -> Result<(), StoreError>;

    async fn revoke_refresh_token(&self, id: i64) -> Result<(), StoreError>;

    /// Revokes every refresh token of the user in one atomic statement.
    /// Returns the number of rows touched; zero is a valid outcome.
    async fn revoke_all_refresh_tokens_for_user(&self, user_id: i64) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_create_user_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::Conflict;
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        name: Option<&str>,
    ) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, name)
            VALUES ($1, $2, $3)
            RETURNING id, uuid, email, password_hash, name, is_active, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .fetch_one(&self.db)
        .await
        .map_err(map_create_user_err)?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, uuid, email, password_hash, name, is_active, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, uuid, email, password_hash, name, is_active, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_refresh_token(
        &self,
        user_id: i64,
        expires_at: OffsetDateTime,
    ) -> Result<RefreshToken, StoreError> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, expires_at)
            VALUES ($1, $2)
            RETURNING id, uuid, user_id, token_hash, expires_at, revoked, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_refresh_token_by_uuid(
        &self,
        jti: Uuid,
    ) -> Result<Option<(RefreshToken, User)>, StoreError> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, uuid, user_id, token_hash, expires_at, revoked, created_at, updated_at
            FROM refresh_tokens
            WHERE uuid = $1
            "#,
        )
        .bind(jti)
        .fetch_optional(&self.db)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let Some(user) = self.find_user_by_id(row.user_id).await? else {
            return Ok(None);
        };
        Ok(Some((row, user)))
    }

    async fn update_refresh_token_hash(&self, id: i64, hash: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET token_hash = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hash)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn revoke_refresh_token(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn revoke_all_refresh_tokens_for_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }
}
