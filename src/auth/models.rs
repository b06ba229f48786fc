use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. The numeric `id` is internal; only `uuid`
/// is ever handed to clients.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub uuid: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 digest, never exposed in JSON
    pub name: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Refresh-token record. One row per issued refresh token; rows are flipped
/// to `revoked` on rotation, logout or replay detection and never deleted.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: i64,
    /// Embedded in the signed token as `jti`.
    pub uuid: Uuid,
    pub user_id: i64,
    /// Argon2 digest of the signed token string; empty until issuance
    /// completes its second step.
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
    pub revoked: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
