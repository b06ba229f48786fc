use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{auth::models::User, config::JwtConfig, state::AppState};

/// Verification failure of a signed token. Callers collapse both variants
/// into a single outward error; the split exists for logging.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token signature")]
    InvalidSignature,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::InvalidSignature,
        }
    }
}

/// Claims carried by an access token: the user's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: i64,
    pub uuid: Uuid,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

/// Claims carried by a refresh token: owner plus the `jti` linking the
/// token to its store row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: i64,
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
}

/// Signing and verification keys for both token kinds. Access and refresh
/// tokens use distinct secrets so neither can forge the other.
#[derive(Clone)]
pub struct JwtKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.jwt)
    }
}

fn validation() -> Validation {
    let mut v = Validation::default();
    v.leeway = 0;
    v
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(cfg.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(cfg.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            access_ttl: Duration::minutes(cfg.access_ttl_minutes),
            refresh_ttl: Duration::days(cfg.refresh_ttl_days),
        }
    }

    pub fn sign_access(&self, user: &User) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = AccessClaims {
            sub: user.id,
            uuid: user.uuid,
            email: user.email.clone(),
            iat: now.unix_timestamp() as usize,
            exp: (now + self.access_ttl).unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.access_encoding)?;
        debug!(user_id = user.id, "access token signed");
        Ok(token)
    }

    pub fn sign_refresh(&self, user_id: i64, jti: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = RefreshClaims {
            sub: user_id,
            jti,
            iat: now.unix_timestamp() as usize,
            exp: (now + self.refresh_ttl).unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.refresh_encoding)?;
        debug!(user_id, %jti, "refresh token signed");
        Ok(token)
    }

    /// All-or-nothing: a payload is only returned once signature and expiry
    /// both check out.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let data = decode::<AccessClaims>(token, &self.access_decoding, &validation())?;
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let data = decode::<RefreshClaims>(token, &self.refresh_decoding, &validation())?;
        Ok(data.claims)
    }
}
