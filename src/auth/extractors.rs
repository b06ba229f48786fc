use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;

/// Identity decoded from a verified access token. Read-only; not re-checked
/// against the store (revocation only affects refresh tokens, so an access
/// token stays good until its short TTL runs out).
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    #[serde(skip_serializing)]
    pub id: i64,
    pub uuid: Uuid,
    pub email: String,
}

/// Extracts and verifies a bearer access token, rejecting the request with
/// 401 before any handler runs.
pub struct AuthUser(pub CurrentUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid Authorization header".to_string(),
        ))?;

        let claims = match keys.verify_access(token) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "access token rejected");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
        };

        Ok(AuthUser(CurrentUser {
            id: claims.sub,
            uuid: claims.uuid,
            email: claims.email,
        }))
    }
}
