use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::store::StoreError;

/// Terminal auth failures surfaced to the caller. Deliberately coarse:
/// `InvalidCredentials` never says whether the email exists, and
/// `InvalidToken` never says which refresh check failed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("invalid refresh token")]
    InvalidToken,
    #[error("user not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    /// Infrastructure failure in the store, distinct from the auth taxonomy.
    #[error(transparent)]
    Store(StoreError),
    /// Hashing or signing failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Store(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Details of infrastructure failures stay in the logs.
        let message = match &self {
            AuthError::Store(e) => {
                error!(error = %e, "store failure");
                "internal error".to_string()
            }
            AuthError::Internal(e) => {
                error!(error = %e, "internal failure");
                "internal error".to_string()
            }
            other => {
                warn!(error = %other, "auth rejection");
                other.to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AuthError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::DuplicateEmail.status(), StatusCode::CONFLICT);
        assert_eq!(AuthError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
