use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LogoutResponse, RefreshRequest, RegisterRequest, RegisteredUser},
        engine::TokenPair,
        error::AuthError,
        extractors::{AuthUser, CurrentUser},
    },
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

fn validate_credentials(email: &str, password: &str) -> Result<(), (StatusCode, String)> {
    if !is_valid_email(email) {
        warn!(email = %email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if password.len() < 8 {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUser>), Response> {
    validate_credentials(&payload.email, &payload.password)
        .map_err(IntoResponse::into_response)?;

    let user = state
        .engine
        .register(&payload.email, &payload.password, payload.name.as_deref())
        .await
        .map_err(AuthError::into_response)?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPair>, Response> {
    validate_credentials(&payload.email, &payload.password)
        .map_err(IntoResponse::into_response)?;

    let pair = state
        .engine
        .login(&payload.email, &payload.password)
        .await
        .map_err(AuthError::into_response)?;

    Ok(Json(pair))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    let pair = state.engine.refresh(&payload.refresh_token).await?;
    Ok(Json(pair))
}

#[instrument(skip(state, user))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<LogoutResponse>, AuthError> {
    state.engine.logout(user.id).await?;
    Ok(Json(LogoutResponse {
        message: "Logged out successfully",
    }))
}

/// Returns the identity decoded from the access token. No store round trip:
/// whatever the verified token says is what the caller gets.
#[instrument(skip(user))]
pub async fn me(AuthUser(user): AuthUser) -> Json<CurrentUser> {
    Json(user)
}
