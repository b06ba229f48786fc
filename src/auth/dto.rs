use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::models::User;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Public part of a newly registered user. Only the stable public id and
/// email leave the server.
#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub uuid: Uuid,
    pub email: String,
}

impl From<User> for RegisteredUser {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid,
            email: user.email,
        }
    }
}

/// Response after logout.
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: &'static str,
}
