use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod models;
pub mod password;
pub mod store;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
