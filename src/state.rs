use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    auth::{engine::AuthEngine, jwt::JwtKeys, store::PgCredentialStore},
    config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub engine: Arc<AuthEngine>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        Ok(Self::from_parts(db, config))
    }

    pub fn from_parts(db: PgPool, config: Arc<AppConfig>) -> Self {
        let store = Arc::new(PgCredentialStore::new(db.clone()));
        let keys = JwtKeys::from_config(&config.jwt);
        let engine = Arc::new(AuthEngine::new(store, keys));
        Self { db, config, engine }
    }
}
