use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            access_secret: std::env::var("JWT_ACCESS_SECRET")?,
            refresh_secret: std::env::var("JWT_REFRESH_SECRET")?,
            access_ttl_minutes: std::env::var("JWT_ACCESS_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(15),
            refresh_ttl_days: std::env::var("JWT_REFRESH_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(7),
        };
        // A leaked access secret must not be able to mint refresh tokens.
        if jwt.access_secret == jwt.refresh_secret {
            anyhow::bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }
        Ok(Self { database_url, jwt })
    }
}
