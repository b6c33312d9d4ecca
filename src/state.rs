use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::{
    jwt::TokenService,
    repo::{MemoryUserStore, PgUserStore, UserStore},
    services::AuthService,
};
use crate::config::{AppConfig, ConfigError};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub tokens: TokenService,
    pub auth: AuthService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                Arc::new(PgUserStore::new(db))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory only");
                Arc::new(MemoryUserStore::new())
            }
        };

        let state = Self::from_parts(config, users)?;
        let count = state.users.count().await?;
        tracing::info!(users = count, "user store ready");
        Ok(state)
    }

    /// Builds the token service from `config`, failing on a missing or malformed secret.
    pub fn from_parts(config: Arc<AppConfig>, users: Arc<dyn UserStore>) -> Result<Self, ConfigError> {
        let tokens = TokenService::from_config(&config.jwt)?;
        let auth = AuthService::new(users.clone(), tokens.clone());
        Ok(Self {
            config,
            users,
            tokens,
            auth,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            host: "127.0.0.1".into(),
            port: 0,
            jwt: crate::config::JwtConfig {
                secret: crate::auth::jwt::tests::TEST_SECRET.into(),
                ttl_minutes: 60,
            },
        });
        Self::from_parts(config, Arc::new(MemoryUserStore::new())).expect("fake state")
    }
}
