use crate::auth::jwt::JwtKeys;
use crate::config::AppConfig;
use crate::users::{
    notify::{LogMailer, VerificationMailer},
    repo::{PgUserStore, UserStore},
    tokens::{JwtVerificationTokens, VerificationTokens},
};
use anyhow::Context;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn VerificationTokens>,
    pub mailer: Arc<dyn VerificationMailer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        let users = Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>;
        Ok(Self::from_parts(config, users, Arc::new(LogMailer)))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn VerificationMailer>,
    ) -> Self {
        let tokens = Arc::new(JwtVerificationTokens::new(JwtKeys::from(&config.jwt)))
            as Arc<dyn VerificationTokens>;
        Self {
            config,
            users,
            tokens,
            mailer,
        }
    }

    /// State backed by an in-memory store, for tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(crate::users::memory::MemoryUserStore::new()),
            Arc::new(LogMailer),
        )
    }
}
