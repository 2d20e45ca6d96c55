//! Application state

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::auth::jwt::JwtKeys;
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<SqlitePool>,

    /// Server configuration
    pub config: Config,

    /// Token signing keys derived from `config.jwt_secret`
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(pool: Arc<SqlitePool>, config: Config) -> Self {
        let jwt = Arc::new(JwtKeys::from_config(&config));
        Self { pool, config, jwt }
    }
}
