//! Routes module - HTTP API endpoints
//!
//! Every handler expects an [`AuthenticatedUserId`] extension inserted by the
//! server's auth middleware.

pub mod calendar;
pub mod documents;
pub mod files;
pub mod folders;
pub mod messages;
pub mod notifications;
pub mod roles;
pub mod teams;
pub mod users;

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::CoreConfig;

pub use crate::AuthenticatedUserId;

/// Shared state for all resource routes
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<SqlitePool>,
    pub config: CoreConfig,
}

impl AppState {
    pub fn new(pool: Arc<SqlitePool>, config: CoreConfig) -> Self {
        Self { pool, config }
    }
}

/// All resource routes, unprefixed; the server nests them under `/api`
pub fn configure_routes(pool: Arc<SqlitePool>, config: CoreConfig) -> Router {
    let state = AppState::new(pool, config);

    Router::new()
        .merge(users::routes(state.clone()))
        .merge(roles::routes(state.clone()))
        .merge(teams::routes(state.clone()))
        .merge(documents::routes(state.clone()))
        .merge(files::routes(state.clone()))
        .merge(folders::routes(state.clone()))
        .merge(calendar::routes(state.clone()))
        .merge(notifications::routes(state.clone()))
        .merge(messages::routes(state))
}
