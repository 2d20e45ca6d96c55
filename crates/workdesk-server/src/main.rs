//! Workdesk Server - standalone HTTP server for the Workdesk backend
//!
//! Serves the resource API under `/api`, authenticated with bearer JWTs.

mod auth;
mod config;
mod state;

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::middleware::auth_middleware;
use crate::auth::service::AuthService;
use crate::config::Config;
use crate::state::AppState;

/// Command line options; flags override the loaded configuration
#[derive(Debug, Parser)]
#[command(name = "workdesk-server", version, about = "Workdesk productivity backend")]
struct Cli {
    /// TOML configuration file; environment variables are used when absent
    #[arg(short, long, env = "WORKDESK_CONFIG")]
    config: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = match cli.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    init_tracing(config.log_json);
    info!("Starting Workdesk Server on {}:{} ({})", config.host, config.port, config.app_env);

    let pool = workdesk::db::connect(&config.database_url, config.max_connections).await?;

    info!("Running database migrations...");
    workdesk::migrations::run_migration(&pool).await?;
    auth::migrations::run_migration(&pool).await?;
    info!("Database migrations completed");

    let state = AppState::new(Arc::new(pool), config.clone());
    let purged = AuthService::new(&state.pool, &state.jwt).cleanup_expired().await?;
    if purged > 0 {
        info!(purged, "Expired refresh tokens removed");
    }

    let app = build_router(state);

    let addr = SocketAddr::new(config.host.parse()?, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "workdesk_server=info,workdesk=info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let require_auth = axum::middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = auth::routes::public_router()
        .merge(auth::routes::protected_router().route_layer(require_auth.clone()))
        .with_state(state.clone());

    let resource_routes =
        workdesk::routes::configure_routes(state.pool.clone(), state.config.core())
            .route_layer(require_auth);

    let api = Router::new().nest("/auth", auth_routes).merge(resource_routes);

    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match sqlx::query("SELECT 1").fetch_one(state.pool.as_ref()).await {
        Ok(_) => Ok(Json(serde_json::json!({
            "status": "healthy",
            "database": "connected",
            "version": env!("CARGO_PKG_VERSION")
        }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
