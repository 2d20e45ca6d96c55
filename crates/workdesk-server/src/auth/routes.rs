//! Authentication API routes

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use workdesk::models::User;
use workdesk::response::ApiResponse;
use workdesk::services::UserService;
use workdesk::{AppResult, AuthenticatedUserId};

use super::service::{
    AuthService, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest, TokenResponse,
};
use crate::state::AppState;

/// Routes reachable without a token
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

/// Routes behind the auth middleware
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_current_user))
        .route("/logout", post(logout))
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<TokenResponse>>)> {
    let tokens = AuthService::new(&state.pool, &state.jwt).register(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(tokens).with_message("Registered"))))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let tokens = AuthService::new(&state.pool, &state.jwt).login(request).await?;
    Ok(Json(ApiResponse::data(tokens).with_message("Logged in")))
}

async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let tokens = AuthService::new(&state.pool, &state.jwt)
        .refresh(&request.refresh_token)
        .await?;
    Ok(Json(ApiResponse::data(tokens).with_message("Token refreshed")))
}

async fn get_current_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = UserService::new().get(&state.pool, user.as_str()).await?;
    Ok(Json(ApiResponse::data(user)))
}

/// Body is optional; without a refresh token every session of the user ends
async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    body: Option<Json<LogoutRequest>>,
) -> AppResult<Json<ApiResponse<()>>> {
    let request = body.map(|Json(body)| body).unwrap_or_default();
    AuthService::new(&state.pool, &state.jwt)
        .logout(user.as_str(), request.refresh_token.as_deref())
        .await?;
    Ok(Json(ApiResponse::message("Logged out")))
}
