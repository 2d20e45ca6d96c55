//! Authentication middleware

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use workdesk::services::UserService;
use workdesk::{AppError, AuthenticatedUserId};

use super::jwt::TokenType;
use crate::state::AppState;

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Require a valid access token for a live account and expose its user id
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return AppError::Unauthorized("Missing bearer token".to_string()).into_response();
    };

    let claims = match state.jwt.verify(token, TokenType::Access) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    match UserService::new().get(&state.pool, &claims.sub).await {
        Ok(_) => {}
        Err(AppError::NotFound { .. }) => {
            return AppError::Unauthorized("Account no longer exists".to_string()).into_response();
        }
        Err(e) => return e.into_response(),
    }

    request.extensions_mut().insert(AuthenticatedUserId(claims.sub));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Extension, Router};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn whoami(Extension(user): Extension<AuthenticatedUserId>) -> String {
        user.0
    }

    async fn setup() -> (AppState, Router, String) {
        let pool = workdesk::db::connect_in_memory().await.unwrap();
        let now = workdesk::db::now();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, username, password_hash, name, status, created_at, updated_at)
            VALUES ('u1', 'ada@example.com', 'ada', 'unusable', 'Ada', 'ACTIVE', ?, ?)
            "#,
        )
        .bind(&now)
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();

        let state = AppState::new(Arc::new(pool), Config::default());
        let router = Router::new()
            .route("/whoami", get(whoami))
            .route_layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware));
        let (token, _) = state.jwt.issue("u1", TokenType::Access).unwrap();
        (state, router, token)
    }

    async fn status_for(router: &Router, token: &str) -> StatusCode {
        let request = Request::builder()
            .uri("/whoami")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        router.clone().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_live_account_passes() {
        let (_, router, token) = setup().await;
        assert_eq!(status_for(&router, &token).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_deleted_account_is_unauthorized() {
        let (state, router, token) = setup().await;
        sqlx::query("UPDATE users SET is_deleted = 1 WHERE id = 'u1'")
            .execute(state.pool.as_ref())
            .await
            .unwrap();
        assert_eq!(status_for(&router, &token).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_database_failure_is_not_reported_as_unauthorized() {
        let (state, router, token) = setup().await;
        state.pool.close().await;
        assert_eq!(status_for(&router, &token).await, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
