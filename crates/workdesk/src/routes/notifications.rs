//! Notification routes

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, put},
    Extension, Json, Router,
};

use super::AppState;
use crate::error::AppResult;
use crate::models::{ListNotificationsQuery, Notification, UnreadCount};
use crate::response::ApiResponse;
use crate::services::NotificationService;
use crate::AuthenticatedUserId;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/{id}/read", put(mark_read))
        .route("/notifications/{id}", delete(delete_notification))
        .with_state(state)
}

/// Page of the caller's notifications; `meta.unreadCount` is the overall unread total
async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let (page, unread) = NotificationService::new()
        .list(&state.pool, user.as_str(), &query)
        .await?;

    let mut response = ApiResponse::from(page);
    if let Some(meta) = response.meta.as_mut() {
        meta.unread_count = Some(unread);
    }
    Ok(Json(response))
}

async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
) -> AppResult<Json<ApiResponse<UnreadCount>>> {
    let count = NotificationService::new()
        .unread_count(&state.pool, user.as_str())
        .await?;
    Ok(Json(ApiResponse::data(UnreadCount { count })))
}

async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let notification = NotificationService::new()
        .mark_read(&state.pool, &id, user.as_str())
        .await?;
    Ok(Json(ApiResponse::data(notification).with_message("Notification marked as read")))
}

async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
) -> AppResult<Json<ApiResponse<()>>> {
    let updated = NotificationService::new()
        .mark_all_read(&state.pool, user.as_str())
        .await?;
    Ok(Json(ApiResponse::message(format!("{} notifications marked as read", updated))))
}

async fn delete_notification(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    NotificationService::new()
        .delete(&state.pool, &id, user.as_str())
        .await?;
    Ok(Json(ApiResponse::message("Notification deleted")))
}
