//! User administration routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};

use super::AppState;
use crate::error::AppResult;
use crate::models::{
    AssignRolesRequest, BatchDeleteRequest, BatchDeleteResult, CreateUserRequest, ListUsersQuery,
    Role, UpdateUserRequest, UpdateUserStatusRequest, User,
};
use crate::response::ApiResponse;
use crate::services::{RoleService, UserService};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/batch-delete", post(batch_delete))
        .route("/users/{id}", get(get_user).patch(update_user).delete(delete_user))
        .route("/users/{id}/status", patch(update_status))
        .route("/users/{id}/roles", get(list_roles).post(assign_roles))
        .with_state(state)
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    let page = UserService::new().list(&state.pool, &query).await?;
    Ok(Json(page.into()))
}

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    let user = UserService::new().create(&state.pool, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(user).with_message("User created"))))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = UserService::new().get(&state.pool, &id).await?;
    Ok(Json(ApiResponse::data(user)))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = UserService::new().update(&state.pool, &id, req).await?;
    Ok(Json(ApiResponse::data(user).with_message("User updated")))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserStatusRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = UserService::new()
        .update_status(&state.pool, &id, req.status)
        .await?;
    Ok(Json(ApiResponse::data(user).with_message("User status updated")))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    UserService::new().delete(&state.pool, &id).await?;
    Ok(Json(ApiResponse::message("User deleted")))
}

async fn batch_delete(
    State(state): State<AppState>,
    Json(req): Json<BatchDeleteRequest>,
) -> AppResult<Json<ApiResponse<BatchDeleteResult>>> {
    let deleted = UserService::new().batch_delete(&state.pool, &req.ids).await?;
    Ok(Json(ApiResponse::data(BatchDeleteResult { deleted }).with_message("Users deleted")))
}

async fn list_roles(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<Role>>>> {
    UserService::new().get(&state.pool, &id).await?;
    let roles = RoleService::new().roles_of(&state.pool, &id).await?;
    Ok(Json(ApiResponse::list(roles)))
}

/// Replace the user's role set
async fn assign_roles(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AssignRolesRequest>,
) -> AppResult<Json<ApiResponse<Vec<Role>>>> {
    let roles = RoleService::new()
        .assign_to_user(&state.pool, &id, &req.role_ids)
        .await?;
    Ok(Json(ApiResponse::list(roles).with_message("Roles assigned")))
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{app, send};
    use crate::db::connect_in_memory;
    use crate::test_support::seed_user;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_user_lifecycle() {
        let pool = connect_in_memory().await.unwrap();
        let admin = seed_user(&pool, "admin").await;

        let create =
            json!({"email": "Grace@Example.com", "username": "grace", "password": "secret1"});
        let (status, body) = send(app(&pool, &admin), "POST", "/users", Some(create)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["email"], "grace@example.com");
        assert!(body["data"].get("passwordHash").is_none());
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let bad = json!({"email": "nope", "username": "x", "password": "1"});
        let (status, body) = send(app(&pool, &admin), "POST", "/users", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let uri = format!("/users/{}/status", id);
        let (_, body) =
            send(app(&pool, &admin), "PATCH", &uri, Some(json!({"status": "SUSPENDED"}))).await;
        assert_eq!(body["data"]["status"], "SUSPENDED");

        let (_, body) = send(app(&pool, &admin), "GET", "/users?status=SUSPENDED", None).await;
        assert_eq!(body["meta"]["total"], 1);

        let (status, _) = send(app(&pool, &admin), "DELETE", &format!("/users/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(app(&pool, &admin), "GET", &format!("/users/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_assign_roles() {
        let pool = connect_in_memory().await.unwrap();
        let admin = seed_user(&pool, "admin").await;

        let (_, body) = send(
            app(&pool, &admin),
            "POST",
            "/roles",
            Some(json!({"name": "auditor", "label": "Auditor"})),
        )
        .await;
        let role = body["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/users/{}/roles", admin);
        let (status, body) =
            send(app(&pool, &admin), "POST", &uri, Some(json!({"roleIds": [role]}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["name"], "auditor");

        let (_, body) = send(app(&pool, &admin), "GET", &uri, None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = send(app(&pool, &admin), "GET", "/users/missing/roles", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
