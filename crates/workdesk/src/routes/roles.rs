//! Role and permission routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use super::AppState;
use crate::error::AppResult;
use crate::models::{
    AssignPermissionsRequest, CreatePermissionRequest, CreateRoleRequest, Permission, Role,
    RoleDetail, UpdateRoleRequest,
};
use crate::response::ApiResponse;
use crate::services::{PermissionService, RoleService};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/{id}", get(get_role).patch(update_role).delete(delete_role))
        .route("/roles/{id}/permissions", post(assign_permissions))
        .route("/permissions", get(list_permissions).post(create_permission))
        .route("/permissions/{id}", get(get_permission).delete(delete_permission))
        .with_state(state)
}

async fn list_roles(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<Role>>>> {
    let roles = RoleService::new().list(&state.pool).await?;
    Ok(Json(ApiResponse::list(roles)))
}

async fn create_role(
    State(state): State<AppState>,
    Json(req): Json<CreateRoleRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Role>>)> {
    let role = RoleService::new().create(&state.pool, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(role).with_message("Role created"))))
}

async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<RoleDetail>>> {
    let role = RoleService::new().get(&state.pool, &id).await?;
    Ok(Json(ApiResponse::data(role)))
}

async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> AppResult<Json<ApiResponse<Role>>> {
    let role = RoleService::new().update(&state.pool, &id, req).await?;
    Ok(Json(ApiResponse::data(role).with_message("Role updated")))
}

async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    RoleService::new().delete(&state.pool, &id).await?;
    Ok(Json(ApiResponse::message("Role deleted")))
}

/// Replace the role's permission set
async fn assign_permissions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AssignPermissionsRequest>,
) -> AppResult<Json<ApiResponse<RoleDetail>>> {
    let role = RoleService::new()
        .assign_permissions(&state.pool, &id, &req.permission_ids)
        .await?;
    Ok(Json(ApiResponse::data(role).with_message("Permissions assigned")))
}

async fn list_permissions(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<Permission>>>> {
    let permissions = PermissionService::new().list(&state.pool).await?;
    Ok(Json(ApiResponse::list(permissions)))
}

async fn create_permission(
    State(state): State<AppState>,
    Json(req): Json<CreatePermissionRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Permission>>)> {
    let permission = PermissionService::new().create(&state.pool, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(permission).with_message("Permission created")),
    ))
}

async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Permission>>> {
    let permission = PermissionService::new().get(&state.pool, &id).await?;
    Ok(Json(ApiResponse::data(permission)))
}

async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    PermissionService::new().delete(&state.pool, &id).await?;
    Ok(Json(ApiResponse::message("Permission deleted")))
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{app, send};
    use crate::db::connect_in_memory;
    use crate::test_support::seed_user;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_assign_permissions_replaces_set() {
        let pool = connect_in_memory().await.unwrap();
        let admin = seed_user(&pool, "admin").await;

        let mut ids = Vec::new();
        for action in ["docs:read", "docs:write"] {
            let body = json!({"action": action, "resource": "documents"});
            let (status, body) = send(app(&pool, &admin), "POST", "/permissions", Some(body)).await;
            assert_eq!(status, StatusCode::CREATED);
            ids.push(body["data"]["id"].as_str().unwrap().to_string());
        }

        let role = json!({"name": "editor", "label": "Editor"});
        let (status, body) = send(app(&pool, &admin), "POST", "/roles", Some(role.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let role_id = body["data"]["id"].as_str().unwrap().to_string();
        let (status, _) = send(app(&pool, &admin), "POST", "/roles", Some(role)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let uri = format!("/roles/{}/permissions", role_id);
        let (_, body) =
            send(app(&pool, &admin), "POST", &uri, Some(json!({"permissionIds": ids}))).await;
        assert_eq!(body["data"]["permissions"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            app(&pool, &admin),
            "POST",
            &uri,
            Some(json!({"permissionIds": ["missing"]})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(app(&pool, &admin), "GET", &format!("/roles/{}", role_id), None).await;
        assert_eq!(body["data"]["permissions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_role_list_has_meta() {
        let pool = connect_in_memory().await.unwrap();
        let admin = seed_user(&pool, "admin").await;

        let role = json!({"name": "viewer", "label": "Viewer"});
        let (_, body) = send(app(&pool, &admin), "POST", "/roles", Some(role)).await;
        assert_eq!(body["message"], "Role created");

        let (status, body) = send(app(&pool, &admin), "GET", "/roles", None).await;
        assert_eq!(status, StatusCode::OK);
        let count = body["data"].as_array().unwrap().len();
        assert_eq!(body["meta"]["total"], count as u64);
        assert_eq!(body["meta"]["totalPages"], 1);
    }
}
