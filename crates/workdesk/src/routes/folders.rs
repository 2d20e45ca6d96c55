//! Folder routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};

use super::AppState;
use crate::error::AppResult;
use crate::models::{
    CreateFolderRequest, Folder, FolderTreeNode, ListFoldersQuery, MoveFolderRequest,
    RenameFolderRequest,
};
use crate::response::ApiResponse;
use crate::services::FolderService;
use crate::AuthenticatedUserId;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/folders", get(list_folders).post(create_folder))
        .route("/folders/tree", get(folder_tree))
        .route("/folders/{id}", get(get_folder).delete(delete_folder))
        .route("/folders/{id}/rename", patch(rename_folder))
        .route("/folders/{id}/move", post(move_folder))
        .with_state(state)
}

/// Children of `parentId`, or the roots when absent
async fn list_folders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Query(query): Query<ListFoldersQuery>,
) -> AppResult<Json<ApiResponse<Vec<Folder>>>> {
    let folders = FolderService::new()
        .list(&state.pool, user.as_str(), query.parent_id.as_deref())
        .await?;
    Ok(Json(ApiResponse::list(folders)))
}

async fn folder_tree(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
) -> AppResult<Json<ApiResponse<Vec<FolderTreeNode>>>> {
    let tree = FolderService::new().get_tree(&state.pool, user.as_str()).await?;
    Ok(Json(ApiResponse::list(tree)))
}

async fn create_folder(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Json(req): Json<CreateFolderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Folder>>)> {
    let folder = FolderService::new().create(&state.pool, req, user.as_str()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(folder).with_message("Folder created"))))
}

async fn get_folder(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Folder>>> {
    let folder = FolderService::new().get(&state.pool, &id, user.as_str()).await?;
    Ok(Json(ApiResponse::data(folder)))
}

async fn rename_folder(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<RenameFolderRequest>,
) -> AppResult<Json<ApiResponse<Folder>>> {
    let folder = FolderService::new()
        .rename(&state.pool, &id, user.as_str(), &req.name)
        .await?;
    Ok(Json(ApiResponse::data(folder).with_message("Folder renamed")))
}

async fn move_folder(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<MoveFolderRequest>,
) -> AppResult<Json<ApiResponse<Folder>>> {
    let folder = FolderService::new()
        .move_to(&state.pool, &id, user.as_str(), req.parent_id.as_deref())
        .await?;
    Ok(Json(ApiResponse::data(folder).with_message("Folder moved")))
}

async fn delete_folder(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    FolderService::new().delete(&state.pool, &id, user.as_str()).await?;
    Ok(Json(ApiResponse::message("Folder deleted")))
}
