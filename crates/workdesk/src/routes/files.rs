//! File metadata routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};

use super::AppState;
use crate::error::AppResult;
use crate::models::{
    BatchDeleteRequest, BatchDeleteResult, CreateFileRequest, DownloadUrl, ListFilesQuery,
    MoveFileRequest, RenameFileRequest, StorageInfo, StoredFile,
};
use crate::response::ApiResponse;
use crate::services::FileService;
use crate::AuthenticatedUserId;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/upload", post(upload_file))
        .route("/files/storage-info", get(storage_info))
        .route("/files/batch-delete", post(batch_delete))
        .route("/files/{id}", get(get_file).delete(delete_file))
        .route("/files/{id}/download-url", get(download_url))
        .route("/files/{id}/rename", patch(rename_file))
        .route("/files/{id}/move", post(move_file))
        .route("/files/{id}/copy", post(copy_file))
        .route("/files/{id}/favorite", patch(toggle_favorite))
        .with_state(state)
}

fn service(state: &AppState) -> FileService {
    FileService::new(state.config.clone())
}

async fn list_files(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Query(query): Query<ListFilesQuery>,
) -> AppResult<Json<ApiResponse<Vec<StoredFile>>>> {
    let page = service(&state).list(&state.pool, user.as_str(), &query).await?;
    Ok(Json(page.into()))
}

/// Record uploaded file metadata and charge the uploader's quota
async fn upload_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Json(req): Json<CreateFileRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<StoredFile>>)> {
    let file = service(&state).create(&state.pool, user.as_str(), req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(file).with_message("File uploaded"))))
}

async fn storage_info(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
) -> AppResult<Json<ApiResponse<StorageInfo>>> {
    let info = service(&state).storage_info(&state.pool, user.as_str()).await?;
    Ok(Json(ApiResponse::data(info)))
}

async fn get_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<StoredFile>>> {
    let file = service(&state).get(&state.pool, &id, user.as_str()).await?;
    Ok(Json(ApiResponse::data(file)))
}

async fn download_url(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<DownloadUrl>>> {
    let url = service(&state).download_url(&state.pool, &id, user.as_str()).await?;
    Ok(Json(ApiResponse::data(url)))
}

async fn rename_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<RenameFileRequest>,
) -> AppResult<Json<ApiResponse<StoredFile>>> {
    let file = service(&state)
        .rename(&state.pool, &id, user.as_str(), &req.name)
        .await?;
    Ok(Json(ApiResponse::data(file).with_message("File renamed")))
}

async fn move_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<MoveFileRequest>,
) -> AppResult<Json<ApiResponse<StoredFile>>> {
    let file = service(&state)
        .move_to(&state.pool, &id, user.as_str(), req.folder_id.as_deref())
        .await?;
    Ok(Json(ApiResponse::data(file).with_message("File moved")))
}

async fn copy_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, Json<ApiResponse<StoredFile>>)> {
    let file = service(&state).copy(&state.pool, &id, user.as_str()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(file).with_message("File copied"))))
}

async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<StoredFile>>> {
    let file = service(&state)
        .toggle_favorite(&state.pool, &id, user.as_str())
        .await?;
    Ok(Json(ApiResponse::data(file).with_message("Favorite toggled")))
}

async fn delete_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    service(&state).delete(&state.pool, &id, user.as_str()).await?;
    Ok(Json(ApiResponse::message("File deleted")))
}

async fn batch_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Json(req): Json<BatchDeleteRequest>,
) -> AppResult<Json<ApiResponse<BatchDeleteResult>>> {
    let deleted = service(&state)
        .batch_delete(&state.pool, &req.ids, user.as_str())
        .await?;
    Ok(Json(ApiResponse::data(BatchDeleteResult { deleted }).with_message("Files deleted")))
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{app, send};
    use crate::db::connect_in_memory;
    use crate::test_support::seed_user;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_upload_copy_and_storage_info() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;

        let upload = json!({"name": "report.pdf", "mimeType": "application/pdf", "size": 1000});
        let (status, body) = send(app(&pool, &owner), "POST", "/files/upload", Some(upload)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["path"], "/");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) =
            send(app(&pool, &owner), "POST", &format!("/files/{}/copy", id), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["name"], "report.pdf (copy)");

        let (_, body) = send(app(&pool, &owner), "GET", "/files/storage-info", None).await;
        assert_eq!(body["data"]["used"], 2000);

        let (_, body) =
            send(app(&pool, &owner), "GET", &format!("/files/{}/download-url", id), None).await;
        assert_eq!(body["data"]["url"], format!("/api/files/{}/download", id));

        let (_, body) = send(app(&pool, &owner), "GET", "/files?type=application", None).await;
        assert_eq!(body["meta"]["total"], 2);
    }

    #[tokio::test]
    async fn test_batch_delete_only_counts_own_files() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let other = seed_user(&pool, "other").await;

        let (_, body) = send(
            app(&pool, &owner),
            "POST",
            "/files/upload",
            Some(json!({"name": "a.txt", "size": 10})),
        )
        .await;
        let mine = body["data"]["id"].as_str().unwrap().to_string();
        let (_, body) = send(
            app(&pool, &other),
            "POST",
            "/files/upload",
            Some(json!({"name": "b.txt", "size": 10})),
        )
        .await;
        let theirs = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            app(&pool, &owner),
            "POST",
            "/files/batch-delete",
            Some(json!({"ids": [mine, theirs.clone()]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deleted"], 1);

        let (status, _) =
            send(app(&pool, &other), "GET", &format!("/files/{}", theirs), None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
