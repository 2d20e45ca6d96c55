//! Document routes
//!
//! Reads go through the document access check, so a document the caller can
//! neither own nor reach through an active share answers 404.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};

use super::AppState;
use crate::error::AppResult;
use crate::models::{
    BatchDeleteRequest, BatchDeleteResult, CreateDocumentRequest, DocumentShare, DocumentView,
    ListDocumentsQuery, MoveDocumentRequest, RenameDocumentRequest, ShareDocumentRequest,
    ShareTarget, UnshareDocumentRequest, UpdateDocumentRequest, UpdateTagsRequest,
};
use crate::response::ApiResponse;
use crate::services::{DocumentService, ShareService};
use crate::AuthenticatedUserId;

/// Configure document routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/documents", get(list_documents).post(create_document))
        .route("/documents/batch-delete", post(batch_delete))
        .route(
            "/documents/{id}",
            get(get_document).put(update_document).delete(delete_document),
        )
        .route("/documents/{id}/rename", patch(rename_document))
        .route("/documents/{id}/move", post(move_document))
        .route("/documents/{id}/tags", post(update_tags))
        .route("/documents/{id}/share", post(share_document))
        .route("/documents/{id}/unshare", post(unshare_document))
        .route("/documents/{id}/shares", get(list_shares))
        .with_state(state)
}

/// Owned documents plus those reachable through an active share
async fn list_documents(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Query(query): Query<ListDocumentsQuery>,
) -> AppResult<Json<ApiResponse<Vec<DocumentView>>>> {
    let page = DocumentService::new()
        .list(&state.pool, user.as_str(), &query)
        .await?;
    Ok(Json(page.into()))
}

async fn create_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Json(req): Json<CreateDocumentRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<DocumentView>>)> {
    let doc = DocumentService::new()
        .create(&state.pool, req, user.as_str())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(doc).with_message("Document created"))))
}

async fn get_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<DocumentView>>> {
    let doc = DocumentService::new().get(&state.pool, &id, user.as_str()).await?;
    Ok(Json(ApiResponse::data(doc)))
}

async fn update_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDocumentRequest>,
) -> AppResult<Json<ApiResponse<DocumentView>>> {
    let doc = DocumentService::new()
        .update(&state.pool, &id, user.as_str(), req)
        .await?;
    Ok(Json(ApiResponse::data(doc).with_message("Document updated")))
}

async fn rename_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<RenameDocumentRequest>,
) -> AppResult<Json<ApiResponse<DocumentView>>> {
    let doc = DocumentService::new()
        .rename(&state.pool, &id, user.as_str(), req.title)
        .await?;
    Ok(Json(ApiResponse::data(doc).with_message("Document renamed")))
}

async fn move_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<MoveDocumentRequest>,
) -> AppResult<Json<ApiResponse<DocumentView>>> {
    let doc = DocumentService::new()
        .move_to(&state.pool, &id, user.as_str(), req.folder)
        .await?;
    Ok(Json(ApiResponse::data(doc).with_message("Document moved")))
}

async fn update_tags(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTagsRequest>,
) -> AppResult<Json<ApiResponse<DocumentView>>> {
    let doc = DocumentService::new()
        .update_tags(&state.pool, &id, user.as_str(), &req.tags)
        .await?;
    Ok(Json(ApiResponse::data(doc).with_message("Tags updated")))
}

async fn share_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<ShareDocumentRequest>,
) -> AppResult<Json<ApiResponse<DocumentShare>>> {
    let share = ShareService::new()
        .share(&state.pool, &id, user.as_str(), req)
        .await?;
    Ok(Json(ApiResponse::data(share).with_message("Document shared")))
}

async fn unshare_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<UnshareDocumentRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let target = ShareTarget::from_parts(req.user_id, req.team_id)?;
    let removed = ShareService::new()
        .unshare(&state.pool, &id, user.as_str(), target)
        .await?;
    let message = if removed {
        "Share removed"
    } else {
        "No share to remove"
    };
    Ok(Json(ApiResponse::message(message)))
}

async fn list_shares(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<DocumentShare>>>> {
    let shares = ShareService::new()
        .list_shares(&state.pool, &id, user.as_str())
        .await?;
    Ok(Json(ApiResponse::list(shares)))
}

async fn delete_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    DocumentService::new()
        .delete(&state.pool, &id, user.as_str())
        .await?;
    Ok(Json(ApiResponse::message("Document deleted")))
}

async fn batch_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Json(req): Json<BatchDeleteRequest>,
) -> AppResult<Json<ApiResponse<BatchDeleteResult>>> {
    let deleted = DocumentService::new()
        .batch_delete(&state.pool, &req.ids, user.as_str())
        .await?;
    Ok(Json(ApiResponse::data(BatchDeleteResult { deleted }).with_message("Documents deleted")))
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{app, send};
    use crate::db::connect_in_memory;
    use crate::test_support::{seed_document, seed_user};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_share_opens_and_unshare_closes() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let reader = seed_user(&pool, "reader").await;
        let doc = seed_document(&pool, &owner, "Plan").await;
        let uri = format!("/documents/{}", doc);

        let (status, _) = send(app(&pool, &reader), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let share = json!({"userId": reader, "permission": "READ"});
        let (status, body) =
            send(app(&pool, &owner), "POST", &format!("{}/share", uri), Some(share)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["permission"], "READ");

        let (status, body) = send(app(&pool, &reader), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "Plan");
        assert!(body["data"].get("shares").is_none());

        let (_, body) = send(app(&pool, &reader), "GET", "/documents", None).await;
        assert_eq!(body["meta"]["total"], 1);

        let (status, _) = send(app(&pool, &reader), "GET", &format!("{}/shares", uri), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let unshare = json!({"userId": reader});
        let (status, _) =
            send(app(&pool, &owner), "POST", &format!("{}/unshare", uri), Some(unshare)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(app(&pool, &reader), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_tag_and_filter() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;

        let create = json!({"title": "Roadmap", "content": "abc", "tags": ["q3", "q3", "plan"]});
        let (status, body) = send(app(&pool, &owner), "POST", "/documents", Some(create)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["size"], 3);
        assert_eq!(body["data"]["tags"].as_array().unwrap().len(), 2);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/documents/{}/tags", id);
        let (status, _) =
            send(app(&pool, &owner), "POST", &uri, Some(json!({"tags": ["draft"]}))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(app(&pool, &owner), "GET", "/documents?tags=plan", None).await;
        assert_eq!(body["meta"]["total"], 0);
        let (_, body) = send(app(&pool, &owner), "GET", "/documents?tags=draft", None).await;
        assert_eq!(body["meta"]["total"], 1);

        let (status, _) =
            send(app(&pool, &owner), "POST", "/documents", Some(json!({"title": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mutations_carry_message() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;

        let doc = json!({"title": "Roadmap", "content": "Q3"});
        let (status, body) = send(app(&pool, &owner), "POST", "/documents", Some(doc)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Document created");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/documents/{}", id);
        let (status, body) =
            send(app(&pool, &owner), "PUT", &uri, Some(json!({"content": "Q4"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Document updated");
        assert_eq!(body["data"]["title"], "Roadmap");

        let (_, body) =
            send(app(&pool, &owner), "GET", &format!("/documents/{}/shares", id), None).await;
        assert_eq!(body["meta"]["total"], 0);
        assert_eq!(body["meta"]["page"], 1);

        let (status, body) = send(app(&pool, &owner), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Document deleted");
    }
}
