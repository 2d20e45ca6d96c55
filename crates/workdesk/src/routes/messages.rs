//! Conversation and message routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};

use super::AppState;
use crate::error::AppResult;
use crate::models::{
    ConversationDetail, ConversationSummary, CreateConversationRequest, Message,
    SendMessageRequest,
};
use crate::response::ApiResponse;
use crate::services::MessageService;
use crate::AuthenticatedUserId;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/messages/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/messages/conversations/{id}", get(get_conversation))
        .route("/messages", post(send_message))
        // `id` names the conversation here
        .route("/messages/{id}/read", put(mark_as_read))
        .route("/messages/{id}", delete(delete_message))
        .with_state(state)
}

async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
) -> AppResult<Json<ApiResponse<Vec<ConversationSummary>>>> {
    let conversations = MessageService::new()
        .list_conversations(&state.pool, user.as_str())
        .await?;
    Ok(Json(ApiResponse::list(conversations)))
}

async fn create_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Json(req): Json<CreateConversationRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ConversationDetail>>)> {
    let conversation = MessageService::new()
        .create_conversation(&state.pool, req, user.as_str())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(conversation).with_message("Conversation created")),
    ))
}

/// Opening a conversation also clears the caller's unread counter
async fn get_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ConversationDetail>>> {
    let conversation = MessageService::new()
        .get_conversation(&state.pool, &id, user.as_str())
        .await?;
    Ok(Json(ApiResponse::data(conversation)))
}

async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Message>>)> {
    let message = MessageService::new()
        .send_message(&state.pool, req, user.as_str())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(message).with_message("Message sent"))))
}

async fn mark_as_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(conversation_id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    MessageService::new()
        .mark_as_read(&state.pool, &conversation_id, user.as_str())
        .await?;
    Ok(Json(ApiResponse::message("Conversation marked as read")))
}

async fn delete_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    MessageService::new()
        .delete_message(&state.pool, &id, user.as_str())
        .await?;
    Ok(Json(ApiResponse::message("Message deleted")))
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{app, send};
    use crate::db::connect_in_memory;
    use crate::test_support::seed_user;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_unread_counter_round_trip() {
        let pool = connect_in_memory().await.unwrap();
        let alice = seed_user(&pool, "alice").await;
        let bob = seed_user(&pool, "bob").await;
        let eve = seed_user(&pool, "eve").await;

        let create = json!({"participantIds": [bob]});
        let (status, body) =
            send(app(&pool, &alice), "POST", "/messages/conversations", Some(create)).await;
        assert_eq!(status, StatusCode::CREATED);
        let conv = body["data"]["id"].as_str().unwrap().to_string();

        for text in ["hi", "are you there?"] {
            let msg = json!({"conversationId": conv, "content": text});
            let (status, _) = send(app(&pool, &alice), "POST", "/messages", Some(msg)).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, body) = send(app(&pool, &bob), "GET", "/messages/conversations", None).await;
        assert_eq!(body["data"][0]["unreadCount"], 2);
        assert_eq!(body["data"][0]["lastMessage"]["content"], "are you there?");

        let (status, _) =
            send(app(&pool, &bob), "PUT", &format!("/messages/{}/read", conv), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(app(&pool, &bob), "GET", "/messages/conversations", None).await;
        assert_eq!(body["data"][0]["unreadCount"], 0);

        let (status, _) =
            send(app(&pool, &eve), "GET", &format!("/messages/conversations/{}", conv), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let msg = json!({"conversationId": conv, "content": "let me in"});
        let (status, _) = send(app(&pool, &eve), "POST", "/messages", Some(msg)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_only_sender_deletes() {
        let pool = connect_in_memory().await.unwrap();
        let alice = seed_user(&pool, "alice").await;
        let bob = seed_user(&pool, "bob").await;

        let (_, body) = send(
            app(&pool, &alice),
            "POST",
            "/messages/conversations",
            Some(json!({"participantIds": [bob]})),
        )
        .await;
        let conv = body["data"]["id"].as_str().unwrap().to_string();
        let (_, body) = send(
            app(&pool, &alice),
            "POST",
            "/messages",
            Some(json!({"conversationId": conv, "content": "draft"})),
        )
        .await;
        let msg = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) =
            send(app(&pool, &bob), "DELETE", &format!("/messages/{}", msg), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) =
            send(app(&pool, &alice), "DELETE", &format!("/messages/{}", msg), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) =
            send(app(&pool, &bob), "GET", &format!("/messages/conversations/{}", conv), None).await;
        assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 0);
    }
}
