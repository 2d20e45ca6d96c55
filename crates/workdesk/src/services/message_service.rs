//! Message service - conversations, rosters and unread counters
//!
//! Each participant row carries its own `unread_count`. Sending bumps every
//! other participant by one; reading the conversation zeroes the reader's
//! counter and stamps `last_read_at`.

use std::collections::HashSet;

use sqlx::SqlitePool;
use tracing::info;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{
    Conversation, ConversationDetail, ConversationSummary, CreateConversationRequest, Message,
    Participant, ParticipantRole, SendMessageRequest,
};
use crate::security::{non_blank, require_read, require_text, ConversationPolicy};

/// Messages returned with a conversation
pub const RECENT_MESSAGES: i64 = 50;

const DEFAULT_MESSAGE_TYPE: &str = "text";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, msg_type, content, created_at";

/// Creator first, then each listed user once
pub fn roster(creator_id: &str, participant_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(creator_id)
        .chain(participant_ids.iter().map(|id| id.trim()))
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// Message service
pub struct MessageService;

impl MessageService {
    pub fn new() -> Self {
        Self
    }

    /// Conversations of the user, most recently active first
    pub async fn list_conversations(
        &self,
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Vec<ConversationSummary>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT c.id, p.unread_count
            FROM conversations c
            JOIN conversation_participants p ON p.conversation_id = c.id
            WHERE p.user_id = ?
            ORDER BY c.updated_at DESC, c.rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for (conversation_id, unread_count) in rows {
            let conversation = self.fetch(pool, &conversation_id).await?;
            let sql = format!(
                "SELECT {} FROM messages WHERE conversation_id = ? AND is_deleted = 0 \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                MESSAGE_COLUMNS
            );
            let last_message = sqlx::query_as::<_, Message>(&sql)
                .bind(&conversation_id)
                .fetch_optional(pool)
                .await?;
            summaries.push(ConversationSummary {
                conversation,
                last_message,
                unread_count,
            });
        }
        Ok(summaries)
    }

    async fn fetch(&self, pool: &SqlitePool, id: &str) -> AppResult<Conversation> {
        sqlx::query_as::<_, Conversation>(
            "SELECT id, name, is_group, avatar, created_at, updated_at FROM conversations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Conversation", id))
    }

    async fn participants(&self, pool: &SqlitePool, id: &str) -> AppResult<Vec<Participant>> {
        let participants = sqlx::query_as::<_, Participant>(
            r#"
            SELECT conversation_id, user_id, role, unread_count, last_read_at, joined_at
            FROM conversation_participants
            WHERE conversation_id = ?
            ORDER BY joined_at, rowid
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(participants)
    }

    /// Start a conversation; more than two members always makes a group
    pub async fn create_conversation(
        &self,
        pool: &SqlitePool,
        request: CreateConversationRequest,
        creator_id: &str,
    ) -> AppResult<ConversationDetail> {
        let members = roster(creator_id, &request.participant_ids);
        if members.len() < 2 {
            return Err(AppError::Validation(
                "A conversation needs at least one other participant".to_string(),
            ));
        }
        for member in &members {
            let exists: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ? AND is_deleted = 0")
                    .bind(member)
                    .fetch_one(pool)
                    .await?;
            if exists == 0 {
                return Err(AppError::not_found("User", member));
            }
        }
        let is_group = request.is_group || members.len() > 2;

        let id = new_id();
        let now = db::now();
        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO conversations (id, name, is_group, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(non_blank(request.name))
        .bind(is_group)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for member in &members {
            let role = if member == creator_id {
                ParticipantRole::Owner
            } else {
                ParticipantRole::Member
            };
            sqlx::query(
                r#"
                INSERT INTO conversation_participants (conversation_id, user_id, role, unread_count, joined_at)
                VALUES (?, ?, ?, 0, ?)
                "#,
            )
            .bind(&id)
            .bind(member)
            .bind(role)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(conversation_id = %id, participants = members.len(), is_group, "Conversation created");
        Ok(ConversationDetail {
            conversation: self.fetch(pool, &id).await?,
            participants: self.participants(pool, &id).await?,
            messages: Vec::new(),
        })
    }

    /// Conversation with roster and the newest messages in chronological order.
    ///
    /// Opening a conversation marks it read for the caller.
    pub async fn get_conversation(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> AppResult<ConversationDetail> {
        require_read(&ConversationPolicy, pool, id, user_id).await?;
        self.mark_as_read(pool, id, user_id).await?;

        let conversation = self.fetch(pool, id).await?;
        let participants = self.participants(pool, id).await?;
        let sql = format!(
            "SELECT {} FROM messages WHERE conversation_id = ? AND is_deleted = 0 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
            MESSAGE_COLUMNS
        );
        let mut messages = sqlx::query_as::<_, Message>(&sql)
            .bind(id)
            .bind(RECENT_MESSAGES)
            .fetch_all(pool)
            .await?;
        messages.reverse();

        Ok(ConversationDetail {
            conversation,
            participants,
            messages,
        })
    }

    /// Append a message, touch the conversation and bump everyone else's counter
    pub async fn send_message(
        &self,
        pool: &SqlitePool,
        request: SendMessageRequest,
        sender_id: &str,
    ) -> AppResult<Message> {
        let content = require_text(&request.content, "content")?;
        require_read(&ConversationPolicy, pool, &request.conversation_id, sender_id).await?;
        let msg_type =
            non_blank(request.msg_type).unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string());

        let id = new_id();
        let now = db::now();
        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, msg_type, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&request.conversation_id)
        .bind(sender_id)
        .bind(&msg_type)
        .bind(&content)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&request.conversation_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE conversation_participants SET unread_count = unread_count + 1 \
             WHERE conversation_id = ? AND user_id <> ?",
        )
        .bind(&request.conversation_id)
        .bind(sender_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let sql = format!("SELECT {} FROM messages WHERE id = ?", MESSAGE_COLUMNS);
        let message = sqlx::query_as::<_, Message>(&sql).bind(&id).fetch_one(pool).await?;
        Ok(message)
    }

    /// Zero the caller's counter
    pub async fn mark_as_read(
        &self,
        pool: &SqlitePool,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE conversation_participants SET unread_count = 0, last_read_at = ? \
             WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(db::now())
        .bind(conversation_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Conversation", conversation_id));
        }
        Ok(())
    }

    /// Soft delete; only the sender may remove a message
    pub async fn delete_message(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> AppResult<()> {
        let sender: Option<String> =
            sqlx::query_scalar("SELECT sender_id FROM messages WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        match sender {
            None => return Err(AppError::not_found("Message", id)),
            Some(sender) if sender != user_id => return Err(AppError::forbidden("delete message")),
            Some(_) => {}
        }

        sqlx::query("UPDATE messages SET is_deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

impl Default for MessageService {
    fn default() -> Self {
        Self::new()
    }
}
