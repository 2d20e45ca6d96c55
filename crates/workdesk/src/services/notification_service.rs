//! Notification service - per-user inbox

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{
    ListNotificationsQuery, NewNotification, Notification, PaginatedResponse, Pagination,
};
use crate::security::{require_owner, OwnedResource};

const DEFAULT_LIMIT: u32 = 20;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, content, link, payload, is_read, read_at, created_at";

/// Notification service
pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        Self
    }

    /// Deliver a notification to one user
    pub async fn notify(&self, pool: &SqlitePool, new: NewNotification) -> AppResult<Notification> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, content, link, payload, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.kind)
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.link)
        .bind(new.payload.map(sqlx::types::Json))
        .bind(db::now())
        .execute(pool)
        .await?;

        debug!(notification_id = %id, user_id = %new.user_id, kind = %new.kind, "Notification delivered");
        self.fetch(pool, &id).await
    }

    async fn fetch(&self, pool: &SqlitePool, id: &str) -> AppResult<Notification> {
        let sql = format!("SELECT {} FROM notifications WHERE id = ?", NOTIFICATION_COLUMNS);
        sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Notification", id))
    }

    /// Newest first; also returns the caller's total unread count
    pub async fn list(
        &self,
        pool: &SqlitePool,
        user_id: &str,
        query: &ListNotificationsQuery,
    ) -> AppResult<(PaginatedResponse<Notification>, i64)> {
        let page = Pagination::new(query.page, query.limit, DEFAULT_LIMIT);
        let filter = if query.unread_only {
            "user_id = ? AND is_read = 0"
        } else {
            "user_id = ?"
        };

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM notifications WHERE {}",
            filter
        ))
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        let sql = format!(
            "SELECT {} FROM notifications WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            NOTIFICATION_COLUMNS, filter
        );
        let items = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(i64::from(page.limit))
            .bind(page.offset())
            .fetch_all(pool)
            .await?;

        let unread = self.unread_count(pool, user_id).await?;
        Ok((
            PaginatedResponse::new(items, total as u64, page.page, page.limit),
            unread,
        ))
    }

    pub async fn unread_count(&self, pool: &SqlitePool, user_id: &str) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Mark one of the caller's notifications as read
    pub async fn mark_read(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> AppResult<Notification> {
        require_owner(pool, OwnedResource::Notification, id, user_id, "read notification").await?;

        sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?) WHERE id = ?",
        )
        .bind(db::now())
        .bind(id)
        .execute(pool)
        .await?;
        self.fetch(pool, id).await
    }

    /// Returns how many notifications flipped to read
    pub async fn mark_all_read(&self, pool: &SqlitePool, user_id: &str) -> AppResult<u64> {
        let result =
            sqlx::query(
                "UPDATE notifications SET is_read = 1, read_at = ? WHERE user_id = ? AND is_read = 0",
            )
            .bind(db::now())
            .bind(user_id)
            .execute(pool)
            .await?;

        info!(user_id = %user_id, count = result.rows_affected(), "Notifications marked read");
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<()> {
        require_owner(pool, OwnedResource::Notification, id, user_id, "delete notification").await?;

        sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::test_support::seed_user;

    #[tokio::test]
    async fn test_notify_list_and_read() {
        let pool = connect_in_memory().await.unwrap();
        let user = seed_user(&pool, "alice").await;
        let service = NotificationService::new();

        let first = service
            .notify(
                &pool,
                NewNotification::new(&user, "system", "Welcome", "Hello")
                    .with_payload(serde_json::json!({"source": "test"})),
            )
            .await
            .unwrap();
        let shared =
            NewNotification::new(&user, "share", "Shared", "A doc").with_link("/documents/x");
        service.notify(&pool, shared).await.unwrap();
        assert_eq!(service.unread_count(&pool, &user).await.unwrap(), 2);

        let read = service.mark_read(&pool, &first.id, &user).await.unwrap();
        assert!(read.is_read);
        assert!(read.read_at.is_some());
        assert_eq!(read.payload.unwrap().0["source"], "test");

        let query = ListNotificationsQuery {
            unread_only: true,
            ..Default::default()
        };
        let (page, unread) = service.list(&pool, &user, &query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "Shared");
        assert_eq!(unread, 1);

        assert_eq!(service.mark_all_read(&pool, &user).await.unwrap(), 1);
        assert_eq!(service.unread_count(&pool, &user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_only_recipient_may_mutate() {
        let pool = connect_in_memory().await.unwrap();
        let user = seed_user(&pool, "alice").await;
        let other = seed_user(&pool, "bob").await;
        let service = NotificationService::new();

        let note = service
            .notify(&pool, NewNotification::new(&user, "system", "Hi", "There"))
            .await
            .unwrap();
        let err = service.delete(&pool, &note.id, &other).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
        let err = service.mark_read(&pool, &note.id, &other).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        service.delete(&pool, &note.id, &user).await.unwrap();
        assert_eq!(service.unread_count(&pool, &user).await.unwrap(), 0);
    }
}
