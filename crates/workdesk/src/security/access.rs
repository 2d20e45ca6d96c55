//! Access-control evaluator
//!
//! Every resource check reduces to one owner comparison ([`is_owner`]) plus,
//! for documents, the sharing ledger and, for conversations, the participant
//! roster. Mutations go through [`require_modify`], which reports
//! `Forbidden`; reads go through [`require_read`], which reports `NotFound`
//! so that callers cannot discover resources they may not see.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db;
use crate::error::{AppError, AppResult};

/// Resource kinds whose rows carry an owner column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnedResource {
    Document,
    File,
    Folder,
    Team,
    CalendarEvent,
    Notification,
}

impl OwnedResource {
    pub fn label(self) -> &'static str {
        match self {
            OwnedResource::Document => "Document",
            OwnedResource::File => "File",
            OwnedResource::Folder => "Folder",
            OwnedResource::Team => "Team",
            OwnedResource::CalendarEvent => "Event",
            OwnedResource::Notification => "Notification",
        }
    }

    fn table(self) -> &'static str {
        match self {
            OwnedResource::Document => "documents",
            OwnedResource::File => "files",
            OwnedResource::Folder => "folders",
            OwnedResource::Team => "teams",
            OwnedResource::CalendarEvent => "calendar_events",
            OwnedResource::Notification => "notifications",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            OwnedResource::Notification => "user_id",
            _ => "owner_id",
        }
    }

    fn live_filter(self) -> &'static str {
        match self {
            OwnedResource::Notification => "",
            _ => " AND is_deleted = 0",
        }
    }
}

/// Owner comparison shared by every per-resource check.
///
/// A missing or soft-deleted row yields `false`.
pub async fn is_owner(
    pool: &SqlitePool,
    kind: OwnedResource,
    resource_id: &str,
    user_id: &str,
) -> AppResult<bool> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?{}",
        kind.owner_column(),
        kind.table(),
        kind.live_filter()
    );
    let owner: Option<String> = sqlx::query_scalar(&sql)
        .bind(resource_id)
        .fetch_optional(pool)
        .await?;
    Ok(owner.as_deref() == Some(user_id))
}

/// Append the document visibility predicate for alias `d`.
///
/// Visible means owned, or covered by an unexpired share naming the user,
/// or by an unexpired share naming a live team the user currently belongs to.
pub(crate) fn push_document_visibility(
    builder: &mut QueryBuilder<'_, Sqlite>,
    user_id: &str,
    now: &str,
) {
    builder
        .push("(d.owner_id = ")
        .push_bind(user_id.to_string())
        .push(
            " OR EXISTS (SELECT 1 FROM document_shares s \
             WHERE s.document_id = d.id AND s.shared_with_id = ",
        )
        .push_bind(user_id.to_string())
        .push(" AND (s.expires_at IS NULL OR s.expires_at > ")
        .push_bind(now.to_string())
        .push(
            ")) OR EXISTS (SELECT 1 FROM document_shares s \
             JOIN teams t ON t.id = s.team_id AND t.is_deleted = 0 \
             JOIN team_members m ON m.team_id = s.team_id \
             WHERE s.document_id = d.id AND m.user_id = ",
        )
        .push_bind(user_id.to_string())
        .push(" AND (s.expires_at IS NULL OR s.expires_at > ")
        .push_bind(now.to_string())
        .push(")))");
}

/// Owner, active direct share, or active team share with current membership
pub async fn has_document_access(
    pool: &SqlitePool,
    document_id: &str,
    user_id: &str,
) -> AppResult<bool> {
    let now = db::now();
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT EXISTS(SELECT 1 FROM documents d WHERE d.is_deleted = 0 AND d.id = ",
    );
    builder.push_bind(document_id.to_string()).push(" AND ");
    push_document_visibility(&mut builder, user_id, &now);
    builder.push(")");

    let visible: i64 = builder.build_query_scalar().fetch_one(pool).await?;
    Ok(visible != 0)
}

/// Roster check for conversations
pub async fn is_participant(
    pool: &SqlitePool,
    conversation_id: &str,
    user_id: &str,
) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = ? AND user_id = ?",
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Current membership of a live team
pub async fn is_team_member(pool: &SqlitePool, team_id: &str, user_id: &str) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM team_members m
        JOIN teams t ON t.id = m.team_id
        WHERE m.team_id = ? AND m.user_id = ? AND t.is_deleted = 0
        "#,
    )
    .bind(team_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

async fn is_attendee(pool: &SqlitePool, event_id: &str, user_id: &str) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM event_attendees a
        JOIN calendar_events e ON e.id = a.event_id
        WHERE a.event_id = ? AND a.user_id = ? AND e.is_deleted = 0
        "#,
    )
    .bind(event_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Capability check for one resource type
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// Name used in `NotFound` errors
    fn resource(&self) -> &'static str;

    async fn can_read(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool>;

    async fn can_modify(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool>;
}

/// Only the owner may read or modify (files, folders, notifications)
pub struct OwnerOnly(pub OwnedResource);

#[async_trait]
impl AccessPolicy for OwnerOnly {
    fn resource(&self) -> &'static str {
        self.0.label()
    }

    async fn can_read(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        is_owner(pool, self.0, resource_id, user_id).await
    }

    async fn can_modify(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        is_owner(pool, self.0, resource_id, user_id).await
    }
}

/// Documents: shared grantees read, only the owner mutates
pub struct DocumentPolicy;

#[async_trait]
impl AccessPolicy for DocumentPolicy {
    fn resource(&self) -> &'static str {
        OwnedResource::Document.label()
    }

    async fn can_read(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        has_document_access(pool, resource_id, user_id).await
    }

    async fn can_modify(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        is_owner(pool, OwnedResource::Document, resource_id, user_id).await
    }
}

/// Teams: members read, only the owner mutates
pub struct TeamPolicy;

#[async_trait]
impl AccessPolicy for TeamPolicy {
    fn resource(&self) -> &'static str {
        OwnedResource::Team.label()
    }

    async fn can_read(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        Ok(is_owner(pool, OwnedResource::Team, resource_id, user_id).await?
            || is_team_member(pool, resource_id, user_id).await?)
    }

    async fn can_modify(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        is_owner(pool, OwnedResource::Team, resource_id, user_id).await
    }
}

/// Calendar events: attendees read, only the owner mutates
pub struct EventPolicy;

#[async_trait]
impl AccessPolicy for EventPolicy {
    fn resource(&self) -> &'static str {
        OwnedResource::CalendarEvent.label()
    }

    async fn can_read(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        Ok(is_owner(pool, OwnedResource::CalendarEvent, resource_id, user_id).await?
            || is_attendee(pool, resource_id, user_id).await?)
    }

    async fn can_modify(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        is_owner(pool, OwnedResource::CalendarEvent, resource_id, user_id).await
    }
}

/// Conversations: the roster decides, not ownership
pub struct ConversationPolicy;

#[async_trait]
impl AccessPolicy for ConversationPolicy {
    fn resource(&self) -> &'static str {
        "Conversation"
    }

    async fn can_read(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        is_participant(pool, resource_id, user_id).await
    }

    async fn can_modify(
        &self,
        pool: &SqlitePool,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        is_participant(pool, resource_id, user_id).await
    }
}

/// Fail with `NotFound` unless the user may read the resource
pub async fn require_read<P: AccessPolicy + ?Sized>(
    policy: &P,
    pool: &SqlitePool,
    resource_id: &str,
    user_id: &str,
) -> AppResult<()> {
    if policy.can_read(pool, resource_id, user_id).await? {
        Ok(())
    } else {
        Err(AppError::not_found(policy.resource(), resource_id))
    }
}

/// Fail with `Forbidden` unless the user may modify the resource
pub async fn require_modify<P: AccessPolicy + ?Sized>(
    policy: &P,
    pool: &SqlitePool,
    resource_id: &str,
    user_id: &str,
    action: &str,
) -> AppResult<()> {
    if policy.can_modify(pool, resource_id, user_id).await? {
        Ok(())
    } else {
        Err(AppError::forbidden(action))
    }
}

/// Ownership guard for mutations on owner-only resources
pub async fn require_owner(
    pool: &SqlitePool,
    kind: OwnedResource,
    resource_id: &str,
    user_id: &str,
    action: &str,
) -> AppResult<()> {
    require_modify(&OwnerOnly(kind), pool, resource_id, user_id, action).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect_in_memory, timestamp};
    use crate::test_support::{seed_document, seed_team, seed_user};
    use chrono::{Duration, Utc};

    async fn insert_user_share(pool: &SqlitePool, doc: &str, user: &str, expires: Option<String>) {
        sqlx::query(
            "INSERT INTO document_shares (id, document_id, shared_with_id, permission, expires_at, created_at) \
             VALUES (?, ?, ?, 'READ', ?, ?)",
        )
        .bind(crate::id::new_id())
        .bind(doc)
        .bind(user)
        .bind(expires)
        .bind(db::now())
        .execute(pool)
        .await
        .unwrap();
    }

    async fn insert_team_share(pool: &SqlitePool, doc: &str, team: &str, expires: Option<String>) {
        sqlx::query(
            "INSERT INTO document_shares (id, document_id, team_id, permission, expires_at, created_at) \
             VALUES (?, ?, ?, 'READ', ?, ?)",
        )
        .bind(crate::id::new_id())
        .bind(doc)
        .bind(team)
        .bind(expires)
        .bind(db::now())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_owner_check_fails_closed() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let doc = seed_document(&pool, &owner, "Plan").await;

        assert!(is_owner(&pool, OwnedResource::Document, &doc, &owner).await.unwrap());
        assert!(!is_owner(&pool, OwnedResource::Document, &doc, "someone").await.unwrap());
        assert!(!is_owner(&pool, OwnedResource::Document, "missing", &owner).await.unwrap());

        let err =
            require_owner(&pool, OwnedResource::Document, "missing", &owner, "delete document")
                .await
                .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_soft_deleted_resources_are_not_owned() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let doc = seed_document(&pool, &owner, "Old").await;
        sqlx::query("UPDATE documents SET is_deleted = 1 WHERE id = ?")
            .bind(&doc)
            .execute(&pool)
            .await
            .unwrap();

        assert!(!is_owner(&pool, OwnedResource::Document, &doc, &owner).await.unwrap());
        assert!(!has_document_access(&pool, &doc, &owner).await.unwrap());
    }

    #[tokio::test]
    async fn test_document_access_sources() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let direct = seed_user(&pool, "direct").await;
        let expired = seed_user(&pool, "expired").await;
        let member = seed_user(&pool, "member").await;
        let outsider = seed_user(&pool, "outsider").await;
        let doc = seed_document(&pool, &owner, "Budget").await;

        let past = timestamp(Utc::now() - Duration::hours(1));
        let future = timestamp(Utc::now() + Duration::hours(1));
        insert_user_share(&pool, &doc, &direct, Some(future.clone())).await;
        insert_user_share(&pool, &doc, &expired, Some(past)).await;

        let team = seed_team(&pool, &owner, "Finance").await;
        sqlx::query("INSERT INTO team_members (team_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(&team)
            .bind(&member)
            .bind(db::now())
            .execute(&pool)
            .await
            .unwrap();
        insert_team_share(&pool, &doc, &team, None).await;

        assert!(has_document_access(&pool, &doc, &owner).await.unwrap());
        assert!(has_document_access(&pool, &doc, &direct).await.unwrap());
        assert!(!has_document_access(&pool, &doc, &expired).await.unwrap());
        assert!(has_document_access(&pool, &doc, &member).await.unwrap());
        assert!(!has_document_access(&pool, &doc, &outsider).await.unwrap());

        // Leaving the team revokes the team-derived access
        sqlx::query("DELETE FROM team_members WHERE team_id = ? AND user_id = ?")
            .bind(&team)
            .bind(&member)
            .execute(&pool)
            .await
            .unwrap();
        assert!(!has_document_access(&pool, &doc, &member).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_team_share_denies_members() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let member = seed_user(&pool, "member").await;
        let doc = seed_document(&pool, &owner, "Memo").await;
        let team = seed_team(&pool, &owner, "Ops").await;
        sqlx::query("INSERT INTO team_members (team_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(&team)
            .bind(&member)
            .bind(db::now())
            .execute(&pool)
            .await
            .unwrap();
        let expired = timestamp(Utc::now() - Duration::minutes(5));
        insert_team_share(&pool, &doc, &team, Some(expired)).await;

        assert!(!has_document_access(&pool, &doc, &member).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_guard_reports_not_found() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let stranger = seed_user(&pool, "stranger").await;
        let doc = seed_document(&pool, &owner, "Private").await;

        require_read(&DocumentPolicy, &pool, &doc, &owner).await.unwrap();
        let err = require_read(&DocumentPolicy, &pool, &doc, &stranger).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { resource: "Document", .. }));
    }

    #[tokio::test]
    async fn test_team_policy() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let member = seed_user(&pool, "member").await;
        let team = seed_team(&pool, &owner, "Design").await;
        sqlx::query("INSERT INTO team_members (team_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(&team)
            .bind(&member)
            .bind(db::now())
            .execute(&pool)
            .await
            .unwrap();

        assert!(TeamPolicy.can_read(&pool, &team, &member).await.unwrap());
        assert!(!TeamPolicy.can_modify(&pool, &team, &member).await.unwrap());
        assert!(TeamPolicy.can_modify(&pool, &team, &owner).await.unwrap());
    }
}
