//! Share service - the document sharing ledger
//!
//! At most one grant exists per (document, grantee). Granting again replaces
//! the permission and expiry in place; revoking something that was never
//! granted is not an error. Expiry is evaluated when access is checked.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{DocumentShare, NewNotification, ShareDocumentRequest, ShareTarget};
use crate::security::{require_owner, OwnedResource};
use crate::services::NotificationService;

const SHARE_COLUMNS: &str =
    "id, document_id, shared_with_id, team_id, permission, expires_at, created_at";

/// Share service
pub struct ShareService;

impl ShareService {
    pub fn new() -> Self {
        Self
    }

    /// Grant or update access to a document
    pub async fn share(
        &self,
        pool: &SqlitePool,
        document_id: &str,
        owner_id: &str,
        request: ShareDocumentRequest,
    ) -> AppResult<DocumentShare> {
        let target = ShareTarget::from_parts(request.user_id, request.team_id)?;
        if let Some(expires_at) = request.expires_at {
            if expires_at <= Utc::now() {
                return Err(AppError::Validation("expiresAt must be in the future".to_string()));
            }
        }
        require_owner(
            pool,
            OwnedResource::Document,
            document_id,
            owner_id,
            "share document",
        )
        .await?;

        let permission = request.permission.unwrap_or_default();
        let expires_at = request.expires_at.map(db::timestamp);
        let now = db::now();

        let share = match &target {
            ShareTarget::User(user_id) => {
                if user_id == owner_id {
                    return Err(AppError::Validation(
                        "Cannot share a document with its owner".to_string(),
                    ));
                }
                ensure_live(pool, "users", "User", user_id).await?;
                sqlx::query(
                    r#"
                    INSERT INTO document_shares (id, document_id, shared_with_id, permission, expires_at, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(document_id, shared_with_id)
                    DO UPDATE SET permission = excluded.permission, expires_at = excluded.expires_at
                    "#,
                )
                .bind(new_id())
                .bind(document_id)
                .bind(user_id)
                .bind(permission)
                .bind(&expires_at)
                .bind(&now)
                .execute(pool)
                .await?;

                let sql = format!(
                    "SELECT {} FROM document_shares WHERE document_id = ? AND shared_with_id = ?",
                    SHARE_COLUMNS
                );
                sqlx::query_as::<_, DocumentShare>(&sql)
                    .bind(document_id)
                    .bind(user_id)
                    .fetch_one(pool)
                    .await?
            }
            ShareTarget::Team(team_id) => {
                ensure_live(pool, "teams", "Team", team_id).await?;
                sqlx::query(
                    r#"
                    INSERT INTO document_shares (id, document_id, team_id, permission, expires_at, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(document_id, team_id)
                    DO UPDATE SET permission = excluded.permission, expires_at = excluded.expires_at
                    "#,
                )
                .bind(new_id())
                .bind(document_id)
                .bind(team_id)
                .bind(permission)
                .bind(&expires_at)
                .bind(&now)
                .execute(pool)
                .await?;

                let sql = format!(
                    "SELECT {} FROM document_shares WHERE document_id = ? AND team_id = ?",
                    SHARE_COLUMNS
                );
                sqlx::query_as::<_, DocumentShare>(&sql)
                    .bind(document_id)
                    .bind(team_id)
                    .fetch_one(pool)
                    .await?
            }
        };

        info!(
            document_id = %document_id,
            target = ?target,
            permission = %share.permission,
            "Document shared"
        );

        if let ShareTarget::User(user_id) = &target {
            let note = NewNotification::new(
                user_id,
                "document_shared",
                "Document shared with you",
                format!("You were granted {} access to a document", share.permission),
            )
            .with_link(format!("/documents/{}", document_id))
            .with_payload(serde_json::json!({ "documentId": document_id, "sharedBy": owner_id }));
            if let Err(e) = NotificationService::new().notify(pool, note).await {
                warn!(document_id = %document_id, user_id = %user_id, error = %e, "Share notification failed");
            }
        }

        Ok(share)
    }

    /// Revoke a grant; returns whether one existed
    pub async fn unshare(
        &self,
        pool: &SqlitePool,
        document_id: &str,
        owner_id: &str,
        target: ShareTarget,
    ) -> AppResult<bool> {
        require_owner(
            pool,
            OwnedResource::Document,
            document_id,
            owner_id,
            "unshare document",
        )
        .await?;

        let result = match &target {
            ShareTarget::User(user_id) => {
                sqlx::query(
                    "DELETE FROM document_shares WHERE document_id = ? AND shared_with_id = ?",
                )
                .bind(document_id)
                .bind(user_id)
                .execute(pool)
                .await?
            }
            ShareTarget::Team(team_id) => {
                sqlx::query("DELETE FROM document_shares WHERE document_id = ? AND team_id = ?")
                    .bind(document_id)
                    .bind(team_id)
                    .execute(pool)
                    .await?
            }
        };

        let removed = result.rows_affected() > 0;
        info!(document_id = %document_id, target = ?target, removed, "Document unshared");
        Ok(removed)
    }

    /// All grants on a document, expired ones included
    pub async fn list_shares(
        &self,
        pool: &SqlitePool,
        document_id: &str,
        owner_id: &str,
    ) -> AppResult<Vec<DocumentShare>> {
        require_owner(
            pool,
            OwnedResource::Document,
            document_id,
            owner_id,
            "view document shares",
        )
        .await?;
        self.shares_of(pool, document_id).await
    }

    pub(crate) async fn shares_of(
        &self,
        pool: &SqlitePool,
        document_id: &str,
    ) -> AppResult<Vec<DocumentShare>> {
        let sql = format!(
            "SELECT {} FROM document_shares WHERE document_id = ? ORDER BY created_at, rowid",
            SHARE_COLUMNS
        );
        let shares = sqlx::query_as::<_, DocumentShare>(&sql)
            .bind(document_id)
            .fetch_all(pool)
            .await?;
        Ok(shares)
    }
}

impl Default for ShareService {
    fn default() -> Self {
        Self::new()
    }
}

async fn ensure_live(
    pool: &SqlitePool,
    table: &str,
    resource: &'static str,
    id: &str,
) -> AppResult<()> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ? AND is_deleted = 0", table);
    let count: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(pool).await?;
    if count == 0 {
        return Err(AppError::not_found(resource, id));
    }
    Ok(())
}
