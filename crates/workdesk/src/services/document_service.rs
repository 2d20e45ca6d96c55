//! Document service - business logic for documents and their tags

use std::collections::HashSet;

use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{
    CreateDocumentRequest, Document, DocumentView, ListDocumentsQuery, PaginatedResponse,
    Pagination, UpdateDocumentRequest,
};
use crate::security::access::push_document_visibility;
use crate::security::{
    non_blank, require_owner, require_read, require_text, DocumentPolicy, OwnedResource, TeamPolicy,
};
use crate::services::ShareService;

const DEFAULT_LIMIT: u32 = 10;
const DEFAULT_DOC_TYPE: &str = "doc";

const DOCUMENT_COLUMNS: &str = "d.id, d.title, d.content, d.folder, d.doc_type, d.size, d.views, \
                                d.owner_id, d.team_id, d.created_at, d.updated_at";

/// Trimmed, non-empty, first occurrence wins
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Document service
pub struct DocumentService;

impl DocumentService {
    pub fn new() -> Self {
        Self
    }

    fn push_filters(
        builder: &mut QueryBuilder<'_, Sqlite>,
        user_id: &str,
        now: &str,
        query: &ListDocumentsQuery,
    ) {
        builder.push(" WHERE d.is_deleted = 0 AND ");
        push_document_visibility(builder, user_id, now);

        if let Some(search) = non_blank(query.search.clone()) {
            let pattern = format!("%{}%", db::escape_like(&search));
            builder
                .push(" AND (d.title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR d.content LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(folder) = non_blank(query.folder.clone()) {
            builder.push(" AND d.folder = ").push_bind(folder);
        }
        let tags = query.tag_list();
        if !tags.is_empty() {
            builder.push(
                " AND d.id IN (SELECT dt.document_id FROM document_tags dt \
                 JOIN tags t ON t.id = dt.tag_id WHERE t.name IN (",
            );
            let mut separated = builder.separated(", ");
            for tag in tags {
                separated.push_bind(tag);
            }
            separated.push_unseparated("))");
        }
    }

    /// Owned documents plus those reachable through an active share
    pub async fn list(
        &self,
        pool: &SqlitePool,
        user_id: &str,
        query: &ListDocumentsQuery,
    ) -> AppResult<PaginatedResponse<DocumentView>> {
        let page = Pagination::new(query.page, query.limit, DEFAULT_LIMIT);
        let now = db::now();

        let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM documents d");
        Self::push_filters(&mut count, user_id, &now, query);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM documents d", DOCUMENT_COLUMNS));
        Self::push_filters(&mut select, user_id, &now, query);
        select
            .push(" ORDER BY d.updated_at DESC, d.rowid DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let documents = select.build_query_as::<Document>().fetch_all(pool).await?;

        let mut items = Vec::with_capacity(documents.len());
        for document in documents {
            let tags = self.tags_of(pool, &document.id).await?;
            items.push(DocumentView {
                document,
                tags,
                shares: None,
            });
        }
        Ok(PaginatedResponse::new(items, total as u64, page.page, page.limit))
    }

    async fn fetch(&self, pool: &SqlitePool, id: &str) -> AppResult<Document> {
        let sql = format!(
            "SELECT {} FROM documents d WHERE d.id = ? AND d.is_deleted = 0",
            DOCUMENT_COLUMNS
        );
        sqlx::query_as::<_, Document>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Document", id))
    }

    async fn tags_of(&self, pool: &SqlitePool, id: &str) -> AppResult<Vec<String>> {
        let tags = sqlx::query_scalar(
            r#"
            SELECT t.name FROM tags t
            JOIN document_tags dt ON dt.tag_id = t.id
            WHERE dt.document_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(tags)
    }

    async fn view(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<DocumentView> {
        let document = self.fetch(pool, id).await?;
        let tags = self.tags_of(pool, id).await?;
        let shares = if document.owner_id == user_id {
            Some(ShareService::new().shares_of(pool, id).await?)
        } else {
            None
        };
        Ok(DocumentView {
            document,
            tags,
            shares,
        })
    }

    /// Read a document and count the view; hidden documents are `NotFound`
    pub async fn get(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<DocumentView> {
        require_read(&DocumentPolicy, pool, id, user_id).await?;

        sqlx::query("UPDATE documents SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        self.view(pool, id, user_id).await
    }

    pub async fn create(
        &self,
        pool: &SqlitePool,
        request: CreateDocumentRequest,
        owner_id: &str,
    ) -> AppResult<DocumentView> {
        let title = require_text(&request.title, "title")?;
        let team_id = non_blank(request.team_id);
        if let Some(team_id) = team_id.as_deref() {
            require_read(&TeamPolicy, pool, team_id, owner_id).await?;
        }
        let doc_type = non_blank(request.doc_type).unwrap_or_else(|| DEFAULT_DOC_TYPE.to_string());

        let id = new_id();
        let now = db::now();
        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, folder, doc_type, size, views, owner_id, team_id,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&title)
        .bind(&request.content)
        .bind(non_blank(request.folder))
        .bind(&doc_type)
        .bind(request.content.len() as i64)
        .bind(owner_id)
        .bind(&team_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        replace_tags(&mut tx, &id, &normalize_tags(&request.tags), &now).await?;
        tx.commit().await?;

        info!(document_id = %id, owner_id = %owner_id, "Document created");
        self.view(pool, &id, owner_id).await
    }

    /// Partial update by the owner; absent fields keep their values
    pub async fn update(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        request: UpdateDocumentRequest,
    ) -> AppResult<DocumentView> {
        require_owner(pool, OwnedResource::Document, id, user_id, "update document").await?;

        let title = non_blank(request.title).map(|t| t.trim().to_string());
        let content = non_blank(request.content);
        let size = content.as_ref().map(|c| c.len() as i64);
        sqlx::query(
            r#"
            UPDATE documents SET
                title = COALESCE(?, title),
                content = COALESCE(?, content),
                size = COALESCE(?, size),
                folder = COALESCE(?, folder),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(size)
        .bind(non_blank(request.folder))
        .bind(db::now())
        .bind(id)
        .execute(pool)
        .await?;

        self.view(pool, id, user_id).await
    }

    pub async fn rename(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        title: String,
    ) -> AppResult<DocumentView> {
        let title = require_text(&title, "title")?;
        let request = UpdateDocumentRequest {
            title: Some(title),
            ..Default::default()
        };
        self.update(pool, id, user_id, request).await
    }

    /// Re-file under another folder label
    pub async fn move_to(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        folder: String,
    ) -> AppResult<DocumentView> {
        let folder = require_text(&folder, "folder")?;
        let request = UpdateDocumentRequest {
            folder: Some(folder),
            ..Default::default()
        };
        self.update(pool, id, user_id, request).await
    }

    /// Replace the tag set in one transaction
    pub async fn update_tags(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        tags: &[String],
    ) -> AppResult<DocumentView> {
        require_owner(pool, OwnedResource::Document, id, user_id, "tag document").await?;

        let now = db::now();
        let mut tx = pool.begin().await?;
        replace_tags(&mut tx, id, &normalize_tags(tags), &now).await?;
        sqlx::query("UPDATE documents SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.view(pool, id, user_id).await
    }

    pub async fn delete(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<()> {
        require_owner(pool, OwnedResource::Document, id, user_id, "delete document").await?;

        sqlx::query("UPDATE documents SET is_deleted = 1, updated_at = ? WHERE id = ?")
            .bind(db::now())
            .bind(id)
            .execute(pool)
            .await?;

        info!(document_id = %id, "Document deleted");
        Ok(())
    }

    /// Soft delete the requester's own documents among `ids`
    pub async fn batch_delete(
        &self,
        pool: &SqlitePool,
        ids: &[String],
        user_id: &str,
    ) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE documents SET is_deleted = 1, updated_at = ");
        builder
            .push_bind(db::now())
            .push(" WHERE is_deleted = 0 AND owner_id = ")
            .push_bind(user_id.to_string())
            .push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(pool).await?;
        info!(owner_id = %user_id, count = result.rows_affected(), "Documents batch deleted");
        Ok(result.rows_affected())
    }
}

impl Default for DocumentService {
    fn default() -> Self {
        Self::new()
    }
}

async fn replace_tags(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: &str,
    tags: &[String],
    now: &str,
) -> AppResult<()> {
    sqlx::query("DELETE FROM document_tags WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut **tx)
        .await?;

    for name in tags {
        sqlx::query("INSERT OR IGNORE INTO tags (id, name, created_at) VALUES (?, ?, ?)")
            .bind(new_id())
            .bind(name)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        let tag_id: String = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;
        sqlx::query(
            "INSERT OR IGNORE INTO document_tags (document_id, tag_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(document_id)
        .bind(&tag_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
