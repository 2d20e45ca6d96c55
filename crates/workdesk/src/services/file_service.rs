//! File service - file metadata and the per-user quota ledger
//!
//! Every mutation that changes the set of live files adjusts
//! `users.quota_used` by a relative update in the same transaction, so a
//! file's size is counted exactly once while it is live.

use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::config::CoreConfig;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{
    CreateFileRequest, DownloadUrl, ListFilesQuery, PaginatedResponse, Pagination, StorageInfo,
    StoredFile,
};
use crate::security::{
    non_blank, require_owner, require_read, validate_entry_name, OwnedResource, OwnerOnly,
};
use crate::services::FolderService;

const DEFAULT_LIMIT: u32 = 20;
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const FILE_COLUMNS: &str = "id, name, path, mime_type, size, thumbnail, folder_id, owner_id, \
                            team_id, is_favorite, created_at, updated_at";

/// File service
pub struct FileService {
    config: CoreConfig,
}

impl FileService {
    pub fn new(config: CoreConfig) -> Self {
        Self { config }
    }

    fn push_filters(
        builder: &mut QueryBuilder<'_, Sqlite>,
        owner_id: &str,
        query: &ListFilesQuery,
    ) {
        builder
            .push(" WHERE is_deleted = 0 AND owner_id = ")
            .push_bind(owner_id.to_string());

        if let Some(folder_id) = non_blank(query.folder_id.clone()) {
            builder.push(" AND folder_id = ").push_bind(folder_id);
        }
        if let Some(path) = non_blank(query.path.clone()) {
            builder
                .push(" AND path LIKE ")
                .push_bind(format!("{}%", db::escape_like(&path)))
                .push(" ESCAPE '\\'");
        }
        if let Some(prefix) = non_blank(query.mime_prefix.clone()) {
            builder
                .push(" AND mime_type LIKE ")
                .push_bind(format!("{}%", db::escape_like(&prefix)))
                .push(" ESCAPE '\\'");
        }
        if let Some(search) = non_blank(query.search.clone()) {
            builder
                .push(" AND name LIKE ")
                .push_bind(format!("%{}%", db::escape_like(&search)))
                .push(" ESCAPE '\\'");
        }
    }

    /// Newest first
    pub async fn list(
        &self,
        pool: &SqlitePool,
        owner_id: &str,
        query: &ListFilesQuery,
    ) -> AppResult<PaginatedResponse<StoredFile>> {
        let page = Pagination::new(query.page, query.limit, DEFAULT_LIMIT);

        let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM files");
        Self::push_filters(&mut count, owner_id, query);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM files", FILE_COLUMNS));
        Self::push_filters(&mut select, owner_id, query);
        select
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = select.build_query_as::<StoredFile>().fetch_all(pool).await?;

        Ok(PaginatedResponse::new(items, total as u64, page.page, page.limit))
    }

    /// Get an owned, live file
    pub async fn get(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<StoredFile> {
        require_read(&OwnerOnly(OwnedResource::File), pool, id, user_id).await?;
        self.fetch(pool, id).await
    }

    async fn fetch(&self, pool: &SqlitePool, id: &str) -> AppResult<StoredFile> {
        let sql = format!("SELECT {} FROM files WHERE id = ? AND is_deleted = 0", FILE_COLUMNS);
        sqlx::query_as::<_, StoredFile>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("File", id))
    }

    /// Record uploaded file metadata and charge its size
    pub async fn create(
        &self,
        pool: &SqlitePool,
        owner_id: &str,
        request: CreateFileRequest,
    ) -> AppResult<StoredFile> {
        let name = validate_entry_name(&request.name, "File")?;
        if request.size < 0 {
            return Err(AppError::Validation("File size cannot be negative".to_string()));
        }

        let folder_id = non_blank(request.folder_id);
        let path = match folder_id.as_deref() {
            Some(folder_id) => FolderService::new().get(pool, folder_id, owner_id).await?.path,
            None => non_blank(request.path).unwrap_or_else(|| "/".to_string()),
        };
        let mime_type =
            non_blank(request.mime_type).unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        let id = new_id();
        let now = db::now();
        let mut tx = pool.begin().await?;
        self.charge(&mut tx, owner_id, request.size).await?;
        sqlx::query(
            r#"
            INSERT INTO files (id, name, path, mime_type, size, thumbnail, folder_id, owner_id, team_id,
                               is_favorite, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&name)
        .bind(&path)
        .bind(&mime_type)
        .bind(request.size)
        .bind(&request.thumbnail)
        .bind(&folder_id)
        .bind(owner_id)
        .bind(non_blank(request.team_id))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(file_id = %id, owner_id = %owner_id, size = request.size, "File created");
        self.fetch(pool, &id).await
    }

    pub async fn rename(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        new_name: &str,
    ) -> AppResult<StoredFile> {
        let name = validate_entry_name(new_name, "File")?;
        require_owner(pool, OwnedResource::File, id, user_id, "rename file").await?;

        sqlx::query("UPDATE files SET name = ?, updated_at = ? WHERE id = ?")
            .bind(&name)
            .bind(db::now())
            .bind(id)
            .execute(pool)
            .await?;
        self.fetch(pool, id).await
    }

    /// File into an owned folder, or back to the root
    pub async fn move_to(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        folder_id: Option<&str>,
    ) -> AppResult<StoredFile> {
        require_owner(pool, OwnedResource::File, id, user_id, "move file").await?;

        let path = match folder_id {
            Some(folder_id) => FolderService::new().get(pool, folder_id, user_id).await?.path,
            None => "/".to_string(),
        };

        sqlx::query("UPDATE files SET folder_id = ?, path = ?, updated_at = ? WHERE id = ?")
            .bind(folder_id)
            .bind(&path)
            .bind(db::now())
            .bind(id)
            .execute(pool)
            .await?;

        info!(file_id = %id, path = %path, "File moved");
        self.fetch(pool, id).await
    }

    /// Duplicate a file's metadata; the copy is charged like an upload
    pub async fn copy(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<StoredFile> {
        let source = self.get(pool, id, user_id).await?;

        let copy_id = new_id();
        let now = db::now();
        let mut tx = pool.begin().await?;
        self.charge(&mut tx, user_id, source.size).await?;
        sqlx::query(
            r#"
            INSERT INTO files (id, name, path, mime_type, size, thumbnail, folder_id, owner_id, team_id,
                               is_favorite, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&copy_id)
        .bind(format!("{} (copy)", source.name))
        .bind(&source.path)
        .bind(&source.mime_type)
        .bind(source.size)
        .bind(&source.thumbnail)
        .bind(&source.folder_id)
        .bind(user_id)
        .bind(&source.team_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(file_id = %copy_id, source_id = %id, size = source.size, "File copied");
        self.fetch(pool, &copy_id).await
    }

    pub async fn toggle_favorite(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> AppResult<StoredFile> {
        require_owner(pool, OwnedResource::File, id, user_id, "favorite file").await?;

        sqlx::query("UPDATE files SET is_favorite = NOT is_favorite, updated_at = ? WHERE id = ?")
            .bind(db::now())
            .bind(id)
            .execute(pool)
            .await?;
        self.fetch(pool, id).await
    }

    pub async fn download_url(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> AppResult<DownloadUrl> {
        require_read(&OwnerOnly(OwnedResource::File), pool, id, user_id).await?;
        Ok(DownloadUrl {
            url: format!("{}/{}/download", self.config.download_url_prefix, id),
        })
    }

    /// Soft delete and release the file's size
    pub async fn delete(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<()> {
        require_owner(pool, OwnedResource::File, id, user_id, "delete file").await?;

        let mut tx = pool.begin().await?;
        // Only the call that flips the flag gets a size back
        let size: Option<i64> = sqlx::query_scalar(
            "UPDATE files SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0 RETURNING size",
        )
        .bind(db::now())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let size = size.ok_or_else(|| AppError::not_found("File", id))?;
        self.discharge(&mut tx, user_id, size).await?;
        tx.commit().await?;

        info!(file_id = %id, owner_id = %user_id, size, "File deleted");
        Ok(())
    }

    /// Delete those of `ids` the requester owns; returns how many were removed
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
            QueryBuilder::new("UPDATE files SET is_deleted = 1, updated_at = ");
        builder
            .push_bind(db::now())
            .push(" WHERE is_deleted = 0 AND owner_id = ")
            .push_bind(user_id.to_string())
            .push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(") RETURNING size");

        let mut tx = pool.begin().await?;
        let sizes: Vec<i64> = builder.build_query_scalar().fetch_all(&mut *tx).await?;
        let released: i64 = sizes.iter().sum();
        if !sizes.is_empty() {
            self.discharge(&mut tx, user_id, released).await?;
        }
        tx.commit().await?;

        info!(owner_id = %user_id, count = sizes.len(), released, "Files batch deleted");
        Ok(sizes.len() as u64)
    }

    pub async fn storage_info(&self, pool: &SqlitePool, user_id: &str) -> AppResult<StorageInfo> {
        let used: i64 =
            sqlx::query_scalar("SELECT quota_used FROM users WHERE id = ? AND is_deleted = 0")
                .bind(user_id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::not_found("User", user_id))?;
        Ok(StorageInfo::new(used, self.config.storage_quota_bytes))
    }

    /// Add `size` to the owner's counter unless that would pass the quota
    async fn charge(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
        size: i64,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET quota_used = quota_used + ? WHERE id = ? AND is_deleted = 0 AND quota_used + ? <= ?",
        )
        .bind(size)
        .bind(user_id)
        .bind(size)
        .bind(self.config.storage_quota_bytes)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ? AND is_deleted = 0")
                .bind(user_id)
                .fetch_one(&mut **tx)
                .await?;
        if exists == 0 {
            Err(AppError::not_found("User", user_id))
        } else {
            Err(AppError::Validation("Storage quota exceeded".to_string()))
        }
    }

    async fn discharge(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
        size: i64,
    ) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET quota_used = quota_used - ? WHERE id = ?")
            .bind(size)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() != 1 {
            return Err(AppError::not_found("User", user_id));
        }
        Ok(())
    }
}

impl Default for FileService {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateFolderRequest;
    use crate::test_support::{quota_used, seed_user};
    use crate::db::connect_in_memory;

    fn upload(name: &str, size: i64) -> CreateFileRequest {
        CreateFileRequest {
            name: name.to_string(),
            mime_type: Some("text/plain".to_string()),
            size,
            folder_id: None,
            team_id: None,
            path: None,
            thumbnail: None,
        }
    }

    #[tokio::test]
    async fn test_concurrent_uploads_accumulate() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let service = FileService::default();

        let (a, b) = tokio::join!(
            service.create(&pool, &owner, upload("a.txt", 100)),
            service.create(&pool, &owner, upload("b.txt", 200)),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(quota_used(&pool, &owner).await, 300);

        let info = service.storage_info(&pool, &owner).await.unwrap();
        assert_eq!(info.used, 300);
        assert_eq!(info.available, CoreConfig::default().storage_quota_bytes - 300);
    }

    async fn file_backed_pool(dir: &tempfile::TempDir) -> SqlitePool {
        let url = format!("sqlite://{}", dir.path().join("workdesk.db").display());
        let pool = db::connect(&url, 8).await.unwrap();
        crate::migrations::run_migration(&pool).await.unwrap();
        pool
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_uploads_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_backed_pool(&dir).await;
        let owner = seed_user(&pool, "owner").await;
        let service = std::sync::Arc::new(FileService::default());

        let mut handles = Vec::new();
        for i in 0..40 {
            let (pool, owner, service) = (pool.clone(), owner.clone(), service.clone());
            handles.push(tokio::spawn(async move {
                service.create(&pool, &owner, upload(&format!("f{i}.txt"), 10)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(quota_used(&pool, &owner).await, 400);
        let listed = service.list(&pool, &owner, &ListFilesQuery::default()).await.unwrap();
        assert_eq!(listed.total, 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_uploads_stop_at_quota() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_backed_pool(&dir).await;
        let owner = seed_user(&pool, "owner").await;
        let service =
            std::sync::Arc::new(FileService::new(CoreConfig::default().with_storage_quota(250)));

        let mut handles = Vec::new();
        for i in 0..40 {
            let (pool, owner, service) = (pool.clone(), owner.clone(), service.clone());
            handles.push(tokio::spawn(async move {
                service.create(&pool, &owner, upload(&format!("f{i}.txt"), 10)).await
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(err) => assert!(matches!(err, AppError::Validation(_))),
            }
        }

        assert_eq!(accepted, 25);
        assert_eq!(quota_used(&pool, &owner).await, 250);
    }

    #[tokio::test]
    async fn test_delete_discharges_once() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let service = FileService::default();

        let keep = service.create(&pool, &owner, upload("keep.txt", 40)).await.unwrap();
        let file = service.create(&pool, &owner, upload("drop.txt", 60)).await.unwrap();
        service.delete(&pool, &file.id, &owner).await.unwrap();
        assert_eq!(quota_used(&pool, &owner).await, 40);

        assert!(service.delete(&pool, &file.id, &owner).await.is_err());
        assert_eq!(quota_used(&pool, &owner).await, 40);
        assert!(service.get(&pool, &keep.id, &owner).await.is_ok());
    }

    #[tokio::test]
    async fn test_batch_delete_skips_foreign_files() {
        let pool = connect_in_memory().await.unwrap();
        let alice = seed_user(&pool, "alice").await;
        let bob = seed_user(&pool, "bob").await;
        let service = FileService::default();

        let a1 = service.create(&pool, &alice, upload("a1", 10)).await.unwrap();
        let a2 = service.create(&pool, &alice, upload("a2", 20)).await.unwrap();
        let b1 = service.create(&pool, &bob, upload("b1", 30)).await.unwrap();

        let ids = vec![a1.id.clone(), a2.id.clone(), b1.id.clone(), "missing".to_string()];
        let removed = service.batch_delete(&pool, &ids, &alice).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(quota_used(&pool, &alice).await, 0);
        assert_eq!(quota_used(&pool, &bob).await, 30);
        assert!(service.get(&pool, &b1.id, &bob).await.is_ok());

        // Already-deleted ids release nothing the second time
        assert_eq!(service.batch_delete(&pool, &ids, &alice).await.unwrap(), 0);
        assert_eq!(quota_used(&pool, &alice).await, 0);
    }

    #[tokio::test]
    async fn test_quota_ceiling_rolls_back() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let service = FileService::new(CoreConfig::default().with_storage_quota(100));

        service.create(&pool, &owner, upload("fits", 80)).await.unwrap();
        let err = service.create(&pool, &owner, upload("too-big", 30)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(quota_used(&pool, &owner).await, 80);

        let listed = service.list(&pool, &owner, &ListFilesQuery::default()).await.unwrap();
        assert_eq!(listed.total, 1);
    }

    #[tokio::test]
    async fn test_copy_charges_quota() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let service = FileService::default();

        let file = service.create(&pool, &owner, upload("notes.txt", 25)).await.unwrap();
        let copy = service.copy(&pool, &file.id, &owner).await.unwrap();
        assert_eq!(copy.name, "notes.txt (copy)");
        assert_ne!(copy.id, file.id);
        assert_eq!(quota_used(&pool, &owner).await, 50);
    }

    #[tokio::test]
    async fn test_move_favorite_and_filters() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let other = seed_user(&pool, "other").await;
        let service = FileService::default();
        let folders = FolderService::new();

        let folder = folders
            .create(
                &pool,
                CreateFolderRequest {
                    name: "Photos".to_string(),
                    parent_id: None,
                    team_id: None,
                },
                &owner,
            )
            .await
            .unwrap();
        let mut image = upload("cat.png", 5);
        image.mime_type = Some("image/png".to_string());
        let image = service.create(&pool, &owner, image).await.unwrap();
        service.create(&pool, &owner, upload("todo.txt", 5)).await.unwrap();

        let moved = service.move_to(&pool, &image.id, &owner, Some(&folder.id)).await.unwrap();
        assert_eq!(moved.path, "/Photos");
        assert_eq!(moved.folder_id.as_deref(), Some(folder.id.as_str()));

        // Folder renames re-point the files filed in them
        folders.rename(&pool, &folder.id, &owner, "Pictures").await.unwrap();
        assert_eq!(service.get(&pool, &image.id, &owner).await.unwrap().path, "/Pictures");

        let starred = service.toggle_favorite(&pool, &image.id, &owner).await.unwrap();
        assert!(starred.is_favorite);
        assert!(!service.toggle_favorite(&pool, &image.id, &owner).await.unwrap().is_favorite);

        let query = ListFilesQuery {
            mime_prefix: Some("image/".to_string()),
            ..Default::default()
        };
        let images = service.list(&pool, &owner, &query).await.unwrap();
        assert_eq!(images.total, 1);
        assert_eq!(images.items[0].id, image.id);

        let err = service.move_to(&pool, &image.id, &other, None).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
        let err = service.download_url(&pool, &image.id, &other).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        let url = service.download_url(&pool, &image.id, &owner).await.unwrap();
        assert_eq!(url.url, format!("/api/files/{}/download", image.id));
    }
}
