//! Permission service

use sqlx::SqlitePool;
use tracing::info;
use validator::Validate;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{CreatePermissionRequest, Permission};

const PERMISSION_COLUMNS: &str = "id, action, resource, description, created_at, updated_at";

/// Permission service
pub struct PermissionService;

impl PermissionService {
    pub fn new() -> Self {
        Self
    }

    pub async fn list(&self, pool: &SqlitePool) -> AppResult<Vec<Permission>> {
        let sql = format!(
            "SELECT {} FROM permissions ORDER BY resource, action",
            PERMISSION_COLUMNS
        );
        let permissions = sqlx::query_as::<_, Permission>(&sql).fetch_all(pool).await?;
        Ok(permissions)
    }

    pub async fn get(&self, pool: &SqlitePool, id: &str) -> AppResult<Permission> {
        let sql = format!("SELECT {} FROM permissions WHERE id = ?", PERMISSION_COLUMNS);
        sqlx::query_as::<_, Permission>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Permission", id))
    }

    /// Actions are unique
    pub async fn create(
        &self,
        pool: &SqlitePool,
        request: CreatePermissionRequest,
    ) -> AppResult<Permission> {
        request.validate()?;

        let id = new_id();
        let now = db::now();
        sqlx::query(
            "INSERT INTO permissions (id, action, resource, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(request.action.trim())
        .bind(request.resource.trim())
        .bind(&request.description)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Permission already exists: {}", request.action))
            }
            other => other,
        })?;

        info!(permission_id = %id, action = %request.action, "Permission created");
        self.get(pool, &id).await
    }

    pub async fn delete(&self, pool: &SqlitePool, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Permission", id));
        }
        Ok(())
    }
}

impl Default for PermissionService {
    fn default() -> Self {
        Self::new()
    }
}
