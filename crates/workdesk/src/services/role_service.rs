//! Role service - roles, their permission sets and user assignments

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use validator::Validate;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{CreateRoleRequest, Permission, Role, RoleDetail, UpdateRoleRequest};
use crate::security::non_blank;

const ROLE_COLUMNS: &str = "id, name, label, description, created_at, updated_at";

/// Role service
pub struct RoleService;

impl RoleService {
    pub fn new() -> Self {
        Self
    }

    pub async fn list(&self, pool: &SqlitePool) -> AppResult<Vec<Role>> {
        let sql = format!("SELECT {} FROM roles ORDER BY name", ROLE_COLUMNS);
        let roles = sqlx::query_as::<_, Role>(&sql).fetch_all(pool).await?;
        Ok(roles)
    }

    async fn fetch(&self, pool: &SqlitePool, id: &str) -> AppResult<Role> {
        let sql = format!("SELECT {} FROM roles WHERE id = ?", ROLE_COLUMNS);
        sqlx::query_as::<_, Role>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Role", id))
    }

    /// Role with its permissions
    pub async fn get(&self, pool: &SqlitePool, id: &str) -> AppResult<RoleDetail> {
        let role = self.fetch(pool, id).await?;
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.id, p.action, p.resource, p.description, p.created_at, p.updated_at
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = ?
            ORDER BY p.action
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(RoleDetail { role, permissions })
    }

    pub async fn create(&self, pool: &SqlitePool, request: CreateRoleRequest) -> AppResult<Role> {
        request.validate()?;

        let id = new_id();
        let now = db::now();
        sqlx::query(
            "INSERT INTO roles (id, name, label, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(request.name.trim())
        .bind(request.label.trim())
        .bind(&request.description)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Role already exists: {}", request.name))
            }
            other => other,
        })?;

        info!(role_id = %id, name = %request.name, "Role created");
        self.fetch(pool, &id).await
    }

    /// Partial update; blank fields keep their values
    pub async fn update(
        &self,
        pool: &SqlitePool,
        id: &str,
        request: UpdateRoleRequest,
    ) -> AppResult<Role> {
        let request = UpdateRoleRequest {
            name: non_blank(request.name).map(|n| n.trim().to_string()),
            label: non_blank(request.label).map(|l| l.trim().to_string()),
            description: non_blank(request.description),
        };
        request.validate()?;
        self.fetch(pool, id).await?;

        sqlx::query(
            r#"
            UPDATE roles SET
                name = COALESCE(?, name),
                label = COALESCE(?, label),
                description = COALESCE(?, description),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(request.name)
        .bind(request.label)
        .bind(request.description)
        .bind(db::now())
        .bind(id)
        .execute(pool)
        .await?;

        self.fetch(pool, id).await
    }

    /// Assignments to permissions and users go with the role
    pub async fn delete(&self, pool: &SqlitePool, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Role", id));
        }
        info!(role_id = %id, "Role deleted");
        Ok(())
    }

    /// Replace the permission set of a role in one transaction
    pub async fn assign_permissions(
        &self,
        pool: &SqlitePool,
        id: &str,
        permission_ids: &[String],
    ) -> AppResult<RoleDetail> {
        self.fetch(pool, id).await?;

        let now = db::now();
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for permission_id in permission_ids {
            ensure_exists(&mut tx, "permissions", "Permission", permission_id).await?;
            sqlx::query(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(permission_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(role_id = %id, count = permission_ids.len(), "Role permissions replaced");
        self.get(pool, id).await
    }

    /// Replace the roles held by a user in one transaction
    pub async fn assign_to_user(
        &self,
        pool: &SqlitePool,
        user_id: &str,
        role_ids: &[String],
    ) -> AppResult<Vec<Role>> {
        let now = db::now();
        let mut tx = pool.begin().await?;
        let live: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ? AND is_deleted = 0")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
        if live == 0 {
            return Err(AppError::not_found("User", user_id));
        }

        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        for role_id in role_ids {
            ensure_exists(&mut tx, "roles", "Role", role_id).await?;
            sqlx::query(
                "INSERT OR IGNORE INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(role_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(user_id = %user_id, count = role_ids.len(), "User roles replaced");
        self.roles_of(pool, user_id).await
    }

    pub async fn roles_of(&self, pool: &SqlitePool, user_id: &str) -> AppResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name, r.label, r.description, r.created_at, r.updated_at
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ?
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(roles)
    }
}

impl Default for RoleService {
    fn default() -> Self {
        Self::new()
    }
}

async fn ensure_exists(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    resource: &'static str,
    id: &str,
) -> AppResult<()> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table);
    let count: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(&mut **tx).await?;
    if count == 0 {
        return Err(AppError::not_found(resource, id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::models::CreatePermissionRequest;
    use crate::services::PermissionService;
    use crate::test_support::seed_user;

    fn role(name: &str) -> CreateRoleRequest {
        CreateRoleRequest {
            name: name.to_string(),
            label: name.to_uppercase(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_role_crud_and_conflict() {
        let pool = connect_in_memory().await.unwrap();
        let service = RoleService::new();

        let admin = service.create(&pool, role("admin")).await.unwrap();
        let err = service.create(&pool, role("admin")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let update = UpdateRoleRequest {
            label: Some("Administrator".to_string()),
            ..Default::default()
        };
        let updated = service.update(&pool, &admin.id, update).await.unwrap();
        assert_eq!(updated.label, "Administrator");
        assert_eq!(updated.name, "admin");

        let blank = UpdateRoleRequest {
            name: Some("".to_string()),
            label: Some("  ".to_string()),
            description: Some("".to_string()),
        };
        let unchanged = service.update(&pool, &admin.id, blank).await.unwrap();
        assert_eq!(unchanged.name, "admin");
        assert_eq!(unchanged.label, "Administrator");

        service.delete(&pool, &admin.id).await.unwrap();
        let err = service.delete(&pool, &admin.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_permission_set_is_replaced() {
        let pool = connect_in_memory().await.unwrap();
        let service = RoleService::new();
        let permissions = PermissionService::new();

        let editor = service.create(&pool, role("editor")).await.unwrap();
        let mut ids = Vec::new();
        for action in ["documents:read", "documents:write", "files:read"] {
            let permission = permissions
                .create(
                    &pool,
                    CreatePermissionRequest {
                        action: action.to_string(),
                        resource: action.split(':').next().unwrap().to_string(),
                        description: None,
                    },
                )
                .await
                .unwrap();
            ids.push(permission.id);
        }

        let detail = service.assign_permissions(&pool, &editor.id, &ids[..2]).await.unwrap();
        assert_eq!(detail.permissions.len(), 2);
        let detail = service.assign_permissions(&pool, &editor.id, &ids[2..]).await.unwrap();
        assert_eq!(detail.permissions.len(), 1);
        assert_eq!(detail.permissions[0].action, "files:read");

        // An unknown id aborts the whole replacement
        let err = service
            .assign_permissions(&pool, &editor.id, &[ids[0].clone(), "missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        assert_eq!(service.get(&pool, &editor.id).await.unwrap().permissions.len(), 1);
    }

    #[tokio::test]
    async fn test_user_role_assignment() {
        let pool = connect_in_memory().await.unwrap();
        let user = seed_user(&pool, "ada").await;
        let service = RoleService::new();

        let admin = service.create(&pool, role("admin")).await.unwrap();
        let viewer = service.create(&pool, role("viewer")).await.unwrap();

        let roles = service
            .assign_to_user(&pool, &user, &[admin.id.clone(), viewer.id.clone()])
            .await
            .unwrap();
        assert_eq!(roles.len(), 2);

        service.delete(&pool, &viewer.id).await.unwrap();
        let roles = service.roles_of(&pool, &user).await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, "admin");

        let err = service.assign_to_user(&pool, "missing", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { resource: "User", .. }));
    }
}
