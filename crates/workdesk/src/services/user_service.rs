//! User service - accounts and credentials

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;
use validator::Validate;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{
    CreateUserRequest, ListUsersQuery, PaginatedResponse, Pagination, UpdateUserRequest, User,
    UserStatus, USER_COLUMNS,
};
use crate::security::{hash_password, non_blank};

const DEFAULT_LIMIT: u32 = 20;

/// User service
pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        Self
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &ListUsersQuery) {
        builder.push(" WHERE is_deleted = 0");
        if let Some(search) = non_blank(query.search.clone()) {
            let pattern = format!("%{}%", db::escape_like(&search));
            builder
                .push(" AND (name LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR email LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR username LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
    }

    pub async fn list(
        &self,
        pool: &SqlitePool,
        query: &ListUsersQuery,
    ) -> AppResult<PaginatedResponse<User>> {
        let page = Pagination::new(query.page, query.limit, DEFAULT_LIMIT);

        let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM users");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM users", USER_COLUMNS));
        Self::push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = select.build_query_as::<User>().fetch_all(pool).await?;

        Ok(PaginatedResponse::new(items, total as u64, page.page, page.limit))
    }

    pub async fn get(&self, pool: &SqlitePool, id: &str) -> AppResult<User> {
        let sql = format!("SELECT {} FROM users WHERE id = ? AND is_deleted = 0", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))
    }

    /// Live account plus stored hash, looked up by email or username
    pub async fn find_credentials(
        &self,
        pool: &SqlitePool,
        login: &str,
    ) -> AppResult<Option<(User, String)>> {
        let id: Option<(String, String)> = sqlx::query_as(
            "SELECT id, password_hash FROM users WHERE (email = ? OR username = ?) AND is_deleted = 0",
        )
        .bind(login)
        .bind(login)
        .fetch_optional(pool)
        .await?;

        match id {
            Some((id, hash)) => Ok(Some((self.get(pool, &id).await?, hash))),
            None => Ok(None),
        }
    }

    pub async fn touch_last_login(&self, pool: &SqlitePool, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(db::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Email and username must be unique among live accounts
    pub async fn create(&self, pool: &SqlitePool, request: CreateUserRequest) -> AppResult<User> {
        request.validate()?;

        let password_hash = hash_password(&request.password)?;
        let username = request.username.trim().to_string();
        let name = non_blank(request.name).unwrap_or_else(|| username.clone());

        let id = new_id();
        let now = db::now();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, username, password_hash, name, phone, status, department, position,
                               quota_used, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(request.email.trim().to_lowercase())
        .bind(&username)
        .bind(&password_hash)
        .bind(&name)
        .bind(non_blank(request.phone))
        .bind(request.status.unwrap_or_default())
        .bind(non_blank(request.department))
        .bind(non_blank(request.position))
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict("Email or username already in use".to_string())
            }
            other => other,
        })?;

        info!(user_id = %id, username = %username, "User created");
        self.get(pool, &id).await
    }

    /// Partial update; a new password is re-hashed
    pub async fn update(
        &self,
        pool: &SqlitePool,
        id: &str,
        request: UpdateUserRequest,
    ) -> AppResult<User> {
        let request = UpdateUserRequest {
            email: non_blank(request.email).map(|e| e.trim().to_lowercase()),
            username: non_blank(request.username).map(|u| u.trim().to_string()),
            password: non_blank(request.password),
            name: non_blank(request.name),
            phone: non_blank(request.phone),
            avatar: non_blank(request.avatar),
            department: non_blank(request.department),
            position: non_blank(request.position),
            bio: non_blank(request.bio),
        };
        request.validate()?;
        self.get(pool, id).await?;

        let password_hash = match request.password.as_deref() {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };

        sqlx::query(
            r#"
            UPDATE users SET
                email = COALESCE(?, email),
                username = COALESCE(?, username),
                password_hash = COALESCE(?, password_hash),
                name = COALESCE(?, name),
                phone = COALESCE(?, phone),
                avatar = COALESCE(?, avatar),
                department = COALESCE(?, department),
                position = COALESCE(?, position),
                bio = COALESCE(?, bio),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(request.email)
        .bind(request.username)
        .bind(password_hash)
        .bind(request.name)
        .bind(request.phone)
        .bind(request.avatar)
        .bind(request.department)
        .bind(request.position)
        .bind(request.bio)
        .bind(db::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict("Email or username already in use".to_string())
            }
            other => other,
        })?;

        self.get(pool, id).await
    }

    pub async fn update_status(
        &self,
        pool: &SqlitePool,
        id: &str,
        status: UserStatus,
    ) -> AppResult<User> {
        let result = sqlx::query(
            "UPDATE users SET status = ?, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(status)
        .bind(db::now())
        .bind(id)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User", id));
        }

        info!(user_id = %id, status = %status, "User status changed");
        self.get(pool, id).await
    }

    pub async fn delete(&self, pool: &SqlitePool, id: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(db::now())
        .bind(id)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User", id));
        }
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    pub async fn batch_delete(&self, pool: &SqlitePool, ids: &[String]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE users SET is_deleted = 1, updated_at = ");
        builder
            .push_bind(db::now())
            .push(" WHERE is_deleted = 0 AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(pool).await?;
        info!(count = result.rows_affected(), "Users batch deleted");
        Ok(result.rows_affected())
    }
}

impl Default for UserService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::security::verify_password;

    fn signup(username: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: format!("{}@Example.com", username),
            username: username.to_string(),
            password: "secret1".to_string(),
            name: None,
            phone: None,
            department: None,
            position: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_credentials() {
        let pool = connect_in_memory().await.unwrap();
        let service = UserService::new();

        let user = service.create(&pool, signup("ada")).await.unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.name, "ada");
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(user.quota_used, 0);

        let (found, hash) = service.find_credentials(&pool, "ada").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(verify_password("secret1", &hash));
        assert!(service.find_credentials(&pool, "ada@example.com").await.unwrap().is_some());
        assert!(service.find_credentials(&pool, "nobody").await.unwrap().is_none());

        let err = service.create(&pool, signup("ada")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_status_and_soft_delete() {
        let pool = connect_in_memory().await.unwrap();
        let service = UserService::new();
        let ada = service.create(&pool, signup("ada")).await.unwrap();
        let bob = service.create(&pool, signup("bob")).await.unwrap();

        let update = UpdateUserRequest {
            department: Some("Research".to_string()),
            ..Default::default()
        };
        let updated = service.update(&pool, &ada.id, update).await.unwrap();
        assert_eq!(updated.department.as_deref(), Some("Research"));
        assert_eq!(updated.username, "ada");

        let blank = UpdateUserRequest {
            email: Some("".to_string()),
            username: Some(" ".to_string()),
            password: Some("".to_string()),
            department: Some("".to_string()),
            ..Default::default()
        };
        let unchanged = service.update(&pool, &ada.id, blank).await.unwrap();
        assert_eq!(unchanged.email, "ada@example.com");
        assert_eq!(unchanged.username, "ada");
        assert_eq!(unchanged.department.as_deref(), Some("Research"));
        let (_, hash) = service.find_credentials(&pool, "ada").await.unwrap().unwrap();
        assert!(verify_password("secret1", &hash));

        let suspended = service.update_status(&pool, &bob.id, UserStatus::Suspended).await.unwrap();
        assert_eq!(suspended.status, UserStatus::Suspended);
        let query = ListUsersQuery {
            status: Some(UserStatus::Suspended),
            ..Default::default()
        };
        assert_eq!(service.list(&pool, &query).await.unwrap().total, 1);

        let ids = [ada.id.clone(), bob.id.clone()];
        assert_eq!(service.batch_delete(&pool, &ids).await.unwrap(), 2);
        assert!(service.get(&pool, &ada.id).await.is_err());

        // A deleted account frees its username
        service.create(&pool, signup("ada")).await.unwrap();
    }

    #[tokio::test]
    async fn test_search() {
        let pool = connect_in_memory().await.unwrap();
        let service = UserService::new();
        service.create(&pool, signup("grace")).await.unwrap();
        service.create(&pool, signup("linus")).await.unwrap();

        let query = ListUsersQuery {
            search: Some("GRA".to_string()),
            ..Default::default()
        };
        let page = service.list(&pool, &query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].username, "grace");
    }
}
