//! Row builders shared by the unit tests

use sqlx::SqlitePool;

use crate::db;
use crate::id::new_id;

/// Insert an active user with a placeholder hash and return its id
pub async fn seed_user(pool: &SqlitePool, username: &str) -> String {
    let id = new_id();
    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO users (id, email, username, password_hash, name, status, created_at, updated_at)
        VALUES (?, ?, ?, 'unusable', ?, 'ACTIVE', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(format!("{}@example.com", username))
    .bind(username)
    .bind(username)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();
    id
}

/// Insert a document owned by `owner`
pub async fn seed_document(pool: &SqlitePool, owner: &str, title: &str) -> String {
    let id = new_id();
    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO documents (id, title, content, doc_type, owner_id, created_at, updated_at)
        VALUES (?, ?, '', 'doc', ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(title)
    .bind(owner)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();
    id
}

/// Insert a team without any roster rows
pub async fn seed_team(pool: &SqlitePool, owner: &str, name: &str) -> String {
    let id = new_id();
    let now = db::now();
    sqlx::query(
        "INSERT INTO teams (id, name, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(owner)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();
    id
}

/// Current quota counter of a user
pub async fn quota_used(pool: &SqlitePool, user_id: &str) -> i64 {
    sqlx::query_scalar("SELECT quota_used FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}
