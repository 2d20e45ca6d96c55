//! SQLite connection helpers

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use crate::migrations;

/// Open a pool for `database_url`, creating the file and its directory if needed.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    if database_url.starts_with("sqlite:") && !database_url.contains(":memory:") {
        let path = database_url.trim_start_matches("sqlite:");
        let path = path.trim_start_matches("//");
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    info!(max_connections, "Connected to {}", database_url);
    Ok(pool)
}

/// Single-connection in-memory database with the core schema applied.
///
/// The connection never expires, so the database lives as long as the pool.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    migrations::run_migration(&pool).await?;
    Ok(pool)
}

/// Fixed-width RFC 3339 form used for every stored timestamp.
///
/// Millisecond precision with a `Z` suffix keeps string order equal to time order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in storage form
pub fn now() -> String {
    timestamp(Utc::now())
}

/// Escape `%`, `_` and `\` for use in a `LIKE ... ESCAPE '\'` pattern
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::milliseconds(5);
        assert_eq!(timestamp(whole), "2024-01-01T00:00:00.000Z");
        assert_eq!(timestamp(fractional), "2024-01-01T00:00:00.005Z");
        assert!(timestamp(whole) < timestamp(fractional));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[tokio::test]
    async fn test_in_memory_pool_has_schema() {
        let pool = connect_in_memory().await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
