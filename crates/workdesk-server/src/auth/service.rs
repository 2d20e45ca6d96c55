//! Authentication service: credentials in, token pairs out

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, warn};
use workdesk::models::{CreateUserRequest, User, UserStatus};
use workdesk::services::UserService;
use workdesk::security::verify_password;
use workdesk::{db, AppError, AppResult};

use super::jwt::{JwtKeys, TokenType};

/// Self-service sign-up
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub name: Option<String>,
}

/// Login by email or username
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "username")]
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// Issued credentials
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Authentication service
pub struct AuthService<'a> {
    pool: &'a SqlitePool,
    keys: &'a JwtKeys,
}

impl<'a> AuthService<'a> {
    pub fn new(pool: &'a SqlitePool, keys: &'a JwtKeys) -> Self {
        Self { pool, keys }
    }

    /// Create an ACTIVE account and sign it in
    pub async fn register(&self, request: RegisterRequest) -> AppResult<TokenResponse> {
        let user = UserService::new()
            .create(
                self.pool,
                CreateUserRequest {
                    email: request.email,
                    username: request.username,
                    password: request.password,
                    name: request.name,
                    phone: None,
                    department: None,
                    position: None,
                    status: None,
                },
            )
            .await?;

        info!(user_id = %user.id, "User registered");
        self.issue_pair(user).await
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<TokenResponse> {
        let login = request.login.trim();
        let users = UserService::new();
        // Emails are stored lowercased, usernames verbatim
        let found = match users.find_credentials(self.pool, login).await? {
            Some(found) => Some(found),
            None => users.find_credentials(self.pool, &login.to_lowercase()).await?,
        };
        let (user, hash) =
            found.ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

        if !verify_password(&request.password, &hash) {
            warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }
        if user.status != UserStatus::Active {
            return Err(AppError::forbidden(format!("login with {} account", user.status)));
        }

        users.touch_last_login(self.pool, &user.id).await?;
        let user = users.get(self.pool, &user.id).await?;
        info!(user_id = %user.id, "User logged in");
        self.issue_pair(user).await
    }

    /// Trade a stored refresh token for a new pair; the old one is consumed
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let claims = self.keys.verify(refresh_token, TokenType::Refresh)?;

        let removed = sqlx::query(
            "DELETE FROM refresh_tokens WHERE token_hash = ? AND user_id = ? AND expires_at > ?",
        )
        .bind(token_digest(refresh_token))
        .bind(&claims.sub)
        .bind(db::now())
        .execute(self.pool)
        .await?;
        if removed.rows_affected() == 0 {
            return Err(AppError::Unauthorized("Refresh token revoked or expired".to_string()));
        }

        let user = UserService::new()
            .get(self.pool, &claims.sub)
            .await
            .map_err(|_| AppError::Unauthorized("Account no longer exists".to_string()))?;
        if user.status != UserStatus::Active {
            return Err(AppError::forbidden(format!("refresh with {} account", user.status)));
        }
        self.issue_pair(user).await
    }

    /// Revoke one refresh token, or all of the user's tokens when none is given
    pub async fn logout(&self, user_id: &str, refresh_token: Option<&str>) -> AppResult<u64> {
        let result = match refresh_token {
            Some(token) => {
                sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ? AND user_id = ?")
                    .bind(token_digest(token))
                    .bind(user_id)
                    .execute(self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
                    .bind(user_id)
                    .execute(self.pool)
                    .await?
            }
        };
        info!(user_id = %user_id, revoked = result.rows_affected(), "User logged out");
        Ok(result.rows_affected())
    }

    /// Drop expired refresh tokens
    pub async fn cleanup_expired(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(db::now())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn issue_pair(&self, user: User) -> AppResult<TokenResponse> {
        let (access_token, _) = self.keys.issue(&user.id, TokenType::Access)?;
        let (refresh_token, claims) = self.keys.issue(&user.id, TokenType::Refresh)?;

        let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
            .unwrap_or_else(|| Utc::now() + self.keys.refresh_ttl());
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&claims.jti)
        .bind(&user.id)
        .bind(token_digest(&refresh_token))
        .bind(db::timestamp(expires_at))
        .bind(db::now())
        .execute(self.pool)
        .await?;

        Ok(TokenResponse {
            user,
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.keys.access_ttl().num_seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::migrations;
    use chrono::Duration;
    use workdesk::db::connect_in_memory;

    async fn setup() -> (SqlitePool, JwtKeys) {
        let pool = connect_in_memory().await.unwrap();
        migrations::run_migration(&pool).await.unwrap();
        let keys = JwtKeys::new(b"test-secret", Duration::minutes(10), Duration::days(1));
        (pool, keys)
    }

    fn signup() -> RegisterRequest {
        RegisterRequest {
            email: "Ada@Example.com".to_string(),
            username: "ada".to_string(),
            password: "secret1".to_string(),
            name: None,
        }
    }

    #[tokio::test]
    async fn test_register_login_refresh() {
        let (pool, keys) = setup().await;
        let auth = AuthService::new(&pool, &keys);

        let registered = auth.register(signup()).await.unwrap();
        assert_eq!(registered.expires_in, 600);

        let err = auth
            .login(LoginRequest { login: "ada".into(), password: "wrong1".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let session = auth
            .login(LoginRequest { login: "ADA@example.com".into(), password: "secret1".into() })
            .await
            .unwrap();
        assert!(session.user.last_login_at.is_some());

        let rotated = auth.refresh(&session.refresh_token).await.unwrap();
        assert_eq!(rotated.user.id, registered.user.id);
        // Consumed on use
        assert!(auth.refresh(&session.refresh_token).await.is_err());
        // Access tokens are not refresh tokens
        assert!(auth.refresh(&rotated.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_suspended_user_cannot_login() {
        let (pool, keys) = setup().await;
        let auth = AuthService::new(&pool, &keys);
        let registered = auth.register(signup()).await.unwrap();
        UserService::new()
            .update_status(&pool, &registered.user.id, UserStatus::Suspended)
            .await
            .unwrap();

        let err = auth
            .login(LoginRequest { login: "ada".into(), password: "secret1".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_logout_without_token_revokes_all() {
        let (pool, keys) = setup().await;
        let auth = AuthService::new(&pool, &keys);
        let first = auth.register(signup()).await.unwrap();
        let second = auth
            .login(LoginRequest { login: "ada".into(), password: "secret1".into() })
            .await
            .unwrap();

        assert_eq!(auth.logout(&first.user.id, Some(&first.refresh_token)).await.unwrap(), 1);
        assert_eq!(auth.logout(&first.user.id, None).await.unwrap(), 1);
        assert!(auth.refresh(&second.refresh_token).await.is_err());
        assert_eq!(auth.cleanup_expired().await.unwrap(), 0);
    }
}
