//! Notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification addressed to one user
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    /// system, user, message, task, alert
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<sqlx::types::Json<serde_json::Value>>,
    #[serde(rename = "read")]
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a notification
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub link: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl NewNotification {
    pub fn new(
        user_id: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            kind: kind.into(),
            title: title.into(),
            content: content.into(),
            link: None,
            payload: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Query for listing notifications
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub unread_only: bool,
}

/// Unread counter payload
#[derive(Debug, Clone, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}
