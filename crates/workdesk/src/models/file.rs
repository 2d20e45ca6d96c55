//! Stored file metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File metadata row; `size` counts toward the owner's quota while the row is live
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub path: String,
    pub mime_type: String,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upload metadata
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    pub name: String,
    pub mime_type: Option<String>,
    pub size: i64,
    pub folder_id: Option<String>,
    pub team_id: Option<String>,
    pub path: Option<String>,
    pub thumbnail: Option<String>,
}

/// Request to rename a file
#[derive(Debug, Clone, Deserialize)]
pub struct RenameFileRequest {
    pub name: String,
}

/// Request to move a file; `None` moves it to the root
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFileRequest {
    pub folder_id: Option<String>,
}

/// Query for listing files
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub folder_id: Option<String>,
    pub path: Option<String>,
    #[serde(rename = "type")]
    pub mime_prefix: Option<String>,
    pub search: Option<String>,
}

/// Storage usage summary
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub used: i64,
    pub total: i64,
    pub available: i64,
    pub used_percent: i64,
}

impl StorageInfo {
    pub fn new(used: i64, total: i64) -> Self {
        let used_percent = if total > 0 {
            (i128::from(used) * 100 / i128::from(total)) as i64
        } else {
            0
        };
        Self {
            used,
            total,
            available: total - used,
            used_percent,
        }
    }
}

/// Download link for a file
#[derive(Debug, Clone, Serialize)]
pub struct DownloadUrl {
    pub url: String,
}
