//! Document, tag and share models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Document entity
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Free-form folder label, not a folder reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub size: i64,
    pub views: i64,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Document with its tag names, as returned by list and get
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: Document,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares: Option<Vec<DocumentShare>>,
}

/// Permission level carried by a share grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum SharePermission {
    #[default]
    Read,
    Edit,
    Comment,
}

impl std::fmt::Display for SharePermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SharePermission::Read => write!(f, "READ"),
            SharePermission::Edit => write!(f, "EDIT"),
            SharePermission::Comment => write!(f, "COMMENT"),
        }
    }
}

/// Share grant on a document, naming either a user or a team
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DocumentShare {
    pub id: String,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_with_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub permission: SharePermission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DocumentShare {
    /// A share with no expiry never lapses
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires| expires > at)
    }
}

/// Grantee of a share
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareTarget {
    User(String),
    Team(String),
}

impl ShareTarget {
    /// Exactly one of `user_id` / `team_id` must be given
    pub fn from_parts(user_id: Option<String>, team_id: Option<String>) -> AppResult<Self> {
        match (user_id, team_id) {
            (Some(user), None) if !user.trim().is_empty() => Ok(ShareTarget::User(user)),
            (None, Some(team)) if !team.trim().is_empty() => Ok(ShareTarget::Team(team)),
            _ => Err(AppError::Validation(
                "exactly one of userId or teamId is required".to_string(),
            )),
        }
    }
}

/// Request to create a document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub folder: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub team_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial document update; empty strings count as absent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub folder: Option<String>,
}

/// Request to rename a document
#[derive(Debug, Clone, Deserialize)]
pub struct RenameDocumentRequest {
    pub title: String,
}

/// Request to move a document to another folder label
#[derive(Debug, Clone, Deserialize)]
pub struct MoveDocumentRequest {
    pub folder: String,
}

/// Request to replace a document's tags
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTagsRequest {
    pub tags: Vec<String>,
}

/// Request to grant access
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareDocumentRequest {
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub permission: Option<SharePermission>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request to revoke access
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnshareDocumentRequest {
    pub user_id: Option<String>,
    pub team_id: Option<String>,
}

/// Query for listing documents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDocumentsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub folder: Option<String>,
    /// Comma-separated tag names
    pub tags: Option<String>,
}

impl ListDocumentsQuery {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_target_requires_one_grantee() {
        assert_eq!(
            ShareTarget::from_parts(Some("u".into()), None).unwrap(),
            ShareTarget::User("u".into())
        );
        assert_eq!(
            ShareTarget::from_parts(None, Some("t".into())).unwrap(),
            ShareTarget::Team("t".into())
        );
        assert!(ShareTarget::from_parts(None, None).is_err());
        assert!(ShareTarget::from_parts(Some("u".into()), Some("t".into())).is_err());
        assert!(ShareTarget::from_parts(Some("  ".into()), None).is_err());
    }

    #[test]
    fn test_permission_defaults_to_read() {
        assert_eq!(SharePermission::default(), SharePermission::Read);
        let parsed: SharePermission = serde_json::from_str("\"COMMENT\"").unwrap();
        assert_eq!(parsed, SharePermission::Comment);
    }

    #[test]
    fn test_tag_list_parsing() {
        let query = ListDocumentsQuery {
            tags: Some("draft, q3,,final ".into()),
            ..Default::default()
        };
        assert_eq!(query.tag_list(), vec!["draft", "q3", "final"]);
        assert!(ListDocumentsQuery::default().tag_list().is_empty());
    }
}
