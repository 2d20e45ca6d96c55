//! Folder model for the file hierarchy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Folder row; `path` is the materialized ancestry ("/a/b")
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a new folder
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub name: String,
    pub parent_id: Option<String>,
    pub team_id: Option<String>,
}

/// Request to rename a folder
#[derive(Debug, Clone, Deserialize)]
pub struct RenameFolderRequest {
    pub name: String,
}

/// Request to move a folder; `None` moves it to the root
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFolderRequest {
    pub parent_id: Option<String>,
}

/// Query for listing folders
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFoldersQuery {
    pub parent_id: Option<String>,
}

/// Folder tree node for hierarchical display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderTreeNode {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub children: Vec<FolderTreeNode>,
}

impl FolderTreeNode {
    /// Depth-first search by id
    pub fn find(&self, id: &str) -> Option<&FolderTreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}
