//! Folder service - materialized-path hierarchy
//!
//! Paths are stored denormalized (`/a/b/c`). Renames and moves recompute the
//! stored path of every live descendant, and the `path` of files filed in
//! those folders, inside the same transaction.

use std::collections::{HashMap, VecDeque};

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{CreateFolderRequest, Folder, FolderTreeNode};
use crate::security::{require_owner, require_read, validate_entry_name, OwnedResource, OwnerOnly};

const FOLDER_COLUMNS: &str =
    "id, name, path, parent_id, owner_id, team_id, created_at, updated_at";

/// Path of a folder given its parent's path
pub fn child_path(parent_path: Option<&str>, name: &str) -> String {
    match parent_path {
        Some(parent) => format!("{}/{}", parent, name),
        None => format!("/{}", name),
    }
}

/// Build the forest of an owner's folders from flat rows.
///
/// Rows whose parent does not resolve among `folders` are dropped together
/// with their subtrees. Siblings are ordered by name.
pub fn build_tree(folders: Vec<Folder>) -> Vec<FolderTreeNode> {
    let index: HashMap<String, usize> = folders
        .iter()
        .enumerate()
        .map(|(i, f)| (f.id.clone(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); folders.len()];
    let mut roots = Vec::new();
    for (i, folder) in folders.iter().enumerate() {
        match folder.parent_id.as_deref() {
            None => roots.push(i),
            Some(parent) => {
                if let Some(&p) = index.get(parent) {
                    children[p].push(i);
                }
            }
        }
    }

    fn materialize(i: usize, folders: &[Folder], children: &[Vec<usize>]) -> FolderTreeNode {
        let folder = &folders[i];
        let mut nodes: Vec<FolderTreeNode> = children[i]
            .iter()
            .map(|&c| materialize(c, folders, children))
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        FolderTreeNode {
            id: folder.id.clone(),
            name: folder.name.clone(),
            path: folder.path.clone(),
            parent_id: folder.parent_id.clone(),
            children: nodes,
        }
    }

    let mut tree: Vec<FolderTreeNode> = roots
        .into_iter()
        .map(|i| materialize(i, &folders, &children))
        .collect();
    tree.sort_by(|a, b| a.name.cmp(&b.name));
    tree
}

/// Folder service
pub struct FolderService;

impl FolderService {
    pub fn new() -> Self {
        Self
    }

    /// Create a folder under an owned parent, or at the root
    pub async fn create(
        &self,
        pool: &SqlitePool,
        request: CreateFolderRequest,
        owner_id: &str,
    ) -> AppResult<Folder> {
        let name = validate_entry_name(&request.name, "Folder")?;

        let parent_path = match request.parent_id.as_deref() {
            Some(parent_id) => Some(self.get(pool, parent_id, owner_id).await?.path),
            None => None,
        };
        let path = child_path(parent_path.as_deref(), &name);

        let id = new_id();
        let now = db::now();
        sqlx::query(
            r#"
            INSERT INTO folders (id, name, path, parent_id, owner_id, team_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&name)
        .bind(&path)
        .bind(&request.parent_id)
        .bind(owner_id)
        .bind(&request.team_id)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(|e| path_conflict(e, &path))?;

        info!(folder_id = %id, owner_id = %owner_id, path = %path, "Folder created");
        self.get(pool, &id, owner_id).await
    }

    /// Get an owned folder
    pub async fn get(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<Folder> {
        require_read(&OwnerOnly(OwnedResource::Folder), pool, id, user_id).await?;

        let sql = format!(
            "SELECT {} FROM folders WHERE id = ? AND is_deleted = 0",
            FOLDER_COLUMNS
        );
        sqlx::query_as::<_, Folder>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Folder", id))
    }

    /// List the direct children of `parent_id`, or the root folders
    pub async fn list(
        &self,
        pool: &SqlitePool,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> AppResult<Vec<Folder>> {
        let folders = match parent_id {
            Some(parent) => {
                let sql = format!(
                    "SELECT {} FROM folders WHERE owner_id = ? AND parent_id = ? AND is_deleted = 0 ORDER BY name",
                    FOLDER_COLUMNS
                );
                sqlx::query_as::<_, Folder>(&sql)
                    .bind(owner_id)
                    .bind(parent)
                    .fetch_all(pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM folders WHERE owner_id = ? AND parent_id IS NULL AND is_deleted = 0 ORDER BY name",
                    FOLDER_COLUMNS
                );
                sqlx::query_as::<_, Folder>(&sql)
                    .bind(owner_id)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(folders)
    }

    /// Full folder forest of an owner
    pub async fn get_tree(
        &self,
        pool: &SqlitePool,
        owner_id: &str,
    ) -> AppResult<Vec<FolderTreeNode>> {
        let sql = format!(
            "SELECT {} FROM folders WHERE owner_id = ? AND is_deleted = 0",
            FOLDER_COLUMNS
        );
        let folders = sqlx::query_as::<_, Folder>(&sql)
            .bind(owner_id)
            .fetch_all(pool)
            .await?;
        Ok(build_tree(folders))
    }

    /// Replace the last path segment and cascade to descendants
    pub async fn rename(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        new_name: &str,
    ) -> AppResult<Folder> {
        let name = validate_entry_name(new_name, "Folder")?;
        require_owner(pool, OwnedResource::Folder, id, user_id, "rename folder").await?;
        let folder = self.get(pool, id, user_id).await?;

        let prefix = folder
            .path
            .rsplit_once('/')
            .map(|(prefix, _)| prefix)
            .unwrap_or("");
        let new_path = format!("{}/{}", prefix, name);

        let mut tx = pool.begin().await?;
        let now = db::now();
        sqlx::query("UPDATE folders SET name = ?, path = ?, updated_at = ? WHERE id = ?")
            .bind(&name)
            .bind(&new_path)
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| path_conflict(e, &new_path))?;
        let moved = cascade_paths(&mut tx, &folder.owner_id, id, &new_path, &now).await?;
        tx.commit().await?;

        info!(folder_id = %id, path = %new_path, descendants = moved, "Folder renamed");
        self.get(pool, id, user_id).await
    }

    /// Re-parent a folder; `None` moves it to the root
    pub async fn move_to(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        new_parent_id: Option<&str>,
    ) -> AppResult<Folder> {
        require_owner(pool, OwnedResource::Folder, id, user_id, "move folder").await?;
        let folder = self.get(pool, id, user_id).await?;

        let parent = match new_parent_id {
            Some(parent_id) if parent_id == id => {
                return Err(AppError::Validation(
                    "A folder cannot be moved into itself".to_string(),
                ))
            }
            Some(parent_id) => Some(self.get(pool, parent_id, user_id).await?),
            None => None,
        };

        let mut tx = pool.begin().await?;
        if let Some(parent) = &parent {
            let ancestry = ancestors(&mut tx, &folder.owner_id, &parent.id).await?;
            if ancestry.iter().any(|a| a == id) {
                return Err(AppError::Validation(
                    "A folder cannot be moved into its own subtree".to_string(),
                ));
            }
        }

        let new_path = child_path(parent.as_ref().map(|p| p.path.as_str()), &folder.name);
        let now = db::now();
        sqlx::query("UPDATE folders SET parent_id = ?, path = ?, updated_at = ? WHERE id = ?")
            .bind(new_parent_id)
            .bind(&new_path)
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| path_conflict(e, &new_path))?;
        let moved = cascade_paths(&mut tx, &folder.owner_id, id, &new_path, &now).await?;
        tx.commit().await?;

        info!(folder_id = %id, path = %new_path, descendants = moved, "Folder moved");
        self.get(pool, id, user_id).await
    }

    /// Soft delete; children are left in place and drop out of the tree
    pub async fn delete(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<()> {
        require_owner(pool, OwnedResource::Folder, id, user_id, "delete folder").await?;

        sqlx::query(
            "UPDATE folders SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(db::now())
        .bind(id)
        .execute(pool)
        .await?;

        info!(folder_id = %id, "Folder deleted");
        Ok(())
    }
}

impl Default for FolderService {
    fn default() -> Self {
        Self::new()
    }
}

fn path_conflict(err: sqlx::Error, path: &str) -> AppError {
    match AppError::from(err) {
        AppError::Conflict(_) => {
            AppError::Conflict(format!("Folder path already exists: {}", path))
        }
        other => other,
    }
}

/// Parent chain of `start`, itself included, nearest first
async fn ancestors(
    tx: &mut Transaction<'_, Sqlite>,
    owner_id: &str,
    start: &str,
) -> AppResult<Vec<String>> {
    let rows: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT id, parent_id FROM folders WHERE owner_id = ? AND is_deleted = 0")
            .bind(owner_id)
            .fetch_all(&mut **tx)
            .await?;
    let parents: HashMap<String, Option<String>> = rows.into_iter().collect();

    let mut chain = Vec::new();
    let mut current = Some(start.to_string());
    while let Some(id) = current {
        // Corrupt cycles end the walk
        if chain.contains(&id) {
            break;
        }
        current = parents.get(&id).cloned().flatten();
        chain.push(id);
    }
    Ok(chain)
}

/// Recompute stored paths below `root_id`, whose path is already `root_path`.
///
/// Also re-points files filed in any affected folder. Returns the number of
/// descendant folders rewritten.
async fn cascade_paths(
    tx: &mut Transaction<'_, Sqlite>,
    owner_id: &str,
    root_id: &str,
    root_path: &str,
    now: &str,
) -> AppResult<usize> {
    let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
        "SELECT id, name, parent_id FROM folders WHERE owner_id = ? AND is_deleted = 0",
    )
    .bind(owner_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut children: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for (id, name, parent_id) in &rows {
        if let Some(parent) = parent_id.as_deref() {
            children.entry(parent).or_default().push((id.as_str(), name.as_str()));
        }
    }

    let mut rewritten = 0;
    let mut queue = VecDeque::from([(root_id.to_string(), root_path.to_string())]);
    while let Some((folder_id, path)) = queue.pop_front() {
        sqlx::query(
            "UPDATE files SET path = ?, updated_at = ? WHERE folder_id = ? AND is_deleted = 0",
        )
        .bind(&path)
        .bind(now)
        .bind(&folder_id)
        .execute(&mut **tx)
        .await?;

        for (child_id, child_name) in children.get(folder_id.as_str()).into_iter().flatten() {
            let child = child_path(Some(&path), child_name);
            sqlx::query("UPDATE folders SET path = ?, updated_at = ? WHERE id = ?")
                .bind(&child)
                .bind(now)
                .bind(*child_id)
                .execute(&mut **tx)
                .await
                .map_err(|e| path_conflict(e, &child))?;
            rewritten += 1;
            queue.push_back((child_id.to_string(), child));
        }
    }
    Ok(rewritten)
}
