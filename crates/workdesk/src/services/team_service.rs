//! Team service - business logic for team operations

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, warn};
use validator::Validate;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{
    AddMemberRequest, CreateTeamRequest, ListTeamsQuery, NewNotification, PaginatedResponse,
    Pagination, Team, TeamDetail, TeamMember, UpdateTeamRequest,
};
use crate::security::{non_blank, require_modify, require_read, TeamPolicy};
use crate::services::NotificationService;

const DEFAULT_LIMIT: u32 = 10;

/// Team service
pub struct TeamService;

impl TeamService {
    /// Create a new team service
    pub fn new() -> Self {
        Self
    }

    fn push_visible(builder: &mut QueryBuilder<'_, Sqlite>, user_id: &str, search: Option<String>) {
        builder
            .push(" WHERE t.is_deleted = 0 AND (t.owner_id = ")
            .push_bind(user_id.to_string())
            .push(" OR EXISTS (SELECT 1 FROM team_members m WHERE m.team_id = t.id AND m.user_id = ")
            .push_bind(user_id.to_string())
            .push("))");
        if let Some(search) = search {
            builder
                .push(" AND t.name LIKE ")
                .push_bind(format!("%{}%", db::escape_like(&search)))
                .push(" ESCAPE '\\'");
        }
    }

    /// Teams the user owns or belongs to
    pub async fn list(
        &self,
        pool: &SqlitePool,
        user_id: &str,
        query: &ListTeamsQuery,
    ) -> AppResult<PaginatedResponse<Team>> {
        let page = Pagination::new(query.page, query.limit, DEFAULT_LIMIT);
        let search = non_blank(query.search.clone());

        let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM teams t");
        Self::push_visible(&mut count, user_id, search.clone());
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT t.id, t.name, t.description, t.avatar, t.owner_id, t.created_at, t.updated_at FROM teams t",
        );
        Self::push_visible(&mut select, user_id, search);
        select
            .push(" ORDER BY t.updated_at DESC, t.rowid DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = select.build_query_as::<Team>().fetch_all(pool).await?;

        Ok(PaginatedResponse::new(items, total as u64, page.page, page.limit))
    }

    /// Create a team; the owner joins it in the same transaction
    pub async fn create(
        &self,
        pool: &SqlitePool,
        request: CreateTeamRequest,
        owner_id: &str,
    ) -> AppResult<Team> {
        request.validate()?;

        let id = new_id();
        let now = db::now();
        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO teams (id, name, description, avatar, owner_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(request.name.trim())
        .bind(non_blank(request.description))
        .bind(non_blank(request.avatar))
        .bind(owner_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO team_members (team_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(owner_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(team_id = %id, owner_id = %owner_id, "Team created");
        self.fetch(pool, &id).await
    }

    async fn fetch(&self, pool: &SqlitePool, team_id: &str) -> AppResult<Team> {
        sqlx::query_as::<_, Team>(
            r#"
            SELECT id, name, description, avatar, owner_id, created_at, updated_at
            FROM teams
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(team_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Team", team_id))
    }

    /// Team with its roster; owner or member only
    pub async fn get(
        &self,
        pool: &SqlitePool,
        team_id: &str,
        user_id: &str,
    ) -> AppResult<TeamDetail> {
        require_read(&TeamPolicy, pool, team_id, user_id).await?;
        let team = self.fetch(pool, team_id).await?;
        let members = self.members_of(pool, team_id).await?;
        Ok(TeamDetail { team, members })
    }

    pub async fn update(
        &self,
        pool: &SqlitePool,
        team_id: &str,
        user_id: &str,
        request: UpdateTeamRequest,
    ) -> AppResult<Team> {
        let request = UpdateTeamRequest {
            name: non_blank(request.name).map(|n| n.trim().to_string()),
            description: non_blank(request.description),
            avatar: non_blank(request.avatar),
        };
        request.validate()?;
        require_modify(&TeamPolicy, pool, team_id, user_id, "update team").await?;

        sqlx::query(
            r#"
            UPDATE teams SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                avatar = COALESCE(?, avatar),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(request.name)
        .bind(request.description)
        .bind(request.avatar)
        .bind(db::now())
        .bind(team_id)
        .execute(pool)
        .await?;

        self.fetch(pool, team_id).await
    }

    /// Soft delete; shares naming the team stop granting access
    pub async fn delete(&self, pool: &SqlitePool, team_id: &str, user_id: &str) -> AppResult<()> {
        require_modify(&TeamPolicy, pool, team_id, user_id, "delete team").await?;

        sqlx::query("UPDATE teams SET is_deleted = 1, updated_at = ? WHERE id = ?")
            .bind(db::now())
            .bind(team_id)
            .execute(pool)
            .await?;

        info!(team_id = %team_id, "Team deleted");
        Ok(())
    }

    pub async fn list_members(
        &self,
        pool: &SqlitePool,
        team_id: &str,
        user_id: &str,
    ) -> AppResult<Vec<TeamMember>> {
        require_read(&TeamPolicy, pool, team_id, user_id).await?;
        self.members_of(pool, team_id).await
    }

    async fn members_of(&self, pool: &SqlitePool, team_id: &str) -> AppResult<Vec<TeamMember>> {
        let members = sqlx::query_as::<_, TeamMember>(
            "SELECT team_id, user_id, role_id, joined_at FROM team_members WHERE team_id = ? ORDER BY joined_at, rowid",
        )
        .bind(team_id)
        .fetch_all(pool)
        .await?;
        Ok(members)
    }

    /// Add a user to the roster; only the owner may do this
    pub async fn add_member(
        &self,
        pool: &SqlitePool,
        team_id: &str,
        user_id: &str,
        request: AddMemberRequest,
    ) -> AppResult<TeamMember> {
        require_modify(&TeamPolicy, pool, team_id, user_id, "add team member").await?;

        let exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ? AND is_deleted = 0")
                .bind(&request.user_id)
                .fetch_one(pool)
                .await?;
        if exists == 0 {
            return Err(AppError::not_found("User", &request.user_id));
        }

        let role_id = non_blank(request.role_id);
        sqlx::query(
            "INSERT INTO team_members (team_id, user_id, role_id, joined_at) VALUES (?, ?, ?, ?)",
        )
        .bind(team_id)
        .bind(&request.user_id)
        .bind(&role_id)
        .bind(db::now())
        .execute(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict("User is already a team member".to_string())
            }
            other => other,
        })?;

        info!(team_id = %team_id, user_id = %request.user_id, "Team member added");

        let note = NewNotification::new(
            &request.user_id,
            "team_invite",
            "Added to a team",
            "You were added to a team",
        )
        .with_link(format!("/teams/{}", team_id));
        if let Err(e) = NotificationService::new().notify(pool, note).await {
            warn!(team_id = %team_id, user_id = %request.user_id, error = %e, "Member notification failed");
        }

        let member = sqlx::query_as::<_, TeamMember>(
            "SELECT team_id, user_id, role_id, joined_at FROM team_members WHERE team_id = ? AND user_id = ?",
        )
        .bind(team_id)
        .bind(&request.user_id)
        .fetch_one(pool)
        .await?;
        Ok(member)
    }

    /// Owner removes anyone but themself; members may remove themselves
    pub async fn remove_member(
        &self,
        pool: &SqlitePool,
        team_id: &str,
        user_id: &str,
        member_id: &str,
    ) -> AppResult<()> {
        require_read(&TeamPolicy, pool, team_id, user_id).await?;
        let team = self.fetch(pool, team_id).await?;
        if member_id == team.owner_id {
            return Err(AppError::CannotRemoveOwner);
        }
        if member_id != user_id {
            require_modify(&TeamPolicy, pool, team_id, user_id, "remove team member").await?;
        }

        let result = sqlx::query("DELETE FROM team_members WHERE team_id = ? AND user_id = ?")
            .bind(team_id)
            .bind(member_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Member", member_id));
        }

        info!(team_id = %team_id, user_id = %member_id, "Team member removed");
        Ok(())
    }
}

impl Default for TeamService {
    fn default() -> Self {
        Self::new()
    }
}
