//! Teams HTTP routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};

use super::AppState;
use crate::error::AppResult;
use crate::models::{
    AddMemberRequest, CreateTeamRequest, ListTeamsQuery, Team, TeamDetail, TeamMember,
    UpdateTeamRequest,
};
use crate::response::ApiResponse;
use crate::services::TeamService;
use crate::AuthenticatedUserId;

/// Configure team routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/teams", get(list_teams).post(create_team))
        .route("/teams/{id}", get(get_team).patch(update_team).delete(delete_team))
        .route("/teams/{id}/members", get(list_members).post(add_member))
        .route("/teams/{id}/members/{user_id}", delete(remove_member))
        .with_state(state)
}

/// List teams the caller owns or belongs to
async fn list_teams(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Query(query): Query<ListTeamsQuery>,
) -> AppResult<Json<ApiResponse<Vec<Team>>>> {
    let page = TeamService::new().list(&state.pool, user.as_str(), &query).await?;
    Ok(Json(page.into()))
}

/// Create a new team
async fn create_team(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Json(req): Json<CreateTeamRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Team>>)> {
    let team = TeamService::new().create(&state.pool, req, user.as_str()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(team).with_message("Team created"))))
}

/// Get team with roster
async fn get_team(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(team_id): Path<String>,
) -> AppResult<Json<ApiResponse<TeamDetail>>> {
    let detail = TeamService::new().get(&state.pool, &team_id, user.as_str()).await?;
    Ok(Json(ApiResponse::data(detail)))
}

async fn update_team(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(team_id): Path<String>,
    Json(req): Json<UpdateTeamRequest>,
) -> AppResult<Json<ApiResponse<Team>>> {
    let team = TeamService::new()
        .update(&state.pool, &team_id, user.as_str(), req)
        .await?;
    Ok(Json(ApiResponse::data(team).with_message("Team updated")))
}

/// Delete a team (soft delete)
async fn delete_team(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(team_id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    TeamService::new().delete(&state.pool, &team_id, user.as_str()).await?;
    Ok(Json(ApiResponse::message("Team deleted")))
}

async fn list_members(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(team_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<TeamMember>>>> {
    let members = TeamService::new()
        .list_members(&state.pool, &team_id, user.as_str())
        .await?;
    Ok(Json(ApiResponse::list(members)))
}

async fn add_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(team_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<TeamMember>>)> {
    let member = TeamService::new()
        .add_member(&state.pool, &team_id, user.as_str(), req)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(member).with_message("Member added"))))
}

async fn remove_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path((team_id, member_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<()>>> {
    TeamService::new()
        .remove_member(&state.pool, &team_id, user.as_str(), &member_id)
        .await?;
    Ok(Json(ApiResponse::message("Member removed")))
}
