//! Calendar routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};

use super::AppState;
use crate::error::AppResult;
use crate::models::{
    AddAttendeeRequest, BatchDeleteRequest, BatchDeleteResult, CalendarEvent, CreateEventRequest,
    EventDetail, ListEventsQuery, RescheduleRequest, RespondRequest, UpdateEventRequest,
};
use crate::response::ApiResponse;
use crate::services::CalendarService;
use crate::AuthenticatedUserId;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/calendar/events", get(list_events).post(create_event))
        .route("/calendar/events/batch-delete", post(batch_delete))
        .route(
            "/calendar/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/calendar/events/{id}/reschedule", patch(reschedule_event))
        .route("/calendar/events/{id}/attendees", post(add_attendee))
        .route("/calendar/events/{id}/attendees/{user_id}", delete(remove_attendee))
        .route("/calendar/events/{id}/respond", post(respond))
        .with_state(state)
}

/// Events owned or attended, optionally inside `[startDate, endDate]`
async fn list_events(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Query(query): Query<ListEventsQuery>,
) -> AppResult<Json<ApiResponse<Vec<CalendarEvent>>>> {
    let events = CalendarService::new()
        .list(&state.pool, user.as_str(), &query)
        .await?;
    Ok(Json(ApiResponse::list(events)))
}

async fn create_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Json(req): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<EventDetail>>)> {
    let event = CalendarService::new()
        .create(&state.pool, req, user.as_str())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(event).with_message("Event created"))))
}

async fn get_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<EventDetail>>> {
    let event = CalendarService::new().get(&state.pool, &id, user.as_str()).await?;
    Ok(Json(ApiResponse::data(event)))
}

async fn update_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEventRequest>,
) -> AppResult<Json<ApiResponse<EventDetail>>> {
    let event = CalendarService::new()
        .update(&state.pool, &id, user.as_str(), req)
        .await?;
    Ok(Json(ApiResponse::data(event).with_message("Event updated")))
}

async fn reschedule_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<RescheduleRequest>,
) -> AppResult<Json<ApiResponse<EventDetail>>> {
    let event = CalendarService::new()
        .reschedule(&state.pool, &id, user.as_str(), req.start_at, req.end_at)
        .await?;
    Ok(Json(ApiResponse::data(event).with_message("Event rescheduled")))
}

async fn add_attendee(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<AddAttendeeRequest>,
) -> AppResult<Json<ApiResponse<EventDetail>>> {
    let event = CalendarService::new()
        .add_attendee(&state.pool, &id, user.as_str(), &req.user_id)
        .await?;
    Ok(Json(ApiResponse::data(event).with_message("Attendee added")))
}

async fn remove_attendee(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path((id, attendee_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<EventDetail>>> {
    let event = CalendarService::new()
        .remove_attendee(&state.pool, &id, user.as_str(), &attendee_id)
        .await?;
    Ok(Json(ApiResponse::data(event).with_message("Attendee removed")))
}

/// Attendee accepts or declines
async fn respond(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> AppResult<Json<ApiResponse<EventDetail>>> {
    let event = CalendarService::new()
        .respond(&state.pool, &id, user.as_str(), req.status)
        .await?;
    Ok(Json(ApiResponse::data(event).with_message("Response recorded")))
}

async fn delete_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    CalendarService::new().delete(&state.pool, &id, user.as_str()).await?;
    Ok(Json(ApiResponse::message("Event deleted")))
}

async fn batch_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUserId>,
    Json(req): Json<BatchDeleteRequest>,
) -> AppResult<Json<ApiResponse<BatchDeleteResult>>> {
    let deleted = CalendarService::new()
        .batch_delete(&state.pool, &req.ids, user.as_str())
        .await?;
    Ok(Json(ApiResponse::data(BatchDeleteResult { deleted }).with_message("Events deleted")))
}
