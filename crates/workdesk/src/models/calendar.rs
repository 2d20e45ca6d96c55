//! Calendar event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Invitation status of an attendee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum AttendeeStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

impl std::fmt::Display for AttendeeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendeeStatus::Pending => write!(f, "PENDING"),
            AttendeeStatus::Accepted => write!(f, "ACCEPTED"),
            AttendeeStatus::Declined => write!(f, "DECLINED"),
        }
    }
}

/// Calendar event
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub all_day: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attendee row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EventAttendee {
    pub event_id: String,
    pub user_id: String,
    pub status: AttendeeStatus,
    pub created_at: DateTime<Utc>,
}

/// Event with attendees
#[derive(Debug, Clone, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: CalendarEvent,
    pub attendees: Vec<EventAttendee>,
}

/// Request to create an event
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    pub location: Option<String>,
    #[serde(default)]
    pub attendee_ids: Vec<String>,
}

/// Partial event update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub color: Option<String>,
    pub all_day: Option<bool>,
    pub location: Option<String>,
}

/// Request to move an event in time
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// Request to invite an attendee
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAttendeeRequest {
    pub user_id: String,
}

/// Attendee answer to an invitation
#[derive(Debug, Clone, Deserialize)]
pub struct RespondRequest {
    pub status: AttendeeStatus,
}

/// Query for listing events
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}
