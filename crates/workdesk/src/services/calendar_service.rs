//! Calendar service - events and attendee responses

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, warn};

use crate::db;
use crate::error::{AppError, AppResult};
use crate::id::new_id;
use crate::models::{
    AttendeeStatus, CalendarEvent, CreateEventRequest, EventAttendee, EventDetail, ListEventsQuery,
    NewNotification, UpdateEventRequest,
};
use crate::security::{non_blank, require_modify, require_read, require_text, EventPolicy};
use crate::services::NotificationService;

const DEFAULT_EVENT_TYPE: &str = "meeting";

const EVENT_COLUMNS: &str = "e.id, e.title, e.description, e.start_at, e.end_at, e.event_type, \
                             e.color, e.all_day, e.location, e.owner_id, e.created_at, e.updated_at";

fn check_window(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> AppResult<()> {
    if end_at < start_at {
        return Err(AppError::Validation("endAt must not be before startAt".to_string()));
    }
    Ok(())
}

async fn ensure_live_user(pool: &SqlitePool, user_id: &str) -> AppResult<()> {
    let exists: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ? AND is_deleted = 0")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    if exists == 0 {
        return Err(AppError::not_found("User", user_id));
    }
    Ok(())
}

/// Calendar service
pub struct CalendarService;

impl CalendarService {
    pub fn new() -> Self {
        Self
    }

    /// Owned or attended events that fall inside the optional window
    pub async fn list(
        &self,
        pool: &SqlitePool,
        user_id: &str,
        query: &ListEventsQuery,
    ) -> AppResult<Vec<CalendarEvent>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM calendar_events e WHERE e.is_deleted = 0 AND (e.owner_id = ",
            EVENT_COLUMNS
        ));
        builder
            .push_bind(user_id.to_string())
            .push(" OR EXISTS (SELECT 1 FROM event_attendees a WHERE a.event_id = e.id AND a.user_id = ")
            .push_bind(user_id.to_string())
            .push("))");
        if let Some(start) = query.start_date {
            builder.push(" AND e.start_at >= ").push_bind(db::timestamp(start));
        }
        if let Some(end) = query.end_date {
            builder.push(" AND e.end_at <= ").push_bind(db::timestamp(end));
        }
        builder.push(" ORDER BY e.start_at, e.rowid");

        let events = builder.build_query_as::<CalendarEvent>().fetch_all(pool).await?;
        Ok(events)
    }

    async fn fetch(&self, pool: &SqlitePool, id: &str) -> AppResult<CalendarEvent> {
        let sql = format!(
            "SELECT {} FROM calendar_events e WHERE e.id = ? AND e.is_deleted = 0",
            EVENT_COLUMNS
        );
        sqlx::query_as::<_, CalendarEvent>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Event", id))
    }

    async fn attendees(&self, pool: &SqlitePool, id: &str) -> AppResult<Vec<EventAttendee>> {
        let attendees = sqlx::query_as::<_, EventAttendee>(
            "SELECT event_id, user_id, status, created_at FROM event_attendees WHERE event_id = ? ORDER BY created_at, rowid",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(attendees)
    }

    async fn detail(&self, pool: &SqlitePool, id: &str) -> AppResult<EventDetail> {
        Ok(EventDetail {
            event: self.fetch(pool, id).await?,
            attendees: self.attendees(pool, id).await?,
        })
    }

    /// Owner or attendee only
    pub async fn get(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<EventDetail> {
        require_read(&EventPolicy, pool, id, user_id).await?;
        self.detail(pool, id).await
    }

    /// Create an event and invite attendees; the owner is never an attendee
    pub async fn create(
        &self,
        pool: &SqlitePool,
        request: CreateEventRequest,
        owner_id: &str,
    ) -> AppResult<EventDetail> {
        let title = require_text(&request.title, "title")?;
        check_window(request.start_at, request.end_at)?;

        let mut seen = HashSet::new();
        let attendee_ids: Vec<String> = request
            .attendee_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && id != owner_id && seen.insert(id.clone()))
            .collect();
        for attendee in &attendee_ids {
            ensure_live_user(pool, attendee).await?;
        }

        let id = new_id();
        let now = db::now();
        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO calendar_events (id, title, description, start_at, end_at, event_type, color, all_day,
                                         location, owner_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&title)
        .bind(non_blank(request.description))
        .bind(db::timestamp(request.start_at))
        .bind(db::timestamp(request.end_at))
        .bind(non_blank(request.event_type).unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()))
        .bind(non_blank(request.color))
        .bind(request.all_day)
        .bind(non_blank(request.location))
        .bind(owner_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for attendee in &attendee_ids {
            sqlx::query(
                "INSERT INTO event_attendees (event_id, user_id, status, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(attendee)
            .bind(AttendeeStatus::Pending)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(event_id = %id, owner_id = %owner_id, attendees = attendee_ids.len(), "Event created");
        for attendee in &attendee_ids {
            self.invite(pool, &id, &title, attendee).await;
        }
        self.detail(pool, &id).await
    }

    async fn invite(&self, pool: &SqlitePool, event_id: &str, title: &str, user_id: &str) {
        let note = NewNotification::new(
            user_id,
            "event_invite",
            "Event invitation",
            format!("You are invited to \"{}\"", title),
        )
        .with_link(format!("/calendar/events/{}", event_id));
        if let Err(e) = NotificationService::new().notify(pool, note).await {
            warn!(event_id = %event_id, user_id = %user_id, error = %e, "Invitation notification failed");
        }
    }

    /// Partial update by the owner; the resulting window must stay ordered
    pub async fn update(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        request: UpdateEventRequest,
    ) -> AppResult<EventDetail> {
        require_modify(&EventPolicy, pool, id, user_id, "update event").await?;
        let current = self.fetch(pool, id).await?;
        check_window(
            request.start_at.unwrap_or(current.start_at),
            request.end_at.unwrap_or(current.end_at),
        )?;
        let title = non_blank(request.title).map(|t| t.trim().to_string());

        sqlx::query(
            r#"
            UPDATE calendar_events SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                start_at = COALESCE(?, start_at),
                end_at = COALESCE(?, end_at),
                event_type = COALESCE(?, event_type),
                color = COALESCE(?, color),
                all_day = COALESCE(?, all_day),
                location = COALESCE(?, location),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(non_blank(request.description))
        .bind(request.start_at.map(db::timestamp))
        .bind(request.end_at.map(db::timestamp))
        .bind(non_blank(request.event_type))
        .bind(non_blank(request.color))
        .bind(request.all_day)
        .bind(non_blank(request.location))
        .bind(db::now())
        .bind(id)
        .execute(pool)
        .await?;

        self.detail(pool, id).await
    }

    pub async fn reschedule(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> AppResult<EventDetail> {
        check_window(start_at, end_at)?;
        let request = UpdateEventRequest {
            start_at: Some(start_at),
            end_at: Some(end_at),
            ..Default::default()
        };
        self.update(pool, id, user_id, request).await
    }

    pub async fn add_attendee(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        attendee_id: &str,
    ) -> AppResult<EventDetail> {
        require_modify(&EventPolicy, pool, id, user_id, "invite attendee").await?;
        let event = self.fetch(pool, id).await?;
        if attendee_id == event.owner_id {
            return Err(AppError::Validation("The owner cannot attend their own event".to_string()));
        }
        ensure_live_user(pool, attendee_id).await?;

        sqlx::query(
            "INSERT INTO event_attendees (event_id, user_id, status, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(attendee_id)
        .bind(AttendeeStatus::Pending)
        .bind(db::now())
        .execute(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("User is already an attendee".to_string()),
            other => other,
        })?;

        self.invite(pool, id, &event.title, attendee_id).await;
        self.detail(pool, id).await
    }

    pub async fn remove_attendee(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        attendee_id: &str,
    ) -> AppResult<EventDetail> {
        require_modify(&EventPolicy, pool, id, user_id, "remove attendee").await?;

        sqlx::query("DELETE FROM event_attendees WHERE event_id = ? AND user_id = ?")
            .bind(id)
            .bind(attendee_id)
            .execute(pool)
            .await?;
        self.detail(pool, id).await
    }

    /// An invited user accepts or declines
    pub async fn respond(
        &self,
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        status: AttendeeStatus,
    ) -> AppResult<EventDetail> {
        if status == AttendeeStatus::Pending {
            return Err(AppError::Validation("status must be ACCEPTED or DECLINED".to_string()));
        }
        // Makes sure the event is still live
        self.fetch(pool, id).await?;

        let result =
            sqlx::query("UPDATE event_attendees SET status = ? WHERE event_id = ? AND user_id = ?")
                .bind(status)
                .bind(id)
                .bind(user_id)
                .execute(pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Event", id));
        }

        info!(event_id = %id, user_id = %user_id, status = %status, "Invitation answered");
        self.detail(pool, id).await
    }

    pub async fn delete(&self, pool: &SqlitePool, id: &str, user_id: &str) -> AppResult<()> {
        require_modify(&EventPolicy, pool, id, user_id, "delete event").await?;

        sqlx::query("UPDATE calendar_events SET is_deleted = 1, updated_at = ? WHERE id = ?")
            .bind(db::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Soft delete the requester's own events among `ids`
    pub async fn batch_delete(
        &self,
        pool: &SqlitePool,
        ids: &[String],
        user_id: &str,
    ) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE calendar_events SET is_deleted = 1, updated_at = ");
        builder
            .push_bind(db::now())
            .push(" WHERE is_deleted = 0 AND owner_id = ")
            .push_bind(user_id.to_string())
            .push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(pool).await?;
        Ok(result.rows_affected())
    }
}

impl Default for CalendarService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::test_support::seed_user;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
    }

    fn event(title: &str, start: u32, end: u32, attendees: &[&str]) -> CreateEventRequest {
        CreateEventRequest {
            title: title.to_string(),
            description: None,
            start_at: at(start),
            end_at: at(end),
            event_type: None,
            color: None,
            all_day: false,
            location: None,
            attendee_ids: attendees.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_dedups_attendees_and_skips_owner() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let guest = seed_user(&pool, "guest").await;
        let service = CalendarService::new();

        let detail = service
            .create(&pool, event("Standup", 9, 10, &[&guest, &owner, &guest]), &owner)
            .await
            .unwrap();
        assert_eq!(detail.event.event_type, "meeting");
        assert_eq!(detail.attendees.len(), 1);
        assert_eq!(detail.attendees[0].status, AttendeeStatus::Pending);

        let err = service.create(&pool, event("Backwards", 10, 9, &[]), &owner).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_attendee_reads_and_responds() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let guest = seed_user(&pool, "guest").await;
        let stranger = seed_user(&pool, "stranger").await;
        let service = CalendarService::new();

        let detail =
            service.create(&pool, event("Review", 13, 14, &[&guest]), &owner).await.unwrap();
        let id = detail.event.id;

        assert!(service.get(&pool, &id, &guest).await.is_ok());
        let err = service.get(&pool, &id, &stranger).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        let answered = service.respond(&pool, &id, &guest, AttendeeStatus::Accepted).await.unwrap();
        assert_eq!(answered.attendees[0].status, AttendeeStatus::Accepted);
        let err = service
            .respond(&pool, &id, &stranger, AttendeeStatus::Declined)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        let err = service.reschedule(&pool, &id, &guest, at(15), at(16)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
        let moved = service.reschedule(&pool, &id, &owner, at(15), at(16)).await.unwrap();
        assert_eq!(moved.event.start_at, at(15));

        let err = service.add_attendee(&pool, &id, &owner, &guest).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let removed = service.remove_attendee(&pool, &id, &owner, &guest).await.unwrap();
        assert!(removed.attendees.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_attendees_are_rejected() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let service = CalendarService::new();

        let err = service
            .create(&pool, event("Ghosts", 9, 10, &["01NOSUCHUSER"]), &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        assert!(service.list(&pool, &owner, &ListEventsQuery::default()).await.unwrap().is_empty());

        let detail = service.create(&pool, event("Solo", 9, 10, &[]), &owner).await.unwrap();
        let err = service
            .add_attendee(&pool, &detail.event.id, &owner, "01NOSUCHUSER")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_update_ignores_blank_fields() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let service = CalendarService::new();
        let mut request = event("Review", 9, 10, &[]);
        request.location = Some("Room 4".to_string());
        request.color = Some("#ff0000".to_string());
        let detail = service.create(&pool, request, &owner).await.unwrap();

        let blank = UpdateEventRequest {
            title: Some(" ".to_string()),
            description: Some("".to_string()),
            location: Some("".to_string()),
            color: Some("".to_string()),
            ..Default::default()
        };
        let updated = service.update(&pool, &detail.event.id, &owner, blank).await.unwrap();
        assert_eq!(updated.event.title, "Review");
        assert_eq!(updated.event.location.as_deref(), Some("Room 4"));
        assert_eq!(updated.event.color.as_deref(), Some("#ff0000"));
    }

    #[tokio::test]
    async fn test_list_window_and_batch_delete() {
        let pool = connect_in_memory().await.unwrap();
        let owner = seed_user(&pool, "owner").await;
        let other = seed_user(&pool, "other").await;
        let service = CalendarService::new();

        let morning = service.create(&pool, event("Morning", 8, 9, &[]), &owner).await.unwrap();
        service.create(&pool, event("Evening", 18, 19, &[]), &owner).await.unwrap();
        let theirs = service.create(&pool, event("Theirs", 8, 9, &[]), &other).await.unwrap();

        let query = ListEventsQuery {
            start_date: Some(at(7)),
            end_date: Some(at(12)),
        };
        let listed = service.list(&pool, &owner, &query).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Morning");
        let all = service.list(&pool, &owner, &ListEventsQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let ids = vec![morning.event.id.clone(), theirs.event.id.clone()];
        assert_eq!(service.batch_delete(&pool, &ids, &owner).await.unwrap(), 1);
        assert!(service.get(&pool, &theirs.event.id, &other).await.is_ok());

        let late = ListEventsQuery {
            start_date: Some(at(18) - Duration::minutes(1)),
            end_date: None,
        };
        assert_eq!(service.list(&pool, &owner, &late).await.unwrap().len(), 1);
    }
}
