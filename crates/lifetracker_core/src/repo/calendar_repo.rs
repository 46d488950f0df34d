//! Stored calendar events, unique on the provider event id.

use crate::model::activity::CalendarEvent;
use crate::model::record::UpsertOutcome;
use crate::repo::{bool_to_int, from_millis, int_to_bool, to_millis, RepoResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub trait CalendarRepository {
    fn upsert_event(&self, event: &CalendarEvent) -> RepoResult<UpsertOutcome>;
    /// Events intersecting `[start, end)`, ordered by start.
    fn events_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<CalendarEvent>>;
}

pub struct SqliteCalendarRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCalendarRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CalendarRepository for SqliteCalendarRepository<'_> {
    fn upsert_event(&self, event: &CalendarEvent) -> RepoResult<UpsertOutcome> {
        event.validate()?;
        let existing = self
            .conn
            .query_row(
                "SELECT 1 FROM calendar_events WHERE outlook_id = ?1;",
                [&event.outlook_id],
                |_| Ok(()),
            )
            .optional()?;
        self.conn.execute(
            "INSERT INTO calendar_events (
                outlook_id, subject, start_at, end_at, is_all_day, location, organizer, body_preview
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (outlook_id) DO UPDATE SET
                subject = excluded.subject,
                start_at = excluded.start_at,
                end_at = excluded.end_at,
                is_all_day = excluded.is_all_day,
                location = excluded.location,
                organizer = excluded.organizer,
                body_preview = excluded.body_preview,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                event.outlook_id,
                event.subject,
                to_millis(event.start),
                to_millis(event.end),
                bool_to_int(event.is_all_day),
                event.location,
                event.organizer,
                event.body_preview,
            ],
        )?;
        Ok(if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    fn events_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<CalendarEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT outlook_id, subject, start_at, end_at, is_all_day, location, organizer,
                    body_preview
             FROM calendar_events
             WHERE start_at < ?2 AND end_at > ?1
             ORDER BY start_at ASC;",
        )?;
        let mut rows = stmt.query(params![to_millis(start), to_millis(end)])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(CalendarEvent {
                outlook_id: row.get("outlook_id")?,
                subject: row.get("subject")?,
                start: from_millis("calendar_events.start_at", row.get("start_at")?)?,
                end: from_millis("calendar_events.end_at", row.get("end_at")?)?,
                is_all_day: int_to_bool("calendar_events.is_all_day", row.get("is_all_day")?)?,
                location: row.get("location")?,
                organizer: row.get("organizer")?,
                body_preview: row.get("body_preview")?,
            });
        }
        Ok(events)
    }
}
