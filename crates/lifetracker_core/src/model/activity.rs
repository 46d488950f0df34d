//! Time tracking and daily habit logs.

use crate::model::record::{require_non_negative, require_text, ModelValidationError, SourceKey};
use chrono::{DateTime, NaiveDate, Utc};

/// One tracked block of time against a project and zero or more goals.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeLog {
    pub key: SourceKey,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub project_id: Option<i64>,
    /// Goal links; replaced wholesale on every upsert.
    pub goal_ids: Vec<i64>,
}

impl TimeLog {
    pub fn duration_minutes(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 60.0
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        self.key.validate()?;
        if self.end < self.start {
            return Err(ModelValidationError::InvalidTimeRange { field: "time_log" });
        }
        Ok(())
    }
}

/// A day on which YouTube was avoided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YouTubeAvoidanceLog {
    pub key: SourceKey,
    pub log_date: NaiveDate,
}

/// A day with a writing session.
#[derive(Debug, Clone, PartialEq)]
pub struct WritingLog {
    pub key: SourceKey,
    pub log_date: NaiveDate,
    pub duration_hours: Option<f64>,
}

impl WritingLog {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        self.key.validate()?;
        if let Some(hours) = self.duration_hours {
            require_non_negative("duration_hours", hours)?;
        }
        Ok(())
    }
}

/// Calendar event imported from an external calendar, unique on `outlook_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub outlook_id: String,
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: String,
    pub organizer: String,
    pub body_preview: String,
}

impl CalendarEvent {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("outlook_id", &self.outlook_id)?;
        require_text("subject", &self.subject)?;
        if self.end < self.start {
            return Err(ModelValidationError::InvalidTimeRange {
                field: "calendar_event",
            });
        }
        Ok(())
    }

    /// Returns true when the event intersects `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}
