//! Manual activity logging: fasts and daily habit logs.

use crate::model::activity::{WritingLog, YouTubeAvoidanceLog};
use crate::model::health::{FastingSession, WaistMeasurement};
use crate::model::record::SourceKey;
use crate::repo::record_repo::{SqliteSyncedRecordRepository, SyncedRecordRepository};
use crate::service::{ServiceError, ServiceResult};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use rusqlite::Connection;

/// Fast lengths offered by the activity logger.
pub const ALLOWED_FAST_HOURS: [u32; 3] = [12, 16, 18];

pub struct ActivityService<R: SyncedRecordRepository> {
    records: R,
}

impl<'conn> ActivityService<SqliteSyncedRecordRepository<'conn>> {
    pub fn sqlite(conn: &'conn Connection) -> Self {
        Self::new(SqliteSyncedRecordRepository::new(conn))
    }
}

impl<R: SyncedRecordRepository> ActivityService<R> {
    pub fn new(records: R) -> Self {
        Self { records }
    }

    /// Records a fast of `hours` that ends at `now`.
    pub fn log_fast(&self, hours: u32, now: DateTime<Utc>) -> ServiceResult<FastingSession> {
        if !ALLOWED_FAST_HOURS.contains(&hours) {
            return Err(ServiceError::Validation(
                "Fast duration must be 12, 16, or 18 hours".to_string(),
            ));
        }
        let session = FastingSession {
            key: SourceKey::manual(),
            duration_hours: f64::from(hours),
            fast_end: now,
        };
        self.records.upsert_fasting_session(&session)?;
        info!("event=fast_log module=service status=ok hours={hours}");
        Ok(session)
    }

    pub fn log_waist(&self, date: NaiveDate, inches: f64) -> ServiceResult<WaistMeasurement> {
        let entry = WaistMeasurement {
            key: SourceKey::manual(),
            log_date: date,
            inches,
        };
        self.records.upsert_waist_measurement(&entry)?;
        Ok(entry)
    }

    pub fn log_youtube_avoidance(&self, date: NaiveDate) -> ServiceResult<YouTubeAvoidanceLog> {
        let entry = YouTubeAvoidanceLog {
            key: SourceKey::manual(),
            log_date: date,
        };
        self.records.upsert_youtube_avoidance(&entry)?;
        Ok(entry)
    }

    pub fn log_writing(&self, date: NaiveDate, hours: Option<f64>) -> ServiceResult<WritingLog> {
        let entry = WritingLog {
            key: SourceKey::manual(),
            log_date: date,
            duration_hours: hours,
        };
        self.records.upsert_writing_log(&entry)?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::ActivityService;
    use crate::db::open_db_in_memory;
    use crate::repo::record_repo::{RecordTable, SyncedRecordRepository};
    use crate::service::ServiceError;
    use chrono::Utc;

    #[test]
    fn only_offered_fast_lengths_are_accepted() {
        let conn = open_db_in_memory().unwrap();
        let service = ActivityService::sqlite(&conn);
        assert!(matches!(
            service.log_fast(14, Utc::now()),
            Err(ServiceError::Validation(_))
        ));
        let fast = service.log_fast(16, Utc::now()).unwrap();
        assert_eq!(fast.key.source, "Manual");
        assert_eq!(fast.key.source_id.len(), 36);
        assert!(service
            .records
            .record_exists(RecordTable::FastingSessions, &fast.key)
            .unwrap());
    }
}
