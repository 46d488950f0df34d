//! Source-keyed record repository for synced and manually logged data.
//!
//! # Responsibility
//! - Upsert every synced record type on its `(source, source_id)` key.
//! - Serve range reads used by reports and the agenda time totals.
//!
//! # Invariants
//! - Every write path validates the model value first.
//! - Upserts report whether the key was new (`Created`) or existing (`Updated`).
//! - Time-log goal links are replaced as a whole inside one transaction.

use crate::model::activity::{TimeLog, WritingLog, YouTubeAvoidanceLog};
use crate::model::health::{FastingSession, NutritionEntry, WaistMeasurement, WeighIn, Workout};
use crate::model::record::{SourceKey, UpsertOutcome};
use crate::repo::{date_from_db, date_to_db, from_millis, to_millis, RepoResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Tables keyed by `(source, source_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTable {
    Workouts,
    WeighIns,
    FastingSessions,
    NutritionEntries,
    TimeLogs,
    WaistMeasurements,
    YouTubeAvoidanceLogs,
    WritingLogs,
}

impl RecordTable {
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Workouts => "workouts",
            Self::WeighIns => "weigh_ins",
            Self::FastingSessions => "fasting_sessions",
            Self::NutritionEntries => "nutrition_entries",
            Self::TimeLogs => "time_logs",
            Self::WaistMeasurements => "waist_measurements",
            Self::YouTubeAvoidanceLogs => "youtube_avoidance_logs",
            Self::WritingLogs => "writing_logs",
        }
    }
}

/// Repository interface for source-keyed records.
pub trait SyncedRecordRepository {
    /// Returns true when a row with `key` already exists in `table`.
    fn record_exists(&self, table: RecordTable, key: &SourceKey) -> RepoResult<bool>;
    fn upsert_workout(&self, workout: &Workout) -> RepoResult<UpsertOutcome>;
    fn upsert_weigh_in(&self, weigh_in: &WeighIn) -> RepoResult<UpsertOutcome>;
    fn upsert_fasting_session(&self, session: &FastingSession) -> RepoResult<UpsertOutcome>;
    fn upsert_nutrition_entry(&self, entry: &NutritionEntry) -> RepoResult<UpsertOutcome>;
    /// Upserts a time log and replaces its goal links.
    fn upsert_time_log(&self, log: &TimeLog) -> RepoResult<UpsertOutcome>;
    fn upsert_waist_measurement(&self, entry: &WaistMeasurement) -> RepoResult<UpsertOutcome>;
    fn upsert_youtube_avoidance(&self, entry: &YouTubeAvoidanceLog) -> RepoResult<UpsertOutcome>;
    fn upsert_writing_log(&self, entry: &WritingLog) -> RepoResult<UpsertOutcome>;

    fn list_workouts(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepoResult<Vec<Workout>>;
    fn list_weigh_ins(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepoResult<Vec<WeighIn>>;
    fn list_fasting_sessions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<FastingSession>>;
    fn list_nutrition_entries(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<NutritionEntry>>;
    /// Time logs whose start falls in `[start, end)`, each with its goal ids.
    fn list_time_logs(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepoResult<Vec<TimeLog>>;
    fn list_waist_measurements(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<WaistMeasurement>>;
    fn latest_weigh_in(&self) -> RepoResult<Option<WeighIn>>;
    fn latest_fasting_session(&self) -> RepoResult<Option<FastingSession>>;
    /// Total seconds logged against a project (and optional goal) for logs
    /// starting in `[start, end)`.
    fn total_logged_seconds(
        &self,
        project_id: i64,
        goal_id: Option<i64>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<i64>;
}

/// SQLite-backed record repository.
pub struct SqliteSyncedRecordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSyncedRecordRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn outcome_for(&self, table: RecordTable, key: &SourceKey) -> RepoResult<UpsertOutcome> {
        if self.record_exists(table, key)? {
            Ok(UpsertOutcome::Updated)
        } else {
            Ok(UpsertOutcome::Created)
        }
    }
}

impl SyncedRecordRepository for SqliteSyncedRecordRepository<'_> {
    fn record_exists(&self, table: RecordTable, key: &SourceKey) -> RepoResult<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE source = ?1 AND source_id = ?2 LIMIT 1;",
            table.table_name()
        );
        let found = self
            .conn
            .query_row(&sql, params![key.source, key.source_id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn upsert_workout(&self, workout: &Workout) -> RepoResult<UpsertOutcome> {
        workout.validate()?;
        let outcome = self.outcome_for(RecordTable::Workouts, &workout.key)?;
        self.conn.execute(
            "INSERT INTO workouts (
                source, source_id, start_at, end_at, timezone_offset, sport_id,
                average_heart_rate, max_heart_rate, calories_burned
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (source, source_id) DO UPDATE SET
                start_at = excluded.start_at,
                end_at = excluded.end_at,
                timezone_offset = excluded.timezone_offset,
                sport_id = excluded.sport_id,
                average_heart_rate = excluded.average_heart_rate,
                max_heart_rate = excluded.max_heart_rate,
                calories_burned = excluded.calories_burned,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                workout.key.source,
                workout.key.source_id,
                to_millis(workout.start),
                to_millis(workout.end),
                workout.timezone_offset,
                workout.sport_id,
                workout.average_heart_rate,
                workout.max_heart_rate,
                workout.calories_burned,
            ],
        )?;
        Ok(outcome)
    }

    fn upsert_weigh_in(&self, weigh_in: &WeighIn) -> RepoResult<UpsertOutcome> {
        weigh_in.validate()?;
        let outcome = self.outcome_for(RecordTable::WeighIns, &weigh_in.key)?;
        self.conn.execute(
            "INSERT INTO weigh_ins (source, source_id, measured_at, weight_lbs)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (source, source_id) DO UPDATE SET
                measured_at = excluded.measured_at,
                weight_lbs = excluded.weight_lbs,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                weigh_in.key.source,
                weigh_in.key.source_id,
                to_millis(weigh_in.measured_at),
                weigh_in.weight_lbs,
            ],
        )?;
        Ok(outcome)
    }

    fn upsert_fasting_session(&self, session: &FastingSession) -> RepoResult<UpsertOutcome> {
        session.validate()?;
        let outcome = self.outcome_for(RecordTable::FastingSessions, &session.key)?;
        self.conn.execute(
            "INSERT INTO fasting_sessions (source, source_id, duration_hours, fast_end_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (source, source_id) DO UPDATE SET
                duration_hours = excluded.duration_hours,
                fast_end_at = excluded.fast_end_at,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                session.key.source,
                session.key.source_id,
                session.duration_hours,
                to_millis(session.fast_end),
            ],
        )?;
        Ok(outcome)
    }

    fn upsert_nutrition_entry(&self, entry: &NutritionEntry) -> RepoResult<UpsertOutcome> {
        entry.validate()?;
        let outcome = self.outcome_for(RecordTable::NutritionEntries, &entry.key)?;
        self.conn.execute(
            "INSERT INTO nutrition_entries (
                source, source_id, consumed_at, calories, fat, carbs, protein
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (source, source_id) DO UPDATE SET
                consumed_at = excluded.consumed_at,
                calories = excluded.calories,
                fat = excluded.fat,
                carbs = excluded.carbs,
                protein = excluded.protein,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                entry.key.source,
                entry.key.source_id,
                to_millis(entry.consumed_at),
                entry.calories,
                entry.fat,
                entry.carbs,
                entry.protein,
            ],
        )?;
        Ok(outcome)
    }

    fn upsert_time_log(&self, log: &TimeLog) -> RepoResult<UpsertOutcome> {
        log.validate()?;
        let outcome = self.outcome_for(RecordTable::TimeLogs, &log.key)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO time_logs (source, source_id, start_at, end_at, project_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (source, source_id) DO UPDATE SET
                start_at = excluded.start_at,
                end_at = excluded.end_at,
                project_id = excluded.project_id,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                log.key.source,
                log.key.source_id,
                to_millis(log.start),
                to_millis(log.end),
                log.project_id,
            ],
        )?;
        let time_log_id: i64 = tx.query_row(
            "SELECT id FROM time_logs WHERE source = ?1 AND source_id = ?2;",
            params![log.key.source, log.key.source_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "DELETE FROM time_log_goals WHERE time_log_id = ?1;",
            [time_log_id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO time_log_goals (time_log_id, goal_id) VALUES (?1, ?2);",
            )?;
            for goal_id in &log.goal_ids {
                insert.execute(params![time_log_id, goal_id])?;
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn upsert_waist_measurement(&self, entry: &WaistMeasurement) -> RepoResult<UpsertOutcome> {
        entry.validate()?;
        let outcome = self.outcome_for(RecordTable::WaistMeasurements, &entry.key)?;
        self.conn.execute(
            "INSERT INTO waist_measurements (source, source_id, log_date, inches)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (source, source_id) DO UPDATE SET
                log_date = excluded.log_date,
                inches = excluded.inches,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                entry.key.source,
                entry.key.source_id,
                date_to_db(entry.log_date),
                entry.inches,
            ],
        )?;
        Ok(outcome)
    }

    fn upsert_youtube_avoidance(&self, entry: &YouTubeAvoidanceLog) -> RepoResult<UpsertOutcome> {
        entry.key.validate()?;
        let outcome = self.outcome_for(RecordTable::YouTubeAvoidanceLogs, &entry.key)?;
        self.conn.execute(
            "INSERT INTO youtube_avoidance_logs (source, source_id, log_date)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (source, source_id) DO UPDATE SET
                log_date = excluded.log_date,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                entry.key.source,
                entry.key.source_id,
                date_to_db(entry.log_date)
            ],
        )?;
        Ok(outcome)
    }

    fn upsert_writing_log(&self, entry: &WritingLog) -> RepoResult<UpsertOutcome> {
        entry.validate()?;
        let outcome = self.outcome_for(RecordTable::WritingLogs, &entry.key)?;
        self.conn.execute(
            "INSERT INTO writing_logs (source, source_id, log_date, duration_hours)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (source, source_id) DO UPDATE SET
                log_date = excluded.log_date,
                duration_hours = excluded.duration_hours,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                entry.key.source,
                entry.key.source_id,
                date_to_db(entry.log_date),
                entry.duration_hours,
            ],
        )?;
        Ok(outcome)
    }

    fn list_workouts(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepoResult<Vec<Workout>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, source_id, start_at, end_at, timezone_offset, sport_id,
                    average_heart_rate, max_heart_rate, calories_burned
             FROM workouts
             WHERE start_at >= ?1 AND start_at < ?2
             ORDER BY start_at ASC;",
        )?;
        let mut rows = stmt.query(params![to_millis(start), to_millis(end)])?;
        let mut workouts = Vec::new();
        while let Some(row) = rows.next()? {
            workouts.push(Workout {
                key: parse_key(row)?,
                start: from_millis("workouts.start_at", row.get("start_at")?)?,
                end: from_millis("workouts.end_at", row.get("end_at")?)?,
                timezone_offset: row.get("timezone_offset")?,
                sport_id: row.get("sport_id")?,
                average_heart_rate: row.get("average_heart_rate")?,
                max_heart_rate: row.get("max_heart_rate")?,
                calories_burned: row.get("calories_burned")?,
            });
        }
        Ok(workouts)
    }

    fn list_weigh_ins(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepoResult<Vec<WeighIn>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, source_id, measured_at, weight_lbs
             FROM weigh_ins
             WHERE measured_at >= ?1 AND measured_at < ?2
             ORDER BY measured_at ASC;",
        )?;
        let mut rows = stmt.query(params![to_millis(start), to_millis(end)])?;
        let mut weigh_ins = Vec::new();
        while let Some(row) = rows.next()? {
            weigh_ins.push(parse_weigh_in(row)?);
        }
        Ok(weigh_ins)
    }

    fn list_fasting_sessions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<FastingSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, source_id, duration_hours, fast_end_at
             FROM fasting_sessions
             WHERE fast_end_at >= ?1 AND fast_end_at < ?2
             ORDER BY fast_end_at ASC;",
        )?;
        let mut rows = stmt.query(params![to_millis(start), to_millis(end)])?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(parse_fasting_session(row)?);
        }
        Ok(sessions)
    }

    fn list_nutrition_entries(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<NutritionEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, source_id, consumed_at, calories, fat, carbs, protein
             FROM nutrition_entries
             WHERE consumed_at >= ?1 AND consumed_at < ?2
             ORDER BY consumed_at ASC;",
        )?;
        let mut rows = stmt.query(params![to_millis(start), to_millis(end)])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(NutritionEntry {
                key: parse_key(row)?,
                consumed_at: from_millis("nutrition_entries.consumed_at", row.get("consumed_at")?)?,
                calories: row.get("calories")?,
                fat: row.get("fat")?,
                carbs: row.get("carbs")?,
                protein: row.get("protein")?,
            });
        }
        Ok(entries)
    }

    fn list_time_logs(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepoResult<Vec<TimeLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, source_id, start_at, end_at, project_id
             FROM time_logs
             WHERE start_at >= ?1 AND start_at < ?2
             ORDER BY start_at ASC;",
        )?;
        let mut goals_stmt = self.conn.prepare(
            "SELECT goal_id FROM time_log_goals WHERE time_log_id = ?1 ORDER BY goal_id ASC;",
        )?;
        let mut rows = stmt.query(params![to_millis(start), to_millis(end)])?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get("id")?;
            let goal_ids = goals_stmt
                .query_map([id], |goal_row| goal_row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            logs.push(TimeLog {
                key: parse_key(row)?,
                start: from_millis("time_logs.start_at", row.get("start_at")?)?,
                end: from_millis("time_logs.end_at", row.get("end_at")?)?,
                project_id: row.get("project_id")?,
                goal_ids,
            });
        }
        Ok(logs)
    }

    fn list_waist_measurements(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<WaistMeasurement>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, source_id, log_date, inches
             FROM waist_measurements
             WHERE log_date >= ?1 AND log_date <= ?2
             ORDER BY log_date ASC;",
        )?;
        let mut rows = stmt.query(params![date_to_db(from), date_to_db(to)])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let log_date: String = row.get("log_date")?;
            entries.push(WaistMeasurement {
                key: parse_key(row)?,
                log_date: date_from_db("waist_measurements.log_date", &log_date)?,
                inches: row.get("inches")?,
            });
        }
        Ok(entries)
    }

    fn latest_weigh_in(&self) -> RepoResult<Option<WeighIn>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, source_id, measured_at, weight_lbs
             FROM weigh_ins
             ORDER BY measured_at DESC
             LIMIT 1;",
        )?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_weigh_in(row)?));
        }
        Ok(None)
    }

    fn latest_fasting_session(&self) -> RepoResult<Option<FastingSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, source_id, duration_hours, fast_end_at
             FROM fasting_sessions
             ORDER BY fast_end_at DESC
             LIMIT 1;",
        )?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_fasting_session(row)?));
        }
        Ok(None)
    }

    fn total_logged_seconds(
        &self,
        project_id: i64,
        goal_id: Option<i64>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<i64> {
        let total_ms: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(t.end_at - t.start_at), 0)
             FROM time_logs t
             WHERE t.project_id = ?1
               AND t.start_at >= ?2
               AND t.start_at < ?3
               AND (?4 IS NULL OR EXISTS (
                    SELECT 1 FROM time_log_goals g
                    WHERE g.time_log_id = t.id AND g.goal_id = ?4
               ));",
            params![project_id, to_millis(start), to_millis(end), goal_id],
            |row| row.get(0),
        )?;
        Ok(total_ms / 1000)
    }
}

fn parse_key(row: &Row<'_>) -> RepoResult<SourceKey> {
    Ok(SourceKey::new(
        row.get::<_, String>("source")?,
        row.get::<_, String>("source_id")?,
    ))
}

fn parse_weigh_in(row: &Row<'_>) -> RepoResult<WeighIn> {
    Ok(WeighIn {
        key: parse_key(row)?,
        measured_at: from_millis("weigh_ins.measured_at", row.get("measured_at")?)?,
        weight_lbs: row.get("weight_lbs")?,
    })
}

fn parse_fasting_session(row: &Row<'_>) -> RepoResult<FastingSession> {
    Ok(FastingSession {
        key: parse_key(row)?,
        duration_hours: row.get("duration_hours")?,
        fast_end: from_millis("fasting_sessions.fast_end_at", row.get("fast_end_at")?)?,
    })
}
