//! Runtime settings and admin-authored definitions.
//!
//! # Responsibility
//! - Read and write key/value settings, including the objective timezone.
//! - Validate habit column and objective SQL before it is stored.
//!
//! # Invariants
//! - A definition whose SQL fails validation is never persisted.

use crate::model::credential::Setting;
use crate::model::objective::{HabitColumn, MonthlyObjective};
use crate::query::validate_snippet;
use crate::repo::habit_repo::{HabitColumnRepository, SqliteHabitColumnRepository};
use crate::repo::objective_repo::{
    ObjectiveRepository, SqliteObjectiveRepository, DEFAULT_OBJECTIVE_TIMEZONE_KEY,
    FALLBACK_OBJECTIVE_TIMEZONE,
};
use crate::repo::setting_repo::{SettingRepository, SqliteSettingRepository};
use crate::service::clock::{resolve_tz, window_in_month};
use crate::service::{ServiceError, ServiceResult};
use chrono::NaiveDate;
use chrono_tz::Tz;
use log::info;
use rusqlite::Connection;

/// Sample day used to dry-run SQL before saving it.
const VALIDATION_SAMPLE_DATE: (i32, u32, u32) = (2024, 1, 1);
const VALIDATION_SAMPLE_TZ: &str = "America/Los_Angeles";

pub struct SettingsService<'conn> {
    conn: &'conn Connection,
    settings: SqliteSettingRepository<'conn>,
    habits: SqliteHabitColumnRepository<'conn>,
    objectives: SqliteObjectiveRepository<'conn>,
}

impl<'conn> SettingsService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            settings: SqliteSettingRepository::new(conn),
            habits: SqliteHabitColumnRepository::new(conn),
            objectives: SqliteObjectiveRepository::new(conn),
        }
    }

    pub fn get(&self, key: &str, default: &str) -> ServiceResult<String> {
        Ok(self.settings.get_or(key, default)?)
    }

    pub fn set(&self, key: &str, value: &str, description: &str) -> ServiceResult<()> {
        self.settings.set(key, value, description)?;
        info!("event=setting_set module=service status=ok key={key}");
        Ok(())
    }

    pub fn list(&self) -> ServiceResult<Vec<Setting>> {
        Ok(self.settings.list()?)
    }

    pub fn default_timezone(&self) -> ServiceResult<Tz> {
        let name = self
            .settings
            .get_or(DEFAULT_OBJECTIVE_TIMEZONE_KEY, FALLBACK_OBJECTIVE_TIMEZONE)?;
        Ok(resolve_tz(&name))
    }

    /// Sets the default objective timezone; the name must be a known IANA zone.
    pub fn set_default_timezone(&self, name: &str) -> ServiceResult<()> {
        if name.trim().parse::<Tz>().is_err() {
            return Err(ServiceError::Validation(format!("unknown timezone `{name}`")));
        }
        self.set(
            DEFAULT_OBJECTIVE_TIMEZONE_KEY,
            name.trim(),
            "Default timezone for new monthly objectives",
        )
    }

    /// Validates the column query against a sample day, then inserts or updates it.
    pub fn save_habit_column(&self, column: &HabitColumn) -> ServiceResult<i64> {
        column.validate()?;
        self.validate_sql(&column.sql_query)?;
        match column.id {
            Some(id) => {
                self.habits.update_column(column)?;
                Ok(id)
            }
            None => Ok(self.habits.create_column(column)?),
        }
    }

    /// Validates the objective definition against a sample day, then inserts or updates it.
    pub fn save_objective(&self, objective: &MonthlyObjective) -> ServiceResult<i64> {
        objective.validate()?;
        self.validate_sql(&objective.objective_definition)?;
        match objective.id {
            Some(id) => {
                self.objectives.update_objective(objective)?;
                Ok(id)
            }
            None => Ok(self.objectives.create_objective(objective)?),
        }
    }

    fn validate_sql(&self, sql: &str) -> ServiceResult<f64> {
        let (y, m, d) = VALIDATION_SAMPLE_DATE;
        let sample_day = NaiveDate::from_ymd_opt(y, m, d)
            .ok_or_else(|| ServiceError::Validation("invalid sample date".to_string()))?;
        let window = window_in_month(sample_day, resolve_tz(VALIDATION_SAMPLE_TZ));
        Ok(validate_snippet(self.conn, sql, &window)?)
    }
}

#[cfg(test)]
mod tests {
    use super::SettingsService;
    use crate::db::open_db_in_memory;
    use crate::model::objective::HabitColumn;
    use crate::service::ServiceError;
    use chrono_tz::Tz;

    #[test]
    fn invalid_habit_sql_is_not_saved() {
        let conn = open_db_in_memory().unwrap();
        let service = SettingsService::new(&conn);
        let column = HabitColumn::new("bad", "Bad", "UPDATE settings SET value = 1");
        assert!(matches!(
            service.save_habit_column(&column),
            Err(ServiceError::Query(_))
        ));
        let good = HabitColumn::new(
            "fasts",
            "Fasting",
            "SELECT COUNT(*) FROM fasting_sessions WHERE fast_end_at BETWEEN :day_start AND :day_end",
        );
        assert!(service.save_habit_column(&good).is_ok());
    }

    #[test]
    fn default_timezone_round_trips_through_settings() {
        let conn = open_db_in_memory().unwrap();
        let service = SettingsService::new(&conn);
        assert_eq!(service.default_timezone().unwrap(), Tz::America__Chicago);
        service.set_default_timezone("Asia/Tokyo").unwrap();
        assert_eq!(service.default_timezone().unwrap(), Tz::Asia__Tokyo);
        assert!(service.set_default_timezone("Nowhere/Else").is_err());
    }
}
