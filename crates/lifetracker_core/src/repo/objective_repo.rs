//! Monthly objective persistence.
//!
//! # Invariants
//! - Objectives are listed by `start DESC, label ASC`.
//! - A new objective without a timezone takes the value of the
//!   `default_timezone_for_monthly_objectives` setting.

use crate::model::objective::{month_bounds, MonthlyObjective};
use crate::repo::setting_repo::{SettingRepository, SqliteSettingRepository};
use crate::repo::{date_from_db, date_to_db, from_millis, to_millis, RepoError, RepoResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

pub const DEFAULT_OBJECTIVE_TIMEZONE_KEY: &str = "default_timezone_for_monthly_objectives";
pub const FALLBACK_OBJECTIVE_TIMEZONE: &str = "America/Chicago";

const OBJECTIVE_SELECT_SQL: &str = "SELECT
    id,
    start_date,
    end_date,
    label,
    objective_value,
    objective_definition,
    timezone,
    category,
    unit_of_measurement,
    result,
    result_updated_at
FROM monthly_objectives";

pub trait ObjectiveRepository {
    /// Inserts a new objective and returns its id.
    fn create_objective(&self, objective: &MonthlyObjective) -> RepoResult<i64>;
    fn update_objective(&self, objective: &MonthlyObjective) -> RepoResult<()>;
    fn get_objective(&self, id: i64) -> RepoResult<Option<MonthlyObjective>>;
    fn delete_objective(&self, id: i64) -> RepoResult<()>;
    fn list_objectives(&self) -> RepoResult<Vec<MonthlyObjective>>;
    /// Objectives fully contained in the given calendar month.
    fn list_for_month(&self, year: i32, month: u32) -> RepoResult<Vec<MonthlyObjective>>;
    fn store_result(&self, id: i64, result: f64, at: DateTime<Utc>) -> RepoResult<()>;
}

pub struct SqliteObjectiveRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteObjectiveRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn resolve_timezone(&self, objective: &MonthlyObjective) -> RepoResult<String> {
        match objective.timezone.as_deref().map(str::trim) {
            Some(tz) if !tz.is_empty() => Ok(tz.to_string()),
            _ => SqliteSettingRepository::new(self.conn)
                .get_or(DEFAULT_OBJECTIVE_TIMEZONE_KEY, FALLBACK_OBJECTIVE_TIMEZONE),
        }
    }

    fn query_objectives(
        &self,
        sql: &str,
        bind: impl rusqlite::Params,
    ) -> RepoResult<Vec<MonthlyObjective>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(bind)?;
        let mut objectives = Vec::new();
        while let Some(row) = rows.next()? {
            objectives.push(parse_objective_row(row)?);
        }
        Ok(objectives)
    }
}

impl ObjectiveRepository for SqliteObjectiveRepository<'_> {
    fn create_objective(&self, objective: &MonthlyObjective) -> RepoResult<i64> {
        objective.validate()?;
        let timezone = self.resolve_timezone(objective)?;
        self.conn.execute(
            "INSERT INTO monthly_objectives (
                start_date, end_date, label, objective_value, objective_definition,
                timezone, category, unit_of_measurement
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                date_to_db(objective.start),
                date_to_db(objective.end),
                objective.label.trim(),
                objective.objective_value,
                objective.objective_definition,
                timezone,
                objective.category,
                objective.unit_of_measurement,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_objective(&self, objective: &MonthlyObjective) -> RepoResult<()> {
        objective.validate()?;
        let id = objective
            .id
            .ok_or_else(|| RepoError::InvalidData("objective update requires an id".into()))?;
        let timezone = self.resolve_timezone(objective)?;
        let changed = self.conn.execute(
            "UPDATE monthly_objectives
             SET start_date = ?1,
                 end_date = ?2,
                 label = ?3,
                 objective_value = ?4,
                 objective_definition = ?5,
                 timezone = ?6,
                 category = ?7,
                 unit_of_measurement = ?8,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?9;",
            params![
                date_to_db(objective.start),
                date_to_db(objective.end),
                objective.label.trim(),
                objective.objective_value,
                objective.objective_definition,
                timezone,
                objective.category,
                objective.unit_of_measurement,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("objective", id));
        }
        Ok(())
    }

    fn get_objective(&self, id: i64) -> RepoResult<Option<MonthlyObjective>> {
        let mut found =
            self.query_objectives(&format!("{OBJECTIVE_SELECT_SQL} WHERE id = ?1;"), [id])?;
        Ok(found.pop())
    }

    fn delete_objective(&self, id: i64) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM monthly_objectives WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("objective", id));
        }
        Ok(())
    }

    fn list_objectives(&self) -> RepoResult<Vec<MonthlyObjective>> {
        self.query_objectives(
            &format!("{OBJECTIVE_SELECT_SQL} ORDER BY start_date DESC, label ASC;"),
            params![],
        )
    }

    fn list_for_month(&self, year: i32, month: u32) -> RepoResult<Vec<MonthlyObjective>> {
        let (first, last) = month_bounds(year, month)
            .ok_or_else(|| RepoError::InvalidData(format!("invalid month {year}-{month}")))?;
        self.query_objectives(
            &format!(
                "{OBJECTIVE_SELECT_SQL}
                 WHERE start_date >= ?1 AND end_date <= ?2
                 ORDER BY label ASC;"
            ),
            params![date_to_db(first), date_to_db(last)],
        )
    }

    fn store_result(&self, id: i64, result: f64, at: DateTime<Utc>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE monthly_objectives
             SET result = ?1, result_updated_at = ?2
             WHERE id = ?3;",
            params![result, to_millis(at), id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("objective", id));
        }
        Ok(())
    }
}

fn parse_objective_row(row: &Row<'_>) -> RepoResult<MonthlyObjective> {
    let start: String = row.get("start_date")?;
    let end: String = row.get("end_date")?;
    let result_updated_at = match row.get::<_, Option<i64>>("result_updated_at")? {
        Some(ms) => Some(from_millis("monthly_objectives.result_updated_at", ms)?),
        None => None,
    };
    Ok(MonthlyObjective {
        id: Some(row.get("id")?),
        start: date_from_db("monthly_objectives.start_date", &start)?,
        end: date_from_db("monthly_objectives.end_date", &end)?,
        label: row.get("label")?,
        objective_value: row.get("objective_value")?,
        objective_definition: row.get("objective_definition")?,
        timezone: Some(row.get("timezone")?),
        category: row.get("category")?,
        unit_of_measurement: row.get("unit_of_measurement")?,
        result: row.get("result")?,
        result_updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::{ObjectiveRepository, SqliteObjectiveRepository, DEFAULT_OBJECTIVE_TIMEZONE_KEY};
    use crate::db::open_db_in_memory;
    use crate::model::objective::MonthlyObjective;
    use crate::repo::setting_repo::{SettingRepository, SqliteSettingRepository};

    #[test]
    fn new_objective_takes_fallback_timezone() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteObjectiveRepository::new(&conn);
        let objective = MonthlyObjective::for_month(2025, 11, "Runs", 12.0, "SELECT 1").unwrap();
        let id = repo.create_objective(&objective).unwrap();
        let stored = repo.get_objective(id).unwrap().unwrap();
        assert_eq!(stored.timezone.as_deref(), Some("America/Chicago"));
    }

    #[test]
    fn new_objective_takes_configured_default_timezone() {
        let conn = open_db_in_memory().unwrap();
        SqliteSettingRepository::new(&conn)
            .set(DEFAULT_OBJECTIVE_TIMEZONE_KEY, "Europe/Berlin", "")
            .unwrap();
        let repo = SqliteObjectiveRepository::new(&conn);
        let objective = MonthlyObjective::for_month(2025, 11, "Runs", 12.0, "SELECT 1").unwrap();
        let id = repo.create_objective(&objective).unwrap();
        let stored = repo.get_objective(id).unwrap().unwrap();
        assert_eq!(stored.timezone.as_deref(), Some("Europe/Berlin"));
    }

    #[test]
    fn list_for_month_excludes_other_months() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteObjectiveRepository::new(&conn);
        for (month, label) in [(10, "October"), (11, "November")] {
            let objective = MonthlyObjective::for_month(2025, month, label, 1.0, "SELECT 1").unwrap();
            repo.create_objective(&objective).unwrap();
        }
        let november = repo.list_for_month(2025, 11).unwrap();
        assert_eq!(november.len(), 1);
        assert_eq!(november[0].label, "November");
    }
}
