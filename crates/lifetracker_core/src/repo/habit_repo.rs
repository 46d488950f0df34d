//! Habit grid column persistence.
//!
//! # Invariants
//! - `column_name` is unique; duplicates surface as `RepoError::Conflict`.
//! - Listing order is `sort_order ASC, id ASC`.

use crate::model::objective::{HabitColumn, HabitEndDate};
use crate::repo::{
    bool_to_int, date_from_db, date_to_db, int_to_bool, is_unique_violation, RepoError,
    RepoResult,
};
use rusqlite::{params, Connection, Row};

const HABIT_SELECT_SQL: &str = "SELECT
    id,
    column_name,
    display_name,
    tooltip_text,
    total_column_text,
    sql_query,
    details_display,
    icon,
    sort_order,
    enabled,
    start_date,
    end_date,
    parent_id
FROM habit_columns";

pub trait HabitColumnRepository {
    fn create_column(&self, column: &HabitColumn) -> RepoResult<i64>;
    fn update_column(&self, column: &HabitColumn) -> RepoResult<()>;
    fn get_column(&self, id: i64) -> RepoResult<Option<HabitColumn>>;
    fn delete_column(&self, id: i64) -> RepoResult<()>;
    /// Lists columns in display order, optionally only enabled ones.
    fn list_columns(&self, enabled_only: bool) -> RepoResult<Vec<HabitColumn>>;
}

pub struct SqliteHabitColumnRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHabitColumnRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl HabitColumnRepository for SqliteHabitColumnRepository<'_> {
    fn create_column(&self, column: &HabitColumn) -> RepoResult<i64> {
        column.validate()?;
        self.conn
            .execute(
                "INSERT INTO habit_columns (
                    column_name, display_name, tooltip_text, total_column_text, sql_query,
                    details_display, icon, sort_order, enabled, start_date, end_date, parent_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
                params![
                    column.column_name.trim(),
                    column.display_name.trim(),
                    column.tooltip_text,
                    column.total_column_text,
                    column.sql_query,
                    column.details_display,
                    column.icon,
                    column.order,
                    bool_to_int(column.enabled),
                    column.start_date.map(date_to_db),
                    column.end_date.as_db(),
                    column.parent_id,
                ],
            )
            .map_err(|err| map_unique(err, &column.column_name))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_column(&self, column: &HabitColumn) -> RepoResult<()> {
        column.validate()?;
        let id = column
            .id
            .ok_or_else(|| RepoError::InvalidData("habit column update requires an id".into()))?;
        let changed = self
            .conn
            .execute(
                "UPDATE habit_columns
                 SET column_name = ?1,
                     display_name = ?2,
                     tooltip_text = ?3,
                     total_column_text = ?4,
                     sql_query = ?5,
                     details_display = ?6,
                     icon = ?7,
                     sort_order = ?8,
                     enabled = ?9,
                     start_date = ?10,
                     end_date = ?11,
                     parent_id = ?12,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?13;",
                params![
                    column.column_name.trim(),
                    column.display_name.trim(),
                    column.tooltip_text,
                    column.total_column_text,
                    column.sql_query,
                    column.details_display,
                    column.icon,
                    column.order,
                    bool_to_int(column.enabled),
                    column.start_date.map(date_to_db),
                    column.end_date.as_db(),
                    column.parent_id,
                    id,
                ],
            )
            .map_err(|err| map_unique(err, &column.column_name))?;
        if changed == 0 {
            return Err(RepoError::not_found("habit column", id));
        }
        Ok(())
    }

    fn get_column(&self, id: i64) -> RepoResult<Option<HabitColumn>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{HABIT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_column_row(row)?));
        }
        Ok(None)
    }

    fn delete_column(&self, id: i64) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM habit_columns WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("habit column", id));
        }
        Ok(())
    }

    fn list_columns(&self, enabled_only: bool) -> RepoResult<Vec<HabitColumn>> {
        let mut stmt = self.conn.prepare(&format!(
            "{HABIT_SELECT_SQL}
             WHERE (?1 = 0 OR enabled = 1)
             ORDER BY sort_order ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([bool_to_int(enabled_only)])?;
        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            columns.push(parse_column_row(row)?);
        }
        Ok(columns)
    }
}

fn map_unique(err: rusqlite::Error, column_name: &str) -> RepoError {
    if is_unique_violation(&err) {
        RepoError::Conflict(format!("habit column `{}` already exists", column_name.trim()))
    } else {
        err.into()
    }
}

fn parse_column_row(row: &Row<'_>) -> RepoResult<HabitColumn> {
    let start_date = match row.get::<_, Option<String>>("start_date")? {
        Some(text) => Some(date_from_db("habit_columns.start_date", &text)?),
        None => None,
    };
    let end_text: String = row.get("end_date")?;
    let end_date = HabitEndDate::parse(&end_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid end date `{end_text}` in habit_columns.end_date"))
    })?;
    Ok(HabitColumn {
        id: Some(row.get("id")?),
        column_name: row.get("column_name")?,
        display_name: row.get("display_name")?,
        tooltip_text: row.get("tooltip_text")?,
        total_column_text: row.get("total_column_text")?,
        sql_query: row.get("sql_query")?,
        details_display: row.get("details_display")?,
        icon: row.get("icon")?,
        order: row.get("sort_order")?,
        enabled: int_to_bool("habit_columns.enabled", row.get("enabled")?)?,
        start_date,
        end_date,
        parent_id: row.get("parent_id")?,
    })
}
