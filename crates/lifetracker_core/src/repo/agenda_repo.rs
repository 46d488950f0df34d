//! Daily agenda persistence, one row per calendar date.
//!
//! # Invariants
//! - `agenda_date` is unique; `save_agenda` is an upsert on it.
//! - Slot N maps to `project_N`, `goal_N`, `target_N`, `target_N_score`.

use crate::model::planning::{AgendaSlot, DailyAgenda, TargetScore, AGENDA_SLOTS};
use crate::repo::{date_from_db, date_to_db, RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

const AGENDA_SELECT_SQL: &str = "SELECT
    agenda_date,
    project_1, goal_1, target_1, target_1_score,
    project_2, goal_2, target_2, target_2_score,
    project_3, goal_3, target_3, target_3_score,
    day_score,
    notes
FROM daily_agendas";

pub trait AgendaRepository {
    fn get_agenda(&self, date: NaiveDate) -> RepoResult<Option<DailyAgenda>>;
    fn save_agenda(&self, agenda: &DailyAgenda) -> RepoResult<()>;
    /// All agenda dates, newest first.
    fn list_agenda_dates(&self) -> RepoResult<Vec<NaiveDate>>;
}

pub struct SqliteAgendaRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAgendaRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AgendaRepository for SqliteAgendaRepository<'_> {
    fn get_agenda(&self, date: NaiveDate) -> RepoResult<Option<DailyAgenda>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{AGENDA_SELECT_SQL} WHERE agenda_date = ?1;"))?;
        let mut rows = stmt.query([date_to_db(date)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_agenda_row(row)?));
        }
        Ok(None)
    }

    fn save_agenda(&self, agenda: &DailyAgenda) -> RepoResult<()> {
        let [s1, s2, s3] = &agenda.slots;
        self.conn.execute(
            "INSERT INTO daily_agendas (
                agenda_date,
                project_1, goal_1, target_1, target_1_score,
                project_2, goal_2, target_2, target_2_score,
                project_3, goal_3, target_3, target_3_score,
                day_score, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT (agenda_date) DO UPDATE SET
                project_1 = excluded.project_1,
                goal_1 = excluded.goal_1,
                target_1 = excluded.target_1,
                target_1_score = excluded.target_1_score,
                project_2 = excluded.project_2,
                goal_2 = excluded.goal_2,
                target_2 = excluded.target_2,
                target_2_score = excluded.target_2_score,
                project_3 = excluded.project_3,
                goal_3 = excluded.goal_3,
                target_3 = excluded.target_3,
                target_3_score = excluded.target_3_score,
                day_score = excluded.day_score,
                notes = excluded.notes,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                date_to_db(agenda.date),
                s1.project_id,
                s1.goal_id,
                s1.target_id,
                s1.score.map(TargetScore::value),
                s2.project_id,
                s2.goal_id,
                s2.target_id,
                s2.score.map(TargetScore::value),
                s3.project_id,
                s3.goal_id,
                s3.target_id,
                s3.score.map(TargetScore::value),
                agenda.day_score,
                agenda.notes,
            ],
        )?;
        Ok(())
    }

    fn list_agenda_dates(&self) -> RepoResult<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT agenda_date FROM daily_agendas ORDER BY agenda_date DESC;")?;
        let mut rows = stmt.query([])?;
        let mut dates = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            dates.push(date_from_db("daily_agendas.agenda_date", &text)?);
        }
        Ok(dates)
    }
}

fn parse_agenda_row(row: &Row<'_>) -> RepoResult<DailyAgenda> {
    let date_text: String = row.get("agenda_date")?;
    let mut agenda = DailyAgenda::new(date_from_db("daily_agendas.agenda_date", &date_text)?);
    for number in 1..=AGENDA_SLOTS {
        let score = match row.get::<_, Option<f64>>(format!("target_{number}_score").as_str())? {
            Some(value) => Some(TargetScore::from_value(value).map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid score `{value}` in daily_agendas.target_{number}_score"
                ))
            })?),
            None => None,
        };
        agenda.slots[number - 1] = AgendaSlot {
            project_id: row.get(format!("project_{number}").as_str())?,
            goal_id: row.get(format!("goal_{number}").as_str())?,
            target_id: row.get(format!("target_{number}").as_str())?,
            score,
        };
    }
    agenda.day_score = row.get("day_score")?;
    agenda.notes = row.get("notes")?;
    Ok(agenda)
}
