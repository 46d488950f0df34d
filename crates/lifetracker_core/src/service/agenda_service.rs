//! Daily agenda use-cases.
//!
//! # Responsibility
//! - Save the three planned targets for a date and score them.
//! - Report time logged against a project (and optional goal) for a day.
//!
//! # Invariants
//! - A slot is kept only when it has both a project and a target; otherwise
//!   it is cleared together with its score.
//! - `day_score` is recomputed on every write.

use crate::model::planning::{AgendaSlot, DailyAgenda, Target, TargetScore, AGENDA_SLOTS};
use crate::repo::agenda_repo::{AgendaRepository, SqliteAgendaRepository};
use crate::repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
use crate::repo::record_repo::{SqliteSyncedRecordRepository, SyncedRecordRepository};
use crate::service::clock::{day_bounds, resolve_tz};
use crate::service::{ServiceError, ServiceResult};
use chrono::NaiveDate;
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller input for one agenda slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlotInput {
    pub project_id: Option<i64>,
    pub goal_id: Option<i64>,
    /// Free-form target text.
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgendaSlotView {
    pub project_id: Option<i64>,
    pub project_name: Option<String>,
    pub goal_id: Option<i64>,
    pub goal_name: Option<String>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgendaView {
    pub date: NaiveDate,
    pub targets: Vec<AgendaSlotView>,
    pub day_score: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSpent {
    pub total_seconds: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl TimeSpent {
    pub fn from_seconds(total_seconds: i64) -> Self {
        Self {
            total_seconds,
            hours: total_seconds / 3600,
            minutes: (total_seconds % 3600) / 60,
        }
    }

    /// `"2h 5m"`, or `"5m"` under an hour.
    pub fn display(&self) -> String {
        if self.hours > 0 {
            format!("{}h {}m", self.hours, self.minutes)
        } else {
            format!("{}m", self.minutes)
        }
    }
}

pub struct AgendaService<A, C, R>
where
    A: AgendaRepository,
    C: CatalogRepository,
    R: SyncedRecordRepository,
{
    agendas: A,
    catalog: C,
    records: R,
}

impl<'conn>
    AgendaService<
        SqliteAgendaRepository<'conn>,
        SqliteCatalogRepository<'conn>,
        SqliteSyncedRecordRepository<'conn>,
    >
{
    pub fn sqlite(conn: &'conn Connection) -> Self {
        Self::new(
            SqliteAgendaRepository::new(conn),
            SqliteCatalogRepository::new(conn),
            SqliteSyncedRecordRepository::new(conn),
        )
    }
}

impl<A, C, R> AgendaService<A, C, R>
where
    A: AgendaRepository,
    C: CatalogRepository,
    R: SyncedRecordRepository,
{
    pub fn new(agendas: A, catalog: C, records: R) -> Self {
        Self {
            agendas,
            catalog,
            records,
        }
    }

    /// Creates or replaces the agenda for `date`.
    pub fn save_agenda(
        &self,
        date: NaiveDate,
        slots: &[SlotInput; AGENDA_SLOTS],
        notes: &str,
    ) -> ServiceResult<DailyAgenda> {
        let mut agenda = self
            .agendas
            .get_agenda(date)?
            .unwrap_or_else(|| DailyAgenda::new(date));

        let mut planned = Vec::with_capacity(AGENDA_SLOTS);
        for input in slots {
            planned.push(self.check_slot(input)?);
        }

        for (slot, plan) in agenda.slots.iter_mut().zip(planned) {
            let Some((project_id, goal_id, target_name)) = plan else {
                slot.clear();
                continue;
            };
            let target = Target {
                target_id: format!("{target_name}_{}", Uuid::new_v4().simple()),
                target_name: target_name.to_string(),
                goal_id,
            };
            self.catalog.ensure_target(&target)?;
            *slot = AgendaSlot {
                project_id: Some(project_id),
                goal_id,
                target_id: Some(target.target_id),
                score: slot.score,
            };
        }

        agenda.notes = Some(notes.to_string());
        agenda.recompute_day_score();
        self.agendas.save_agenda(&agenda)?;
        info!("event=agenda_save module=service status=ok date={date}");
        Ok(agenda)
    }

    /// `(project, goal, target text)` for a filled slot, `None` for one to clear.
    /// Runs before anything is written so a bad slot leaves no targets behind.
    fn check_slot<'a>(
        &self,
        input: &'a SlotInput,
    ) -> ServiceResult<Option<(i64, Option<i64>, &'a str)>> {
        let target_name = input
            .target
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let (Some(project_id), Some(target_name)) = (input.project_id, target_name) else {
            return Ok(None);
        };
        if self.catalog.get_project(project_id)?.is_none() {
            return Err(ServiceError::Validation(format!("unknown project {project_id}")));
        }
        if let Some(goal_id) = input.goal_id {
            if self.catalog.get_goal(goal_id)?.is_none() {
                return Err(ServiceError::Validation(format!("unknown goal {goal_id}")));
            }
        }
        Ok(Some((project_id, input.goal_id, target_name)))
    }

    /// Sets or clears one slot score; returns the new day score.
    pub fn save_target_score(
        &self,
        date: NaiveDate,
        slot_number: usize,
        score: Option<f64>,
    ) -> ServiceResult<Option<f64>> {
        let score = score.map(TargetScore::from_value).transpose()?;
        let mut agenda = self
            .agendas
            .get_agenda(date)?
            .ok_or_else(|| ServiceError::NotFound("No agenda found for this date".to_string()))?;
        let day_score = agenda.set_score(slot_number, score)?;
        self.agendas.save_agenda(&agenda)?;
        Ok(day_score)
    }

    pub fn get_agenda(&self, date: NaiveDate) -> ServiceResult<AgendaView> {
        let agenda = self
            .agendas
            .get_agenda(date)?
            .ok_or_else(|| ServiceError::NotFound("No agenda found for this date".to_string()))?;
        let mut targets = Vec::with_capacity(AGENDA_SLOTS);
        for slot in &agenda.slots {
            let project = match slot.project_id {
                Some(id) => self.catalog.get_project(id)?,
                None => None,
            };
            let goal = match slot.goal_id {
                Some(id) => self.catalog.get_goal(id)?,
                None => None,
            };
            let target = match slot.target_id.as_deref() {
                Some(id) => self.catalog.get_target(id)?,
                None => None,
            };
            targets.push(AgendaSlotView {
                project_id: slot.project_id,
                project_name: project.map(|p| p.display_string),
                goal_id: slot.goal_id,
                goal_name: goal.map(|g| g.display_string),
                target_id: slot.target_id.clone(),
                target_name: target.map(|t| t.target_name),
                score: slot.score.map(TargetScore::value),
            });
        }
        Ok(AgendaView {
            date: agenda.date,
            targets,
            day_score: agenda.day_score,
            notes: agenda.notes,
        })
    }

    pub fn list_agenda_dates(&self) -> ServiceResult<Vec<NaiveDate>> {
        Ok(self.agendas.list_agenda_dates()?)
    }

    /// Time logged against `project_id` (and `goal_id` when given) on the local day `date`.
    pub fn time_spent(
        &self,
        project_id: i64,
        goal_id: Option<i64>,
        date: NaiveDate,
        timezone: &str,
    ) -> ServiceResult<TimeSpent> {
        let (start, end) = day_bounds(date, resolve_tz(timezone));
        let seconds = self
            .records
            .total_logged_seconds(project_id, goal_id, start, end)?;
        Ok(TimeSpent::from_seconds(seconds))
    }
}
