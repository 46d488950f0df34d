//! Monthly objective evaluation.
//!
//! # Responsibility
//! - Refresh cached objective results by running their SQL definitions.
//! - Build month progress rows with a "today" contribution.
//!
//! # Invariants
//! - One failing objective never aborts a refresh batch.
//! - Every evaluation binds the objective's own timezone window.

use crate::model::objective::MonthlyObjective;
use crate::query::{evaluate_scalar, QueryResult, QueryWindow};
use crate::repo::objective_repo::{ObjectiveRepository, SqliteObjectiveRepository};
use crate::service::clock::{resolve_tz, user_today, window_for};
use crate::service::{ServiceError, ServiceResult};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;

/// Outcome of one refresh batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub updated: usize,
    /// `(objective id, label, error message)` for each failure.
    pub failures: Vec<(i64, String, String)>,
}

impl RefreshReport {
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }
}

/// One objective's standing within its month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectiveProgress {
    pub id: i64,
    pub label: String,
    pub category: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub objective_value: f64,
    pub result: f64,
    pub percent: Option<f64>,
    /// Contribution of the current local day.
    pub today: f64,
    pub error: Option<String>,
}

pub struct ObjectiveService<'conn, R: ObjectiveRepository> {
    conn: &'conn Connection,
    repo: R,
}

impl<'conn> ObjectiveService<'conn, SqliteObjectiveRepository<'conn>> {
    pub fn sqlite(conn: &'conn Connection) -> Self {
        Self::new(conn, SqliteObjectiveRepository::new(conn))
    }
}

impl<'conn, R: ObjectiveRepository> ObjectiveService<'conn, R> {
    pub fn new(conn: &'conn Connection, repo: R) -> Self {
        Self { conn, repo }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Re-evaluates every objective (or only `objective_id`) and stores the results.
    pub fn refresh_results(
        &self,
        objective_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> ServiceResult<RefreshReport> {
        let objectives = match objective_id {
            Some(id) => {
                let objective = self.repo.get_objective(id)?.ok_or_else(|| {
                    ServiceError::NotFound(format!("No objective found with ID: {id}"))
                })?;
                vec![objective]
            }
            None => self.repo.list_objectives()?,
        };

        let mut report = RefreshReport::default();
        for objective in &objectives {
            let id = objective.id.unwrap_or_default();
            let outcome = self
                .evaluate_month(objective, now)
                .map_err(ServiceError::from)
                .and_then(|value| {
                    self.repo.store_result(id, value, now)?;
                    Ok(value)
                });
            match outcome {
                Ok(_) => report.updated += 1,
                Err(err) => {
                    warn!("event=objective_refresh module=service status=error objective_id={id}");
                    report.failures.push((id, objective.label.clone(), err.to_string()));
                }
            }
        }
        info!(
            "event=objective_refresh module=service status=ok updated={} errors={}",
            report.updated,
            report.error_count()
        );
        Ok(report)
    }

    /// Progress rows for objectives in the given month, evaluated fresh.
    pub fn month_progress(
        &self,
        year: i32,
        month: u32,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<ObjectiveProgress>> {
        let objectives = self.repo.list_for_month(year, month)?;
        let mut rows = Vec::with_capacity(objectives.len());
        for objective in objectives {
            let mut error = None;
            let result = match self.evaluate_month(&objective, now) {
                Ok(value) => value,
                Err(err) => {
                    error = Some(err.to_string());
                    objective.result.unwrap_or(0.0)
                }
            };
            let today = match self.evaluate_today(&objective, now) {
                Ok(value) => value,
                Err(err) => {
                    error.get_or_insert_with(|| err.to_string());
                    0.0
                }
            };
            rows.push(ObjectiveProgress {
                id: objective.id.unwrap_or_default(),
                percent: objective.progress_percent(result),
                label: objective.label,
                category: objective.category,
                unit_of_measurement: objective.unit_of_measurement,
                objective_value: objective.objective_value,
                result,
                today,
                error,
            });
        }
        Ok(rows)
    }

    fn evaluate_month(&self, objective: &MonthlyObjective, now: DateTime<Utc>) -> QueryResult<f64> {
        let tz = resolve_tz(objective.timezone.as_deref().unwrap_or_default());
        let (today, _, _) = user_today(now, tz);
        let day = today.clamp(objective.start, objective.end);
        let window = window_for(day, objective.start, objective.end, tz);
        evaluate_scalar(self.conn, &objective.objective_definition, &window)
    }

    fn evaluate_today(&self, objective: &MonthlyObjective, now: DateTime<Utc>) -> QueryResult<f64> {
        let tz = resolve_tz(objective.timezone.as_deref().unwrap_or_default());
        let (today, day_start, day_end) = user_today(now, tz);
        if !objective.contains(today) {
            return Ok(0.0);
        }
        let window = QueryWindow::for_day(today, day_start, day_end);
        evaluate_scalar(self.conn, &objective.objective_definition, &window)
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectiveService;
    use crate::db::open_db_in_memory;
    use crate::model::objective::MonthlyObjective;
    use crate::repo::objective_repo::ObjectiveRepository;
    use chrono::{TimeZone, Utc};

    #[test]
    fn failing_objective_does_not_abort_batch() {
        let conn = open_db_in_memory().unwrap();
        let service = ObjectiveService::sqlite(&conn);
        let good = MonthlyObjective::for_month(2025, 11, "Good", 10.0, "SELECT 4").unwrap();
        let bad =
            MonthlyObjective::for_month(2025, 11, "Bad", 10.0, "SELECT * FROM nowhere").unwrap();
        let good_id = service.repo().create_objective(&good).unwrap();
        service.repo().create_objective(&bad).unwrap();

        let now = Utc.with_ymd_and_hms(2025, 11, 15, 18, 0, 0).unwrap();
        let report = service.refresh_results(None, now).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.error_count(), 1);
        let stored = service.repo().get_objective(good_id).unwrap().unwrap();
        assert_eq!(stored.result, Some(4.0));
        assert_eq!(stored.result_updated_at, Some(now));
    }

    #[test]
    fn unknown_objective_id_is_not_found() {
        let conn = open_db_in_memory().unwrap();
        let service = ObjectiveService::sqlite(&conn);
        assert!(matches!(
            service.refresh_results(Some(99), Utc::now()),
            Err(crate::service::ServiceError::NotFound(_))
        ));
    }
}
