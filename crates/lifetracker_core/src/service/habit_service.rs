//! Yearly habit grid built from habit column queries.
//!
//! # Responsibility
//! - Decide which columns are shown for each month.
//! - Mark the days on which each column's query returns a positive value.
//!
//! # Invariants
//! - A column is shown for a month when it is enabled and active on the
//!   month's last day.
//! - A failing query for one day is logged and that day is left unmarked.

use crate::model::objective::{days_in_month, HabitColumn};
use crate::query::{evaluate_scalar, fetch_rows, render_template};
use crate::repo::habit_repo::{HabitColumnRepository, SqliteHabitColumnRepository};
use crate::service::clock::{resolve_tz, window_in_month};
use crate::service::{ServiceError, ServiceResult};
use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HabitMonth {
    pub column_name: String,
    pub display_name: String,
    pub tooltip_text: String,
    pub total_label: String,
    pub icon: String,
    /// Days of month (1-based) with a positive query result.
    pub days: Vec<u32>,
    /// Rendered detail text per marked day.
    pub details: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthGrid {
    pub month: u32,
    pub name: &'static str,
    pub days_in_month: u32,
    pub habits: Vec<HabitMonth>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearGrid {
    pub year: i32,
    pub months: Vec<MonthGrid>,
}

pub struct HabitGridService<'conn, R: HabitColumnRepository> {
    conn: &'conn Connection,
    repo: R,
}

impl<'conn> HabitGridService<'conn, SqliteHabitColumnRepository<'conn>> {
    pub fn sqlite(conn: &'conn Connection) -> Self {
        Self::new(conn, SqliteHabitColumnRepository::new(conn))
    }
}

impl<'conn, R: HabitColumnRepository> HabitGridService<'conn, R> {
    pub fn new(conn: &'conn Connection, repo: R) -> Self {
        Self { conn, repo }
    }

    pub fn year_grid(&self, year: i32, timezone: &str) -> ServiceResult<YearGrid> {
        let tz = resolve_tz(timezone);
        let columns = self.repo.list_columns(true)?;
        let mut months = Vec::with_capacity(12);
        for month in 1..=12u32 {
            let first = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| ServiceError::Validation(format!("invalid year {year}")))?;
            let last_day = days_in_month(first);
            let last = first.with_day0(last_day - 1).unwrap_or(first);
            let habits = columns
                .iter()
                .filter(|column| column.is_active_on(last))
                .map(|column| self.column_month(column, first, last_day, tz))
                .collect();
            months.push(MonthGrid {
                month,
                name: MONTH_NAMES[month as usize - 1],
                days_in_month: last_day,
                habits,
            });
        }
        info!("event=habit_grid module=service status=ok year={year} columns={}", columns.len());
        Ok(YearGrid { year, months })
    }

    fn column_month(&self, column: &HabitColumn, first: NaiveDate, last_day: u32, tz: Tz) -> HabitMonth {
        let mut days = Vec::new();
        let mut details = BTreeMap::new();
        for offset in 0..last_day {
            let Some(date) = first.with_day0(offset) else {
                continue;
            };
            let window = window_in_month(date, tz);
            let value = match evaluate_scalar(self.conn, &column.sql_query, &window) {
                Ok(value) => value,
                Err(_) => {
                    warn!(
                        "event=habit_query module=service status=error column={} date={date}",
                        column.column_name
                    );
                    continue;
                }
            };
            if value <= 0.0 {
                continue;
            }
            let day = offset + 1;
            days.push(day);

            let Some(template) = column.details_display.as_deref().filter(|t| !t.trim().is_empty())
            else {
                continue;
            };
            match fetch_rows(self.conn, &column.sql_query, &window) {
                Ok(rows) if !rows.is_empty() => {
                    let rendered: Vec<String> =
                        rows.iter().map(|row| render_template(template, row)).collect();
                    details.insert(day, rendered.join(", "));
                }
                Ok(_) => {}
                Err(_) => warn!(
                    "event=habit_details module=service status=error column={} date={date}",
                    column.column_name
                ),
            }
        }
        HabitMonth {
            column_name: column.column_name.clone(),
            display_name: column.display_name.clone(),
            tooltip_text: column.tooltip_text.clone(),
            total_label: column.total_label(),
            icon: column.icon.clone(),
            days,
            details,
        }
    }
}
