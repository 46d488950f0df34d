//! Admin-authored metric definitions: monthly objectives and habit columns.
//!
//! # Responsibility
//! - Hold SQL-backed metric definitions and their cached results.
//! - Decide when a habit column is visible for a given date.
//!
//! # Invariants
//! - An objective's `end` is never earlier than its `start`.
//! - A habit column without `start_date` is never active.
//! - Habit `end_date` is inclusive.

use crate::model::record::{require_text, ModelValidationError};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt::{Display, Formatter};

pub const ONGOING: &str = "ongoing";

/// A target value for one calendar month, measured by a SQL snippet.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyObjective {
    pub id: Option<i64>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
    pub objective_value: f64,
    /// Read-only SQL returning one numeric value.
    pub objective_definition: String,
    /// IANA zone name. Filled from settings on insert when absent.
    pub timezone: Option<String>,
    pub category: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub result: Option<f64>,
    pub result_updated_at: Option<DateTime<Utc>>,
}

impl MonthlyObjective {
    /// Creates an objective covering the whole calendar month of `year`/`month`.
    pub fn for_month(
        year: i32,
        month: u32,
        label: impl Into<String>,
        objective_value: f64,
        objective_definition: impl Into<String>,
    ) -> Option<Self> {
        let (start, end) = month_bounds(year, month)?;
        Some(Self {
            id: None,
            start,
            end,
            label: label.into(),
            objective_value,
            objective_definition: objective_definition.into(),
            timezone: None,
            category: None,
            unit_of_measurement: None,
            result: None,
            result_updated_at: None,
        })
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("label", &self.label)?;
        require_text("objective_definition", &self.objective_definition)?;
        if self.end < self.start {
            return Err(ModelValidationError::InvalidTimeRange { field: "objective" });
        }
        if !self.objective_value.is_finite() {
            return Err(ModelValidationError::InvalidNumber {
                field: "objective_value",
                value: self.objective_value,
            });
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Percent of target reached, or `None` for a zero target.
    pub fn progress_percent(&self, result: f64) -> Option<f64> {
        if self.objective_value == 0.0 {
            return None;
        }
        Some(result / self.objective_value * 100.0)
    }
}

impl Display for MonthlyObjective {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.start.format("%B %Y"))
    }
}

/// Returns the first and last day of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_first.pred_opt()?))
}

/// Last day of a habit column's active range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HabitEndDate {
    Ongoing,
    On(NaiveDate),
}

impl HabitEndDate {
    pub fn parse(value: &str) -> Result<Self, ModelValidationError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(ONGOING) {
            return Ok(Self::Ongoing);
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(Self::On)
            .map_err(|_| ModelValidationError::InvalidEndDate(value.to_string()))
    }

    pub fn as_db(&self) -> String {
        match self {
            Self::Ongoing => ONGOING.to_string(),
            Self::On(date) => date.format("%Y-%m-%d").to_string(),
        }
    }
}

/// One column of the yearly habit grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitColumn {
    pub id: Option<i64>,
    pub column_name: String,
    pub display_name: String,
    pub tooltip_text: String,
    pub total_column_text: Option<String>,
    /// Read-only SQL; a result > 0 marks the day as done.
    pub sql_query: String,
    /// Per-record detail template with `{field}` placeholders.
    pub details_display: Option<String>,
    pub icon: String,
    pub order: i64,
    pub enabled: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: HabitEndDate,
    pub parent_id: Option<i64>,
}

impl HabitColumn {
    pub fn new(
        column_name: impl Into<String>,
        display_name: impl Into<String>,
        sql_query: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            column_name: column_name.into(),
            display_name: display_name.into(),
            tooltip_text: String::new(),
            total_column_text: None,
            sql_query: sql_query.into(),
            details_display: None,
            icon: "bi-circle".to_string(),
            order: 0,
            enabled: true,
            start_date: None,
            end_date: HabitEndDate::Ongoing,
            parent_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("column_name", &self.column_name)?;
        require_text("display_name", &self.display_name)?;
        require_text("sql_query", &self.sql_query)
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        let Some(start) = self.start_date else {
            return false;
        };
        if date < start {
            return false;
        }
        match self.end_date {
            HabitEndDate::Ongoing => true,
            HabitEndDate::On(end) => date <= end,
        }
    }

    /// Label used for the month total column.
    pub fn total_label(&self) -> String {
        self.total_column_text
            .clone()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| self.display_name.to_lowercase())
    }
}

impl Display for HabitColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.column_name)
    }
}

/// Number of days in the month containing `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    month_bounds(date.year(), date.month()).map_or(31, |(_, last)| last.day())
}

#[cfg(test)]
mod tests {
    use super::{month_bounds, HabitColumn, HabitEndDate, MonthlyObjective};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_bounds_handle_leap_february_and_december() {
        assert_eq!(month_bounds(2024, 2), Some((date(2024, 2, 1), date(2024, 2, 29))));
        assert_eq!(month_bounds(2025, 12), Some((date(2025, 12, 1), date(2025, 12, 31))));
        assert_eq!(month_bounds(2025, 13), None);
    }

    #[test]
    fn column_without_start_is_never_active() {
        let column = HabitColumn::new("run", "Run", "SELECT 1");
        assert!(!column.is_active_on(date(2026, 1, 15)));
    }

    #[test]
    fn ongoing_column_is_active_from_start() {
        let mut column = HabitColumn::new("run", "Run", "SELECT 1");
        column.start_date = Some(date(2026, 1, 1));
        assert!(!column.is_active_on(date(2025, 12, 31)));
        assert!(column.is_active_on(date(2026, 1, 1)));
        assert!(column.is_active_on(date(2030, 6, 15)));
    }

    #[test]
    fn end_date_is_inclusive() {
        let mut column = HabitColumn::new("run", "Run", "SELECT 1");
        column.start_date = Some(date(2026, 1, 1));
        column.end_date = HabitEndDate::parse("2026-03-31").unwrap();
        assert!(column.is_active_on(date(2026, 3, 31)));
        assert!(!column.is_active_on(date(2026, 4, 1)));
    }

    #[test]
    fn end_date_parse_rejects_garbage() {
        assert!(HabitEndDate::parse("soon").is_err());
        assert_eq!(HabitEndDate::parse("Ongoing").unwrap(), HabitEndDate::Ongoing);
    }

    #[test]
    fn total_label_falls_back_to_lowercase_display_name() {
        let column = HabitColumn::new("fast", "Fasting", "SELECT 1");
        assert_eq!(column.total_label(), "fasting");
    }

    #[test]
    fn zero_target_has_no_progress_percent() {
        let objective = MonthlyObjective::for_month(2025, 11, "Runs", 0.0, "SELECT 1").unwrap();
        assert_eq!(objective.progress_percent(3.0), None);
        assert_eq!(objective.to_string(), "Runs (November 2025)");
    }
}
