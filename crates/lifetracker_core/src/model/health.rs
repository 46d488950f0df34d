//! Body and training records: workouts, weigh-ins, fasts, nutrition, waist.
//!
//! # Invariants
//! - Every record carries a validated `SourceKey`.
//! - Numeric measurements are finite and non-negative.

use crate::model::record::{require_non_negative, ModelValidationError, SourceKey};
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// One training session, usually synced from Whoop.
#[derive(Debug, Clone, PartialEq)]
pub struct Workout {
    pub key: SourceKey,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Offset reported by the source, e.g. `-06:00`.
    pub timezone_offset: String,
    pub sport_id: i64,
    pub average_heart_rate: Option<i64>,
    pub max_heart_rate: Option<i64>,
    pub calories_burned: Option<f64>,
}

impl Workout {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        self.key.validate()?;
        if self.end < self.start {
            return Err(ModelValidationError::InvalidTimeRange { field: "workout" });
        }
        if let Some(calories) = self.calories_burned {
            require_non_negative("calories_burned", calories)?;
        }
        Ok(())
    }
}

/// A body-weight measurement in pounds.
#[derive(Debug, Clone, PartialEq)]
pub struct WeighIn {
    pub key: SourceKey,
    pub measured_at: DateTime<Utc>,
    pub weight_lbs: f64,
}

impl WeighIn {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        self.key.validate()?;
        require_non_negative("weight_lbs", self.weight_lbs)
    }
}

/// A completed fast. Only the end and the length are recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct FastingSession {
    pub key: SourceKey,
    pub duration_hours: f64,
    pub fast_end: DateTime<Utc>,
}

impl FastingSession {
    pub fn fast_start(&self) -> DateTime<Utc> {
        self.fast_end - Duration::seconds((self.duration_hours * 3600.0).round() as i64)
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        self.key.validate()?;
        require_non_negative("duration_hours", self.duration_hours)
    }
}

/// Daily macro totals.
#[derive(Debug, Clone, PartialEq)]
pub struct NutritionEntry {
    pub key: SourceKey,
    pub consumed_at: DateTime<Utc>,
    pub calories: f64,
    pub fat: f64,
    pub carbs: f64,
    pub protein: f64,
}

impl NutritionEntry {
    /// Returns true when any macro is non-zero.
    pub fn has_meaningful_data(&self) -> bool {
        self.calories != 0.0 || self.fat != 0.0 || self.carbs != 0.0 || self.protein != 0.0
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        self.key.validate()?;
        require_non_negative("calories", self.calories)?;
        require_non_negative("fat", self.fat)?;
        require_non_negative("carbs", self.carbs)?;
        require_non_negative("protein", self.protein)
    }
}

/// Waist circumference in inches for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct WaistMeasurement {
    pub key: SourceKey,
    pub log_date: NaiveDate,
    pub inches: f64,
}

impl WaistMeasurement {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        self.key.validate()?;
        require_non_negative("inches", self.inches)
    }
}
