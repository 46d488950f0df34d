//! Source-keyed record identity shared by every synced table.
//!
//! # Responsibility
//! - Define the `(source, source_id)` dedupe key.
//! - Provide the validation error shared by all model types.
//!
//! # Invariants
//! - Neither `source` nor `source_id` may be blank.
//! - A key is never reused for a different real-world record.

use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub const SOURCE_MANUAL: &str = "Manual";
pub const SOURCE_WHOOP: &str = "Whoop";
pub const SOURCE_WITHINGS: &str = "Withings";
pub const SOURCE_TOGGL: &str = "Toggl";
pub const SOURCE_CRONOMETER: &str = "Cronometer";

/// Deduplication key for externally synced rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey {
    pub source: String,
    pub source_id: String,
}

impl SourceKey {
    pub fn new(source: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
        }
    }

    /// Creates a key for a manually logged record with a generated id.
    pub fn manual() -> Self {
        Self::new(SOURCE_MANUAL, Uuid::new_v4().to_string())
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.source.trim().is_empty() {
            return Err(ModelValidationError::BlankField("source"));
        }
        if self.source_id.trim().is_empty() {
            return Err(ModelValidationError::BlankField("source_id"));
        }
        Ok(())
    }
}

impl Display for SourceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.source_id)
    }
}

/// Result of an upsert keyed by `(source, source_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Validation failures raised before any row is written.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelValidationError {
    /// A required text field is empty after trim.
    BlankField(&'static str),
    /// `end` precedes `start`.
    InvalidTimeRange { field: &'static str },
    /// A numeric field holds a negative or non-finite value.
    InvalidNumber { field: &'static str, value: f64 },
    /// Target score outside `{0, 0.5, 1}`.
    InvalidScore(f64),
    /// Agenda slot outside `1..=3`.
    InvalidSlot(usize),
    /// Habit column end date is neither `ongoing` nor an ISO date.
    InvalidEndDate(String),
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField(field) => write!(f, "{field} must not be blank"),
            Self::InvalidTimeRange { field } => {
                write!(f, "{field}: end must not be earlier than start")
            }
            Self::InvalidNumber { field, value } => {
                write!(f, "{field} must be a finite non-negative number, got {value}")
            }
            Self::InvalidScore(value) => write!(f, "score must be 0, 0.5, 1, or null, got {value}"),
            Self::InvalidSlot(slot) => write!(f, "target_num must be 1, 2, or 3, got {slot}"),
            Self::InvalidEndDate(value) => {
                write!(f, "end date must be `ongoing` or YYYY-MM-DD, got `{value}`")
            }
        }
    }
}

impl Error for ModelValidationError {}

pub(crate) fn require_non_negative(
    field: &'static str,
    value: f64,
) -> Result<(), ModelValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ModelValidationError::InvalidNumber { field, value });
    }
    Ok(())
}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ModelValidationError> {
    if value.trim().is_empty() {
        return Err(ModelValidationError::BlankField(field));
    }
    Ok(())
}

/// Rounds to two decimal places, matching the precision of stored measurements.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{round2, ModelValidationError, SourceKey, SOURCE_MANUAL};

    #[test]
    fn manual_keys_are_unique() {
        let first = SourceKey::manual();
        let second = SourceKey::manual();
        assert_eq!(first.source, SOURCE_MANUAL);
        assert_ne!(first.source_id, second.source_id);
    }

    #[test]
    fn blank_source_id_is_rejected() {
        let err = SourceKey::new("Whoop", "  ").validate().unwrap_err();
        assert_eq!(err, ModelValidationError::BlankField("source_id"));
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(181.123_4), 181.12);
        assert_eq!(round2(181.126), 181.13);
    }
}
