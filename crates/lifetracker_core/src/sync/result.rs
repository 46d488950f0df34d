//! Per-source sync outcome.

use crate::model::record::UpsertOutcome;
use crate::sync::window::SyncSource;
use crate::sync::SyncError;
use serde::Serialize;

/// Records mapped from one provider pull plus the count of unusable items.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

impl<T> Batch<T> {
    /// Keeps `Some` values and counts `None` as skipped.
    pub fn push(&mut self, mapped: Option<T>) {
        match mapped {
            Some(record) => self.records.push(record),
            None => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub source: String,
    pub success: bool,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub error_message: String,
    pub auth_error: bool,
}

impl SyncResult {
    pub fn new(source: SyncSource) -> Self {
        Self {
            source: source.name().to_string(),
            success: true,
            created: 0,
            updated: 0,
            skipped: 0,
            error_message: String::new(),
            auth_error: false,
        }
    }

    pub fn failed(source: SyncSource, err: &SyncError) -> Self {
        Self {
            success: false,
            error_message: err.to_string(),
            auth_error: err.is_auth(),
            ..Self::new(source)
        }
    }

    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped
    }

    pub fn summary(&self) -> String {
        if !self.success {
            return format!("Failed: {}", self.error_message);
        }
        let parts = [
            (self.created, "created"),
            (self.updated, "updated"),
            (self.skipped, "skipped"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect::<Vec<_>>();
        if parts.is_empty() {
            "No records processed".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SyncResult;
    use crate::model::record::UpsertOutcome;
    use crate::sync::window::SyncSource;
    use crate::sync::SyncError;

    #[test]
    fn summary_lists_non_zero_counts() {
        let mut result = SyncResult::new(SyncSource::Whoop);
        assert_eq!(result.summary(), "No records processed");

        result.record(UpsertOutcome::Created);
        result.record(UpsertOutcome::Created);
        result.skip();
        assert_eq!(result.summary(), "2 created, 1 skipped");
        assert_eq!(result.total(), 3);
    }

    #[test]
    fn failure_keeps_auth_flag() {
        let result = SyncResult::failed(
            SyncSource::Withings,
            &SyncError::Auth("token revoked".to_string()),
        );
        assert!(!result.success);
        assert!(result.auth_error);
        assert!(result.summary().starts_with("Failed: authentication failed"));
    }
}
