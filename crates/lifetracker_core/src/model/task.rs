//! Kanban board model: tasks grouped by ordered states.

use crate::model::record::{require_text, ModelValidationError};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Board column, e.g. "Backlog" or "Doing".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskState {
    pub id: i64,
    pub name: String,
    pub order: i64,
    /// Bootstrap icon class, empty when unset.
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub details: String,
    pub critical: bool,
    pub state_id: Option<i64>,
    pub order: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

/// Partial update for a task. `state_id: Some(None)` moves the task off the board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub details: Option<String>,
    pub critical: Option<bool>,
    pub state_id: Option<Option<i64>>,
}

impl TaskPatch {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        Ok(())
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.trim().to_string();
        }
        if let Some(details) = &self.details {
            task.details = details.clone();
        }
        if let Some(critical) = self.critical {
            task.critical = critical;
        }
        if let Some(state_id) = self.state_id {
            task.state_id = state_id;
        }
    }
}
