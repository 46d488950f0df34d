//! Kanban board use-cases.
//!
//! # Invariants
//! - New tasks land in the first state by order (or none when no state exists).
//! - New states are appended after the existing ones.
//! - Moving a task to a missing state is a `NotFound` error.

use crate::model::activity::CalendarEvent;
use crate::model::task::{Task, TaskPatch, TaskState};
use crate::repo::calendar_repo::{CalendarRepository, SqliteCalendarRepository};
use crate::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use crate::service::clock::{resolve_tz, user_today};
use crate::service::{ServiceError, ServiceResult};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::Connection;

/// Board snapshot with today's calendar events.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub states: Vec<TaskState>,
    pub tasks: Vec<Task>,
    pub events: Vec<CalendarEvent>,
}

pub struct TaskBoardService<T: TaskRepository, C: CalendarRepository> {
    tasks: T,
    calendar: C,
}

impl<'conn> TaskBoardService<SqliteTaskRepository<'conn>, SqliteCalendarRepository<'conn>> {
    pub fn sqlite(conn: &'conn Connection) -> Self {
        Self::new(
            SqliteTaskRepository::new(conn),
            SqliteCalendarRepository::new(conn),
        )
    }
}

impl<T: TaskRepository, C: CalendarRepository> TaskBoardService<T, C> {
    pub fn new(tasks: T, calendar: C) -> Self {
        Self { tasks, calendar }
    }

    pub fn board(&self, now: DateTime<Utc>, timezone: &str) -> ServiceResult<Board> {
        let (_, start, end) = user_today(now, resolve_tz(timezone));
        Ok(Board {
            states: self.tasks.list_states()?,
            tasks: self.tasks.list_tasks()?,
            events: self.calendar.events_overlapping(start, end)?,
        })
    }

    pub fn list_tasks(&self) -> ServiceResult<Vec<Task>> {
        Ok(self.tasks.list_tasks()?)
    }

    pub fn create_task(&self, title: &str) -> ServiceResult<Task> {
        if title.trim().is_empty() {
            return Err(ServiceError::Validation("Title is required".to_string()));
        }
        let state_id = self.tasks.first_state()?.map(|state| state.id);
        let task = self.tasks.create_task(title, state_id)?;
        info!("event=task_create module=service status=ok task_id={}", task.id);
        Ok(task)
    }

    pub fn update_task(&self, id: i64, patch: &TaskPatch) -> ServiceResult<Task> {
        patch.validate()?;
        let mut task = self
            .tasks
            .get_task(id)?
            .ok_or_else(|| ServiceError::NotFound("Task not found".to_string()))?;
        if let Some(Some(state_id)) = patch.state_id {
            if self.tasks.get_state(state_id)?.is_none() {
                return Err(ServiceError::NotFound("State not found".to_string()));
            }
        }
        patch.apply(&mut task);
        self.tasks.update_task(&task)?;
        self.tasks
            .get_task(id)?
            .ok_or_else(|| ServiceError::NotFound("Task not found".to_string()))
    }

    pub fn delete_task(&self, id: i64) -> ServiceResult<()> {
        self.tasks.delete_task(id).map_err(|err| match err {
            crate::repo::RepoError::NotFound { .. } => {
                ServiceError::NotFound("Task not found".to_string())
            }
            other => other.into(),
        })
    }

    pub fn reorder_tasks(&self, ordered_ids: &[i64]) -> ServiceResult<()> {
        Ok(self.tasks.reorder_tasks(ordered_ids)?)
    }

    pub fn list_states(&self) -> ServiceResult<Vec<TaskState>> {
        Ok(self.tasks.list_states()?)
    }

    pub fn create_state(&self, name: &str, icon: &str) -> ServiceResult<TaskState> {
        if name.trim().is_empty() {
            return Err(ServiceError::Validation("Name is required".to_string()));
        }
        Ok(self.tasks.create_state(name, icon)?)
    }

    /// Renames a state and/or changes its icon.
    pub fn update_state(
        &self,
        id: i64,
        name: Option<&str>,
        icon: Option<&str>,
    ) -> ServiceResult<TaskState> {
        let mut state = self
            .tasks
            .get_state(id)?
            .ok_or_else(|| ServiceError::NotFound("State not found".to_string()))?;
        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(ServiceError::Validation("Name is required".to_string()));
            }
            state.name = name.trim().to_string();
        }
        if let Some(icon) = icon {
            state.icon = icon.trim().to_string();
        }
        self.tasks.update_state(&state)?;
        Ok(state)
    }

    pub fn delete_state(&self, id: i64) -> ServiceResult<()> {
        self.tasks.delete_state(id).map_err(|err| match err {
            crate::repo::RepoError::NotFound { .. } => {
                ServiceError::NotFound("State not found".to_string())
            }
            other => other.into(),
        })
    }

    pub fn reorder_states(&self, ordered_ids: &[i64]) -> ServiceResult<()> {
        Ok(self.tasks.reorder_states(ordered_ids)?)
    }
}
