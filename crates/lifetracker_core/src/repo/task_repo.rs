//! Kanban board persistence: task states and tasks.
//!
//! # Invariants
//! - State names are unique; duplicates surface as `RepoError::Conflict`.
//! - States list by `sort_order ASC, id ASC`; tasks by `sort_order ASC, id ASC`.
//! - Deleting a state leaves its tasks in place with `state_id = NULL`.

use crate::model::record::ModelValidationError;
use crate::model::task::{Task, TaskState};
use crate::repo::{bool_to_int, from_millis, int_to_bool, is_unique_violation, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const TASK_SELECT_SQL: &str = "SELECT
    id,
    title,
    details,
    critical,
    state_id,
    sort_order,
    created_at,
    updated_at
FROM tasks";

pub trait TaskRepository {
    fn list_states(&self) -> RepoResult<Vec<TaskState>>;
    fn get_state(&self, id: i64) -> RepoResult<Option<TaskState>>;
    /// First state by order, used as the landing column for new tasks.
    fn first_state(&self) -> RepoResult<Option<TaskState>>;
    /// Appends a state after the current last one.
    fn create_state(&self, name: &str, icon: &str) -> RepoResult<TaskState>;
    fn update_state(&self, state: &TaskState) -> RepoResult<()>;
    fn delete_state(&self, id: i64) -> RepoResult<()>;
    /// Assigns `sort_order = index` to each listed state; unknown ids are ignored.
    fn reorder_states(&self, ordered_ids: &[i64]) -> RepoResult<()>;

    fn list_tasks(&self) -> RepoResult<Vec<Task>>;
    fn get_task(&self, id: i64) -> RepoResult<Option<Task>>;
    fn create_task(&self, title: &str, state_id: Option<i64>) -> RepoResult<Task>;
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    fn delete_task(&self, id: i64) -> RepoResult<()>;
    /// Assigns `sort_order = index` to each listed task; unknown ids are ignored.
    fn reorder_tasks(&self, ordered_ids: &[i64]) -> RepoResult<()>;
}

pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn reorder(&self, table: &str, ordered_ids: &[i64]) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE {table}
                 SET sort_order = ?1, updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?2;"
            ))?;
            for (index, id) in ordered_ids.iter().enumerate() {
                stmt.execute(params![index as i64, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn list_states(&self) -> RepoResult<Vec<TaskState>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, sort_order, icon FROM task_states ORDER BY sort_order ASC, id ASC;",
        )?;
        let states = stmt
            .query_map([], parse_state_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(states)
    }

    fn get_state(&self, id: i64) -> RepoResult<Option<TaskState>> {
        let state = self
            .conn
            .query_row(
                "SELECT id, name, sort_order, icon FROM task_states WHERE id = ?1;",
                [id],
                parse_state_row,
            )
            .optional()?;
        Ok(state)
    }

    fn first_state(&self) -> RepoResult<Option<TaskState>> {
        let state = self
            .conn
            .query_row(
                "SELECT id, name, sort_order, icon
                 FROM task_states
                 ORDER BY sort_order ASC, id ASC
                 LIMIT 1;",
                [],
                parse_state_row,
            )
            .optional()?;
        Ok(state)
    }

    fn create_state(&self, name: &str, icon: &str) -> RepoResult<TaskState> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ModelValidationError::BlankField("name").into());
        }
        let order: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM task_states;",
            [],
            |row| row.get(0),
        )?;
        self.conn
            .execute(
                "INSERT INTO task_states (name, sort_order, icon) VALUES (?1, ?2, ?3);",
                params![name, order, icon.trim()],
            )
            .map_err(|err| map_state_conflict(err, name))?;
        Ok(TaskState {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            order,
            icon: icon.trim().to_string(),
        })
    }

    fn update_state(&self, state: &TaskState) -> RepoResult<()> {
        if state.name.trim().is_empty() {
            return Err(ModelValidationError::BlankField("name").into());
        }
        let changed = self
            .conn
            .execute(
                "UPDATE task_states
                 SET name = ?1, icon = ?2, sort_order = ?3,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?4;",
                params![state.name.trim(), state.icon.trim(), state.order, state.id],
            )
            .map_err(|err| map_state_conflict(err, &state.name))?;
        if changed == 0 {
            return Err(RepoError::not_found("state", state.id));
        }
        Ok(())
    }

    fn delete_state(&self, id: i64) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM task_states WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("state", id));
        }
        Ok(())
    }

    fn reorder_states(&self, ordered_ids: &[i64]) -> RepoResult<()> {
        self.reorder("task_states", ordered_ids)
    }

    fn list_tasks(&self) -> RepoResult<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} ORDER BY sort_order ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn get_task(&self, id: i64) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn create_task(&self, title: &str, state_id: Option<i64>) -> RepoResult<Task> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ModelValidationError::BlankField("title").into());
        }
        self.conn.execute(
            "INSERT INTO tasks (title, state_id) VALUES (?1, ?2);",
            params![title, state_id],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_task(id)?
            .ok_or_else(|| RepoError::not_found("task", id))
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        if task.title.trim().is_empty() {
            return Err(ModelValidationError::BlankField("title").into());
        }
        let changed = self.conn.execute(
            "UPDATE tasks
             SET title = ?1, details = ?2, critical = ?3, state_id = ?4, sort_order = ?5,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?6;",
            params![
                task.title.trim(),
                task.details,
                bool_to_int(task.critical),
                task.state_id,
                task.order,
                task.id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("task", task.id));
        }
        Ok(())
    }

    fn delete_task(&self, id: i64) -> RepoResult<()> {
        let changed = self.conn.execute("DELETE FROM tasks WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("task", id));
        }
        Ok(())
    }

    fn reorder_tasks(&self, ordered_ids: &[i64]) -> RepoResult<()> {
        self.reorder("tasks", ordered_ids)
    }
}

fn map_state_conflict(err: rusqlite::Error, name: &str) -> RepoError {
    if is_unique_violation(&err) {
        RepoError::Conflict(format!("State `{}` already exists", name.trim()))
    } else {
        err.into()
    }
}

fn parse_state_row(row: &Row<'_>) -> rusqlite::Result<TaskState> {
    Ok(TaskState {
        id: row.get(0)?,
        name: row.get(1)?,
        order: row.get(2)?,
        icon: row.get(3)?,
    })
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        details: row.get("details")?,
        critical: int_to_bool("tasks.critical", row.get("critical")?)?,
        state_id: row.get("state_id")?,
        order: row.get("sort_order")?,
        created_at: from_millis("tasks.created_at", row.get("created_at")?)?,
        updated_at: from_millis("tasks.updated_at", row.get("updated_at")?)?,
    })
}
