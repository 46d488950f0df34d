//! Projects, goals and targets referenced by time logs and agendas.
//!
//! Project and goal ids are assigned by the time-tracking provider and
//! stored as-is. Target ids are generated when an agenda is saved.

use crate::model::planning::{Goal, Project, Target};
use crate::model::record::ModelValidationError;
use crate::repo::RepoResult;
use rusqlite::{params, Connection, OptionalExtension};

pub trait CatalogRepository {
    /// Inserts or renames a project.
    fn upsert_project(&self, project: &Project) -> RepoResult<()>;
    fn upsert_goal(&self, goal: &Goal) -> RepoResult<()>;
    /// Inserts a target unless one with the same id exists.
    fn ensure_target(&self, target: &Target) -> RepoResult<()>;
    fn get_project(&self, project_id: i64) -> RepoResult<Option<Project>>;
    fn get_goal(&self, goal_id: i64) -> RepoResult<Option<Goal>>;
    fn get_target(&self, target_id: &str) -> RepoResult<Option<Target>>;
    fn list_projects(&self) -> RepoResult<Vec<Project>>;
    /// Goals that appear on time logs for `project_id`.
    fn goals_for_project(&self, project_id: i64) -> RepoResult<Vec<Goal>>;
    fn targets_for_goal(&self, goal_id: i64) -> RepoResult<Vec<Target>>;
}

pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn upsert_project(&self, project: &Project) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO projects (project_id, display_string) VALUES (?1, ?2)
             ON CONFLICT (project_id) DO UPDATE SET
                display_string = excluded.display_string,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![project.project_id, project.display_string],
        )?;
        Ok(())
    }

    fn upsert_goal(&self, goal: &Goal) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO goals (goal_id, display_string) VALUES (?1, ?2)
             ON CONFLICT (goal_id) DO UPDATE SET
                display_string = excluded.display_string,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![goal.goal_id, goal.display_string],
        )?;
        Ok(())
    }

    fn ensure_target(&self, target: &Target) -> RepoResult<()> {
        if target.target_id.trim().is_empty() {
            return Err(ModelValidationError::BlankField("target_id").into());
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO targets (target_id, target_name, goal_id) VALUES (?1, ?2, ?3);",
            params![target.target_id, target.target_name, target.goal_id],
        )?;
        Ok(())
    }

    fn get_project(&self, project_id: i64) -> RepoResult<Option<Project>> {
        let project = self
            .conn
            .query_row(
                "SELECT project_id, display_string FROM projects WHERE project_id = ?1;",
                [project_id],
                |row| {
                    Ok(Project {
                        project_id: row.get(0)?,
                        display_string: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    fn get_goal(&self, goal_id: i64) -> RepoResult<Option<Goal>> {
        let goal = self
            .conn
            .query_row(
                "SELECT goal_id, display_string FROM goals WHERE goal_id = ?1;",
                [goal_id],
                |row| {
                    Ok(Goal {
                        goal_id: row.get(0)?,
                        display_string: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(goal)
    }

    fn get_target(&self, target_id: &str) -> RepoResult<Option<Target>> {
        let target = self
            .conn
            .query_row(
                "SELECT target_id, target_name, goal_id FROM targets WHERE target_id = ?1;",
                [target_id],
                |row| {
                    Ok(Target {
                        target_id: row.get(0)?,
                        target_name: row.get(1)?,
                        goal_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(target)
    }

    fn list_projects(&self) -> RepoResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT project_id, display_string FROM projects ORDER BY display_string ASC;",
        )?;
        let projects = stmt
            .query_map([], |row| {
                Ok(Project {
                    project_id: row.get(0)?,
                    display_string: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    fn goals_for_project(&self, project_id: i64) -> RepoResult<Vec<Goal>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT g.goal_id, g.display_string
             FROM goals g
             JOIN time_log_goals tg ON tg.goal_id = g.goal_id
             JOIN time_logs t ON t.id = tg.time_log_id
             WHERE t.project_id = ?1
             ORDER BY g.display_string ASC;",
        )?;
        let goals = stmt
            .query_map([project_id], |row| {
                Ok(Goal {
                    goal_id: row.get(0)?,
                    display_string: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    fn targets_for_goal(&self, goal_id: i64) -> RepoResult<Vec<Target>> {
        let mut stmt = self.conn.prepare(
            "SELECT target_id, target_name, goal_id
             FROM targets
             WHERE goal_id = ?1
             ORDER BY target_name ASC;",
        )?;
        let targets = stmt
            .query_map([goal_id], |row| {
                Ok(Target {
                    target_id: row.get(0)?,
                    target_name: row.get(1)?,
                    goal_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }
}
