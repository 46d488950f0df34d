//! Key/value settings persistence.

use crate::model::credential::Setting;
use crate::model::record::ModelValidationError;
use crate::repo::RepoResult;
use rusqlite::{params, Connection, OptionalExtension};

pub trait SettingRepository {
    fn get(&self, key: &str) -> RepoResult<Option<String>>;
    /// Returns the stored value or `default` when the key is absent.
    fn get_or(&self, key: &str, default: &str) -> RepoResult<String> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }
    /// Inserts or replaces one setting. An empty description keeps the stored one.
    fn set(&self, key: &str, value: &str, description: &str) -> RepoResult<()>;
    fn list(&self) -> RepoResult<Vec<Setting>>;
}

pub struct SqliteSettingRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SettingRepository for SqliteSettingRepository<'_> {
    fn get(&self, key: &str) -> RepoResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?1;", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str, description: &str) -> RepoResult<()> {
        if key.trim().is_empty() {
            return Err(ModelValidationError::BlankField("key").into());
        }
        self.conn.execute(
            "INSERT INTO settings (key, value, description)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                description = CASE
                    WHEN excluded.description = '' THEN settings.description
                    ELSE excluded.description
                END,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![key.trim(), value, description],
        )?;
        Ok(())
    }

    fn list(&self) -> RepoResult<Vec<Setting>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, description FROM settings ORDER BY key ASC;")?;
        let settings = stmt
            .query_map([], |row| {
                Ok(Setting {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::{SettingRepository, SqliteSettingRepository};
    use crate::db::open_db_in_memory;

    #[test]
    fn set_is_an_upsert_that_keeps_description() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteSettingRepository::new(&conn);
        repo.set("theme", "dark", "UI theme").unwrap();
        repo.set("theme", "light", "").unwrap();

        let all = repo.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, "light");
        assert_eq!(all[0].description, "UI theme");
    }

    #[test]
    fn get_or_falls_back_to_default() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteSettingRepository::new(&conn);
        assert_eq!(repo.get_or("missing", "fallback").unwrap(), "fallback");
    }
}
