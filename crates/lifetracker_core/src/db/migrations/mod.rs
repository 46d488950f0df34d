//! Ordered schema scripts for the tracker store.
//!
//! # Invariants
//! - Versions start at 1 and increase by one.
//! - All pending scripts run inside a single transaction.

use crate::db::{DbError, DbResult};
use log::{info, warn};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "synced_records",
        sql: include_str!("0001_synced_records.sql"),
    },
    Migration {
        version: 2,
        name: "planning",
        sql: include_str!("0002_planning.sql"),
    },
    Migration {
        version: 3,
        name: "integrations_and_tasks",
        sql: include_str!("0003_integrations_and_tasks.sql"),
    },
];

/// Highest schema version this build can write.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Schema version currently recorded in the database file.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Names of the scripts that `apply_migrations` would run next.
pub fn pending_migrations(conn: &Connection) -> DbResult<Vec<&'static str>> {
    let current = schema_version(conn)?;
    Ok(MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current)
        .map(|migration| migration.name)
        .collect())
}

/// Runs every script newer than the recorded version.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = schema_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }
    if from == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > from) {
        let script = format!(
            "{}\nPRAGMA user_version = {};",
            migration.sql, migration.version
        );
        if let Err(source) = tx.execute_batch(&script) {
            warn!(
                "event=db_migrate module=db status=error version={} name={}",
                migration.version, migration.name
            );
            return Err(DbError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            });
        }
        info!(
            "event=db_migrate_step module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from_version={from} to_version={latest}");
    Ok(())
}
