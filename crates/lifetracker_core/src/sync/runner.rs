//! Orchestrates provider pulls and persistence.
//!
//! # Responsibility
//! - Run one or all sources for a `SyncWindow` and collect a `SyncResult` each.
//! - Upsert mapped records, or only count them in dry-run mode.
//!
//! # Invariants
//! - A failing source yields a failed `SyncResult`; later sources still run.
//! - Dry runs write no synced records. Refreshed OAuth tokens are still stored.
//! - A record rejected by model validation is counted as skipped.

use crate::config::LifeTrackerConfig;
use crate::model::credential::{PROVIDER_WHOOP, PROVIDER_WITHINGS};
use crate::model::planning::Project;
use crate::model::record::{SourceKey, UpsertOutcome};
use crate::repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
use crate::repo::credential_repo::SqliteCredentialRepository;
use crate::repo::record_repo::{RecordTable, SqliteSyncedRecordRepository, SyncedRecordRepository};
use crate::repo::{RepoError, RepoResult};
use crate::service::clock::resolve_tz;
use crate::sync::cronometer::{CronometerSync, NutritionExporter};
use crate::sync::http::HttpTransport;
use crate::sync::result::{Batch, SyncResult};
use crate::sync::toggl::{TogglSync, TogglTimeEntry};
use crate::sync::whoop::WhoopSync;
use crate::sync::window::{SyncSource, SyncWindow};
use crate::sync::withings::WithingsSync;
use crate::sync::SyncOutcome;
use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::Connection;

pub struct SyncRunner<'a, T, E: ?Sized> {
    conn: &'a Connection,
    transport: &'a T,
    exporter: &'a E,
    config: &'a LifeTrackerConfig,
    dry_run: bool,
}

impl<'a, T, E> SyncRunner<'a, T, E>
where
    T: HttpTransport,
    E: NutritionExporter + ?Sized,
{
    pub fn new(
        conn: &'a Connection,
        transport: &'a T,
        exporter: &'a E,
        config: &'a LifeTrackerConfig,
    ) -> Self {
        Self {
            conn,
            transport,
            exporter,
            config,
            dry_run: false,
        }
    }

    /// Fetch and map only; count what would change.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Runs `only`, or every source when `only` is empty.
    pub fn sync_all(
        &self,
        window: SyncWindow,
        only: &[SyncSource],
        now: DateTime<Utc>,
    ) -> Vec<SyncResult> {
        let sources: Vec<SyncSource> = if only.is_empty() {
            SyncSource::ALL.to_vec()
        } else {
            SyncSource::ALL
                .into_iter()
                .filter(|source| only.contains(source))
                .collect()
        };
        sources
            .into_iter()
            .map(|source| self.sync_source(source, window, now))
            .collect()
    }

    pub fn sync_source(
        &self,
        source: SyncSource,
        window: SyncWindow,
        now: DateTime<Utc>,
    ) -> SyncResult {
        let start = window.start_for(source, now);
        let outcome = match source {
            SyncSource::Whoop => self.sync_whoop(start, now),
            SyncSource::Withings => self.sync_withings(start, now),
            SyncSource::Toggl => self.sync_toggl(start, now),
            SyncSource::Cronometer => self.sync_cronometer(start, now),
        };
        match outcome {
            Ok(result) => {
                info!(
                    "event=sync_source module=sync status=ok source={} window={} dry_run={} created={} updated={} skipped={}",
                    source,
                    window.describe(),
                    self.dry_run,
                    result.created,
                    result.updated,
                    result.skipped
                );
                result
            }
            Err(err) => {
                warn!(
                    "event=sync_source module=sync status=error source={} auth_error={} error={}",
                    source,
                    err.is_auth(),
                    err
                );
                SyncResult::failed(source, &err)
            }
        }
    }

    fn records(&self) -> SqliteSyncedRecordRepository<'a> {
        SqliteSyncedRecordRepository::new(self.conn)
    }

    fn sync_whoop(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> SyncOutcome<SyncResult> {
        let credentials = SqliteCredentialRepository::new(self.conn);
        let fallback = self.config.whoop.to_credential(PROVIDER_WHOOP);
        let mut client = WhoopSync::new(self.transport, &credentials, fallback)?;
        let batch = client.fetch_workouts(start, now, now)?;
        self.store(SyncSource::Whoop, batch, RecordTable::Workouts, |w| &w.key, |repo, w| {
            repo.upsert_workout(w)
        })
    }

    fn sync_withings(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> SyncOutcome<SyncResult> {
        let credentials = SqliteCredentialRepository::new(self.conn);
        let fallback = self.config.withings.to_credential(PROVIDER_WITHINGS);
        let mut client = WithingsSync::new(self.transport, &credentials, fallback)?;
        let batch = client.fetch_weigh_ins(start, now, now)?;
        self.store(SyncSource::Withings, batch, RecordTable::WeighIns, |w| &w.key, |repo, w| {
            repo.upsert_weigh_in(w)
        })
    }

    fn sync_toggl(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> SyncOutcome<SyncResult> {
        let credentials = SqliteCredentialRepository::new(self.conn);
        let fallback = self.config.toggl.to_credential();
        let client = TogglSync::new(self.transport, &credentials, fallback)?;
        let batch = client.fetch_time_entries(start, now)?;
        let catalog = SqliteCatalogRepository::new(self.conn);
        self.store(
            SyncSource::Toggl,
            batch,
            RecordTable::TimeLogs,
            |entry| &entry.log.key,
            |repo, entry| {
                ensure_catalog(&catalog, entry)?;
                repo.upsert_time_log(&entry.log)
            },
        )
    }

    fn sync_cronometer(
        &self,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SyncOutcome<SyncResult> {
        let tz = resolve_tz(self.config.cronometer.timezone_name());
        let client = CronometerSync::new(self.exporter, tz);
        let batch = client.fetch_entries(
            start.with_timezone(&tz).date_naive(),
            now.with_timezone(&tz).date_naive(),
        )?;
        self.store(
            SyncSource::Cronometer,
            batch,
            RecordTable::NutritionEntries,
            |entry| &entry.key,
            |repo, entry| repo.upsert_nutrition_entry(entry),
        )
    }

    fn store<R>(
        &self,
        source: SyncSource,
        batch: Batch<R>,
        table: RecordTable,
        key: impl Fn(&R) -> &SourceKey,
        upsert: impl Fn(&SqliteSyncedRecordRepository<'a>, &R) -> RepoResult<UpsertOutcome>,
    ) -> SyncOutcome<SyncResult> {
        let repo = self.records();
        let mut result = SyncResult::new(source);
        result.skipped = batch.skipped;
        for record in &batch.records {
            if self.dry_run {
                let outcome = if repo.record_exists(table, key(record))? {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Created
                };
                result.record(outcome);
                continue;
            }
            match upsert(&repo, record) {
                Ok(outcome) => result.record(outcome),
                Err(RepoError::Validation(err)) => {
                    warn!(
                        "event=sync_record_rejected module=sync source={} source_id={} error={}",
                        source,
                        key(record).source_id,
                        err
                    );
                    result.skip();
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(result)
    }
}

/// Makes sure the project and goal rows a Toggl entry points at exist.
fn ensure_catalog(catalog: &impl CatalogRepository, entry: &TogglTimeEntry) -> RepoResult<()> {
    if let Some(project_id) = entry.log.project_id {
        match &entry.project_name {
            Some(name) => catalog.upsert_project(&Project {
                project_id,
                display_string: name.clone(),
            })?,
            None => {
                if catalog.get_project(project_id)?.is_none() {
                    catalog.upsert_project(&Project {
                        project_id,
                        display_string: format!("Toggl project {project_id}"),
                    })?;
                }
            }
        }
    }
    for goal in &entry.goals {
        catalog.upsert_goal(goal)?;
    }
    Ok(())
}
