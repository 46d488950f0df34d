//! Command handlers. Each returns the process exit code.

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use chrono_tz::Tz;
use lifetracker_core::model::credential::{PROVIDER_WHOOP, PROVIDER_WITHINGS};
use lifetracker_core::repo::credential_repo::SqliteCredentialRepository;
use lifetracker_core::service::clock::resolve_tz;
use lifetracker_core::service::habit_service::HabitGridService;
use lifetracker_core::service::objective_service::ObjectiveService;
use lifetracker_core::service::settings_service::SettingsService;
use lifetracker_core::sync::{
    CommandExporter, ReqwestTransport, SyncResult, SyncRunner, SyncSource, SyncWindow,
    WhoopSync, WithingsSync,
};
use lifetracker_core::{open_db, LifeTrackerConfig};
use log::info;
use rusqlite::Connection;
use std::process::ExitCode;
use uuid::Uuid;

pub struct App {
    config: LifeTrackerConfig,
    conn: Connection,
    window: SyncWindow,
    dry_run: bool,
}

impl App {
    pub fn open(config: LifeTrackerConfig, window: SyncWindow, dry_run: bool) -> Result<Self> {
        let path = config.database_path();
        let conn = open_db(&path)
            .with_context(|| format!("failed to open database `{}`", path.display()))?;
        Ok(Self {
            config,
            conn,
            window,
            dry_run,
        })
    }

    /// Config zone first, then the stored objective default.
    fn timezone(&self) -> Result<Tz> {
        if let Some(name) = self.config.default_timezone.as_deref() {
            return Ok(resolve_tz(name));
        }
        Ok(SettingsService::new(&self.conn).default_timezone()?)
    }

    pub fn sync(&self, sources: &[SyncSource]) -> Result<ExitCode> {
        let transport = ReqwestTransport::new()?;
        let exporter = CommandExporter::new(
            self.config.cronometer_binary(),
            self.config.cronometer.username.clone(),
            self.config.cronometer.password.clone(),
        );
        let runner = SyncRunner::new(&self.conn, &transport, &exporter, &self.config)
            .dry_run(self.dry_run);

        if self.dry_run {
            println!("Dry run: no records will be written.");
        }
        println!("Syncing {}...", self.window.describe());
        let results = runner.sync_all(self.window, sources, Utc::now());
        for result in &results {
            print_result(result);
        }
        Ok(if all_succeeded(&results) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    pub fn update_objectives(&self, objective_id: Option<i64>) -> Result<ExitCode> {
        let report = ObjectiveService::sqlite(&self.conn).refresh_results(objective_id, Utc::now())?;
        for (id, label, error) in &report.failures {
            eprintln!("Error updating objective {id} ({label}): {error}");
        }
        println!(
            "Updated {} objective(s), {} error(s).",
            report.updated,
            report.error_count()
        );
        Ok(if report.error_count() == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    pub fn objectives(&self, year: Option<i32>, month: Option<u32>) -> Result<ExitCode> {
        let now = Utc::now();
        let local = now.with_timezone(&self.timezone()?);
        let year = year.unwrap_or_else(|| local.year());
        let month = month.unwrap_or_else(|| local.month());
        let rows = ObjectiveService::sqlite(&self.conn).month_progress(year, month, now)?;
        if rows.is_empty() {
            println!("No objectives for {year}-{month:02}.");
            return Ok(ExitCode::SUCCESS);
        }
        for row in &rows {
            let unit = row.unit_of_measurement.as_deref().unwrap_or("");
            let percent = row
                .percent
                .map(|value| format!("{value:.0}%"))
                .unwrap_or_else(|| "n/a".to_string());
            println!(
                "{:<32} {:>10.2} / {:<10.2} {:<10} {:>6}  today {:.2}",
                row.label, row.result, row.objective_value, unit, percent, row.today
            );
            if let Some(error) = &row.error {
                println!("    error: {error}");
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    pub fn habit_grid(&self, year: Option<i32>) -> Result<ExitCode> {
        let tz = self.timezone()?;
        let year = year.unwrap_or_else(|| Utc::now().with_timezone(&tz).year());
        let grid = HabitGridService::sqlite(&self.conn).year_grid(year, tz.name())?;
        for month in &grid.months {
            println!("{} {}", month.name, grid.year);
            for habit in &month.habits {
                let days: Vec<String> = habit.days.iter().map(u32::to_string).collect();
                println!(
                    "  {:<24} {:>2}/{:<2} {}",
                    habit.display_name,
                    habit.days.len(),
                    month.days_in_month,
                    days.join(" ")
                );
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    pub fn whoop_auth(&self, code: Option<&str>) -> Result<ExitCode> {
        let transport = ReqwestTransport::new()?;
        let credentials = SqliteCredentialRepository::new(&self.conn);
        let fallback = self.config.whoop.to_credential(PROVIDER_WHOOP);
        let mut client = WhoopSync::new(&transport, &credentials, fallback)?;
        match code {
            Some(code) => {
                client.exchange_code(code.trim(), Utc::now())?;
                info!("event=oauth_exchange module=cli status=ok provider={PROVIDER_WHOOP}");
                println!("Whoop tokens saved.");
            }
            None => {
                let url = client.authorization_url(&new_state())?;
                println!("Open this URL, approve access, then run:");
                println!("  lifetracker whoop-auth --code <CODE>");
                println!("{url}");
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    pub fn withings_auth(&self, code: Option<&str>) -> Result<ExitCode> {
        let transport = ReqwestTransport::new()?;
        let credentials = SqliteCredentialRepository::new(&self.conn);
        let fallback = self.config.withings.to_credential(PROVIDER_WITHINGS);
        let mut client = WithingsSync::new(&transport, &credentials, fallback)?;
        match code {
            Some(code) => {
                client.exchange_code(code.trim(), Utc::now())?;
                info!("event=oauth_exchange module=cli status=ok provider={PROVIDER_WITHINGS}");
                println!("Withings tokens saved.");
            }
            None => {
                let url = client.authorization_url(&new_state())?;
                println!("Open this URL, approve access, then run:");
                println!("  lifetracker withings-auth --code <CODE>");
                println!("{url}");
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    pub fn set_setting(&self, key: &str, value: &str, description: &str) -> Result<ExitCode> {
        SettingsService::new(&self.conn).set(key, value, description)?;
        println!("Setting `{key}` saved.");
        Ok(ExitCode::SUCCESS)
    }
}

fn new_state() -> String {
    Uuid::new_v4().simple().to_string()
}

fn print_result(result: &SyncResult) {
    if result.success {
        println!("{}: {}", result.source, result.summary());
    } else {
        eprintln!("{}: {}", result.source, result.summary());
    }
}

/// False when any source failed, including re-auth prompts.
fn all_succeeded(results: &[SyncResult]) -> bool {
    results
        .iter()
        .all(|result| result.success && !result.auth_error)
}
