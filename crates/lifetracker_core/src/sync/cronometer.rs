//! Cronometer daily nutrition via the external `cronometer_export` binary.
//!
//! # Responsibility
//! - Run the exporter for a date range and parse its JSON output.
//! - Map each exported day to a `NutritionEntry` keyed by its ISO date.
//!
//! # Invariants
//! - The exporter is killed after `EXPORT_TIMEOUT`.
//! - Days with all-zero macros are skipped.
//! - `consumed_at` is local midnight of the exported date in the configured zone.

use crate::model::health::NutritionEntry;
use crate::model::record::{SourceKey, SOURCE_CRONOMETER};
use crate::service::clock::local_day_start;
use crate::sync::result::Batch;
use crate::sync::{SyncError, SyncOutcome};
use chrono::NaiveDate;
use chrono_tz::Tz;
use log::{info, warn};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One exported day as printed by the exporter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyNutrition {
    pub date: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub protein: f64,
}

/// Source of daily nutrition totals.
pub trait NutritionExporter {
    fn export(&self, start: NaiveDate, end: NaiveDate) -> SyncOutcome<Vec<DailyNutrition>>;
}

/// Runs `<binary> -username U -password P -start YYYY-MM-DD -end YYYY-MM-DD`.
pub struct CommandExporter {
    binary: PathBuf,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
}

impl CommandExporter {
    pub fn new(
        binary: impl Into<PathBuf>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            username,
            password,
            timeout: EXPORT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn credentials(&self) -> SyncOutcome<(&str, &str)> {
        let username = self.username.as_deref().filter(|v| !v.trim().is_empty());
        let password = self.password.as_deref().filter(|v| !v.is_empty());
        match (username, password) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(SyncError::Auth(
                "Cronometer credentials not provided. Set CRONOMETER_USERNAME and \
                 CRONOMETER_PASSWORD"
                    .to_string(),
            )),
        }
    }
}

impl NutritionExporter for CommandExporter {
    fn export(&self, start: NaiveDate, end: NaiveDate) -> SyncOutcome<Vec<DailyNutrition>> {
        let (username, password) = self.credentials()?;
        let start = start.to_string();
        let end = end.to_string();
        let mut child = Command::new(&self.binary)
            .args(["-username", username, "-password", password])
            .args(["-start", start.as_str(), "-end", end.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(&self.binary, err))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SyncError::Export(format!(
                        "Cronometer export timed out after {} seconds",
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => return Err(SyncError::Export(err.to_string())),
            }
        };

        let stdout = decode_stdout(collect(stdout, "stdout")?)?;
        let stderr = String::from_utf8_lossy(&collect(stderr, "stderr")?).into_owned();
        if !status.success() {
            let detail = if stderr.trim().is_empty() {
                status.to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(SyncError::Export(format!(
                "Failed to export Cronometer data: {detail}"
            )));
        }
        parse_export(&stdout)
    }
}

type PipeReader = thread::JoinHandle<std::io::Result<Vec<u8>>>;

fn drain<R: Read + Send + 'static>(mut pipe: R) -> PipeReader {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        pipe.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

fn collect(reader: Option<PipeReader>, stream: &str) -> SyncOutcome<Vec<u8>> {
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };
    reader
        .join()
        .map_err(|_| SyncError::Export(format!("reading exporter {stream} panicked")))?
        .map_err(|err| SyncError::Export(format!("failed to read exporter {stream}: {err}")))
}

fn decode_stdout(bytes: Vec<u8>) -> SyncOutcome<String> {
    String::from_utf8(bytes).map_err(|err| {
        SyncError::Export(format!(
            "Cronometer export output is not valid UTF-8 at byte {}",
            err.utf8_error().valid_up_to()
        ))
    })
}

fn spawn_error(binary: &Path, err: std::io::Error) -> SyncError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return SyncError::Config(format!(
            "cronometer_export binary not found at `{}`; build it and set cronometer_binary",
            binary.display()
        ));
    }
    SyncError::Export(format!("failed to start `{}`: {err}", binary.display()))
}

/// The exporter prints `null` when the range is empty.
pub fn parse_export(stdout: &str) -> SyncOutcome<Vec<DailyNutrition>> {
    let days: Option<Vec<DailyNutrition>> = serde_json::from_str(stdout.trim()).map_err(|err| {
        SyncError::Parse(format!("Failed to parse Cronometer export data: {err}"))
    })?;
    Ok(days.unwrap_or_default())
}

pub struct CronometerSync<'a, E: ?Sized> {
    exporter: &'a E,
    timezone: Tz,
}

impl<'a, E: NutritionExporter + ?Sized> CronometerSync<'a, E> {
    pub fn new(exporter: &'a E, timezone: Tz) -> Self {
        Self { exporter, timezone }
    }

    pub fn fetch_entries(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> SyncOutcome<Batch<NutritionEntry>> {
        let mut batch = Batch::default();
        for day in self.exporter.export(start, end)? {
            batch.push(map_day(day, self.timezone));
        }
        info!(
            "event=cronometer_fetch module=sync status=ok days={} skipped={}",
            batch.records.len(),
            batch.skipped
        );
        Ok(batch)
    }
}

fn map_day(day: DailyNutrition, timezone: Tz) -> Option<NutritionEntry> {
    let date = match NaiveDate::parse_from_str(&day.date, "%Y-%m-%d") {
        Ok(date) => date,
        Err(err) => {
            warn!(
                "event=cronometer_day_skipped module=sync reason=bad_date date={} error={err}",
                day.date
            );
            return None;
        }
    };
    let entry = NutritionEntry {
        key: SourceKey::new(SOURCE_CRONOMETER, date.to_string()),
        consumed_at: local_day_start(date, timezone),
        calories: day.calories,
        fat: day.fat,
        carbs: day.carbs,
        protein: day.protein,
    };
    entry.has_meaningful_data().then_some(entry)
}
