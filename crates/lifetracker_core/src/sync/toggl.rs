//! Toggl Track time entries.
//!
//! Toggl projects map to `projects`, Toggl tags map to `goals`.
//!
//! # Invariants
//! - Auth is HTTP basic with the API token as user and `api_token` as password.
//! - Entries missing id, start, stop, or project are skipped.
//! - Tags that are not workspace tags are dropped from goal links.

use crate::model::activity::TimeLog;
use crate::model::credential::{ApiCredential, PROVIDER_TOGGL};
use crate::model::planning::Goal;
use crate::model::record::{SourceKey, SOURCE_TOGGL};
use crate::repo::credential_repo::CredentialRepository;
use crate::sync::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::sync::result::Batch;
use crate::sync::{SyncError, SyncOutcome};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

pub const TOGGL_API_BASE: &str = "https://api.track.toggl.com/api/v9";
pub const TOGGL_REPORTS_BASE: &str = "https://api.track.toggl.com/reports/api/v3";

/// A mapped time log plus the catalog rows it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TogglTimeEntry {
    pub log: TimeLog,
    /// Toggl's name for the project, when the workspace still lists it.
    pub project_name: Option<String>,
    pub goals: Vec<Goal>,
}

#[derive(Debug, Deserialize)]
struct NamedItem {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReportGroup {
    #[serde(default)]
    project_id: Option<i64>,
    #[serde(default)]
    tag_ids: Vec<i64>,
    #[serde(default)]
    time_entries: Vec<ReportEntry>,
}

#[derive(Debug, Deserialize)]
struct ReportEntry {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    stop: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunningEntry {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    project_id: Option<i64>,
    #[serde(default)]
    pid: Option<i64>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    stop: Option<String>,
}

/// One entry after the report groups are flattened.
#[derive(Debug, Clone, PartialEq)]
struct FlatEntry {
    id: Option<i64>,
    project_id: Option<i64>,
    tags: Vec<String>,
    start: Option<String>,
    stop: Option<String>,
}

pub struct TogglSync<'a, T> {
    transport: &'a T,
    credential: ApiCredential,
}

impl<'a, T: HttpTransport> TogglSync<'a, T> {
    /// Stored credentials win over `fallback`.
    pub fn new<C: CredentialRepository>(
        transport: &'a T,
        credentials: &C,
        fallback: Option<ApiCredential>,
    ) -> SyncOutcome<Self> {
        let credential = match credentials.load_api(PROVIDER_TOGGL)? {
            Some(credential) => credential,
            None => fallback.ok_or_else(|| {
                SyncError::Config(
                    "Toggl API token not found. Store it in the database or set TOGGL_API_TOKEN"
                        .to_string(),
                )
            })?,
        };
        if credential.api_token.trim().is_empty() {
            return Err(SyncError::Config("Toggl API token is empty".to_string()));
        }
        Ok(Self {
            transport,
            credential,
        })
    }

    fn workspace_id(&self) -> SyncOutcome<&str> {
        self.credential
            .workspace_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| SyncError::Config("TOGGL_WORKSPACE_ID must be set".to_string()))
    }

    fn track_base(&self) -> &str {
        self.credential
            .api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or(TOGGL_API_BASE)
    }

    fn send(&self, request: HttpRequest) -> SyncOutcome<HttpResponse> {
        let response = self
            .transport
            .send(&request.basic(&self.credential.api_token, "api_token"))?;
        if response.status == 401 || response.status == 403 {
            return Err(SyncError::Auth(
                "Toggl rejected the API token. Update it in api_credentials or TOGGL_API_TOKEN"
                    .to_string(),
            ));
        }
        response.error_for_status()
    }

    fn list_named(&self, path: &str) -> SyncOutcome<Vec<NamedItem>> {
        let response = self.send(HttpRequest::get(format!("{}{path}", self.track_base())))?;
        // Toggl answers `null` for an empty collection.
        let items: Option<Vec<NamedItem>> = response.json()?;
        Ok(items.unwrap_or_default())
    }

    /// Returns the running timer, or `None` when idle or unreachable.
    fn current_entry(&self) -> Option<FlatEntry> {
        let request = HttpRequest::get(format!("{}/me/time_entries/current", self.track_base()));
        let running = match self.send(request).and_then(|r| r.json::<Option<RunningEntry>>()) {
            Ok(running) => running?,
            Err(err) => {
                warn!("event=toggl_current_entry module=sync status=error error={err}");
                return None;
            }
        };
        running.id?;
        Some(FlatEntry {
            id: running.id,
            project_id: running.project_id.or(running.pid),
            tags: running.tags.unwrap_or_default(),
            start: running.start,
            stop: running.stop,
        })
    }

    /// Fetches report entries between `start` and `end` plus the running timer.
    pub fn fetch_time_entries(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncOutcome<Batch<TogglTimeEntry>> {
        let workspace_id = self.workspace_id()?.to_string();
        let projects = self.list_named(&format!("/workspaces/{workspace_id}/projects"))?;
        let tags = self.list_named(&format!("/workspaces/{workspace_id}/tags"))?;

        let request = HttpRequest::post(format!(
            "{TOGGL_REPORTS_BASE}/workspace/{workspace_id}/search/time_entries"
        ))
        .json(json!({
            "start_date": start.format("%Y-%m-%d").to_string(),
            "end_date": end.format("%Y-%m-%d").to_string(),
        }));
        let groups: Option<Vec<ReportGroup>> = self.send(request)?.json()?;

        let tag_names: HashMap<i64, String> =
            tags.iter().map(|tag| (tag.id, tag.name.clone())).collect();
        let mut entries = flatten_groups(groups.unwrap_or_default(), &tag_names);
        if let Some(running) = self.current_entry() {
            entries.push(running);
        }

        let project_names: HashMap<i64, String> =
            projects.into_iter().map(|p| (p.id, p.name)).collect();
        let tag_ids: HashMap<String, i64> = tags.into_iter().map(|t| (t.name, t.id)).collect();
        let mut batch = Batch::default();
        for entry in entries {
            batch.push(map_entry(entry, &project_names, &tag_ids));
        }
        info!(
            "event=toggl_fetch module=sync status=ok entries={} skipped={}",
            batch.records.len(),
            batch.skipped
        );
        Ok(batch)
    }
}

fn flatten_groups(groups: Vec<ReportGroup>, tag_names: &HashMap<i64, String>) -> Vec<FlatEntry> {
    let mut flat = Vec::new();
    for group in groups {
        let tags = group
            .tag_ids
            .iter()
            .map(|id| tag_names.get(id).cloned().unwrap_or_else(|| id.to_string()))
            .collect::<Vec<_>>();
        for entry in group.time_entries {
            flat.push(FlatEntry {
                id: entry.id,
                project_id: group.project_id,
                tags: tags.clone(),
                start: entry.start,
                stop: entry.stop,
            });
        }
    }
    flat
}

fn map_entry(
    entry: FlatEntry,
    project_names: &HashMap<i64, String>,
    tag_ids: &HashMap<String, i64>,
) -> Option<TogglTimeEntry> {
    let id = entry.id.filter(|id| *id != 0)?;
    let project_id = entry.project_id.filter(|id| *id != 0)?;
    let start = parse_instant(entry.start.as_deref())?;
    let end = parse_instant(entry.stop.as_deref())?;

    let mut goals: Vec<Goal> = Vec::new();
    for name in entry.tags.iter().filter(|name| !name.is_empty()) {
        if let Some(goal_id) = tag_ids.get(name) {
            if goals.iter().all(|goal| goal.goal_id != *goal_id) {
                goals.push(Goal {
                    goal_id: *goal_id,
                    display_string: name.clone(),
                });
            }
        }
    }

    Some(TogglTimeEntry {
        log: TimeLog {
            key: SourceKey::new(SOURCE_TOGGL, id.to_string()),
            start,
            end,
            project_id: Some(project_id),
            goal_ids: goals.iter().map(|goal| goal.goal_id).collect(),
        },
        project_name: project_names.get(&project_id).cloned(),
        goals,
    })
}

fn parse_instant(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
