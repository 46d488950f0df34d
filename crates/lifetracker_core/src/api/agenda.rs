//! Agenda page handlers.
//!
//! # Invariants
//! - A missing `date` on save means today's UTC date.
//! - Scores are `0`, `0.5`, `1`, or `null` (clears the score).

use crate::api::{finish, parse_body, parse_date, to_json, ApiResponse, HandlerResult};
use crate::model::planning::AGENDA_SLOTS;
use crate::repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
use crate::service::agenda_service::{AgendaService, SlotInput};
use crate::service::clock::{resolve_tz, user_today};
use crate::service::ServiceError;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SaveAgendaRequest {
    date: Option<String>,
    slots: Vec<SlotInput>,
    notes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimeSpentQuery {
    project_id: Option<i64>,
    goal_id: Option<i64>,
    date: Option<String>,
    timezone: Option<String>,
}

/// `POST /targets/save` with `{date?, slots: [{project_id, goal_id, target}], notes}`.
pub fn save_agenda(conn: &Connection, body: &Value, now: DateTime<Utc>) -> ApiResponse {
    finish(save_agenda_inner(conn, body, now))
}

fn save_agenda_inner(conn: &Connection, body: &Value, now: DateTime<Utc>) -> HandlerResult {
    let request: SaveAgendaRequest = parse_body(body)?;
    let date = match request.date.as_deref().filter(|value| !value.trim().is_empty()) {
        Some(value) => parse_date(value)?,
        None => now.date_naive(),
    };
    if request.slots.len() > AGENDA_SLOTS {
        return Err(ApiResponse::bad_request(format!(
            "At most {AGENDA_SLOTS} targets can be planned per day"
        )));
    }
    let mut slots: [SlotInput; AGENDA_SLOTS] = Default::default();
    for (slot, input) in slots.iter_mut().zip(request.slots) {
        *slot = input;
    }

    let agenda = AgendaService::sqlite(conn).save_agenda(date, &slots, &request.notes)?;
    Ok(ApiResponse::ok(json!({
        "message": "Today's agenda has been set!",
        "date": agenda.date.to_string(),
        "day_score": agenda.day_score,
    })))
}

/// `GET /targets/agenda?date=YYYY-MM-DD`.
pub fn get_agenda(conn: &Connection, date: Option<&str>) -> ApiResponse {
    finish(get_agenda_inner(conn, date))
}

fn get_agenda_inner(conn: &Connection, date: Option<&str>) -> HandlerResult {
    let Some(date) = date.filter(|value| !value.trim().is_empty()) else {
        return Err(ApiResponse::bad_request("Date parameter is required"));
    };
    let view = AgendaService::sqlite(conn).get_agenda(parse_date(date)?)?;
    Ok(ApiResponse::ok(json!({ "agenda": to_json(&view)? })))
}

/// Dates that have an agenda, newest first.
pub fn agenda_dates(conn: &Connection) -> ApiResponse {
    finish(agenda_dates_inner(conn))
}

fn agenda_dates_inner(conn: &Connection) -> HandlerResult {
    let dates: Vec<String> = AgendaService::sqlite(conn)
        .list_agenda_dates()?
        .into_iter()
        .map(|date| date.to_string())
        .collect();
    Ok(ApiResponse::ok(json!({ "dates": dates })))
}

/// `POST /targets/score` with `{date, target_num, score}`.
pub fn save_target_score(conn: &Connection, body: &Value) -> ApiResponse {
    finish(save_target_score_inner(conn, body))
}

fn save_target_score_inner(conn: &Connection, body: &Value) -> HandlerResult {
    let date = body.get("date").and_then(Value::as_str);
    let target_num = body.get("target_num");
    let score = body.get("score");
    let (Some(date), Some(target_num), Some(score)) = (date, target_num, score) else {
        return Err(ApiResponse::bad_request("Missing required parameters"));
    };

    let slot_number = match number_field(target_num) {
        Some(value) if (1.0..=AGENDA_SLOTS as f64).contains(&value) && value.fract() == 0.0 => {
            value as usize
        }
        _ => return Err(ApiResponse::bad_request("target_num must be 1, 2, or 3")),
    };
    let score = match score {
        Value::Null => None,
        Value::String(text) if text == "null" => None,
        other => match number_field(other) {
            Some(value) => Some(value),
            None => return Err(ApiResponse::bad_request("score must be 0, 0.5, 1, or null")),
        },
    };

    let day_score =
        AgendaService::sqlite(conn).save_target_score(parse_date(date)?, slot_number, score)?;
    Ok(ApiResponse::ok(json!({
        "message": format!("Score saved for target {slot_number}"),
        "day_score": day_score,
    })))
}

/// Accepts a JSON number or a numeric string, as HTML forms send.
fn number_field(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// `GET /targets/time` with `{project_id, goal_id?, date?, timezone?}`.
///
/// `default_timezone` applies when the query names none; `date` defaults to
/// today in that zone.
pub fn time_spent(
    conn: &Connection,
    query: &Value,
    now: DateTime<Utc>,
    default_timezone: &str,
) -> ApiResponse {
    finish(time_spent_inner(conn, query, now, default_timezone))
}

fn time_spent_inner(
    conn: &Connection,
    query: &Value,
    now: DateTime<Utc>,
    default_timezone: &str,
) -> HandlerResult {
    let query: TimeSpentQuery = parse_body(query)?;
    let Some(project_id) = query.project_id else {
        return Err(ApiResponse::bad_request("project_id is required"));
    };
    let timezone = query
        .timezone
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(default_timezone);
    let date = match query.date.as_deref() {
        Some(value) => parse_date(value)?,
        None => user_today(now, resolve_tz(timezone)).0,
    };

    let spent = AgendaService::sqlite(conn).time_spent(project_id, query.goal_id, date, timezone)?;
    Ok(ApiResponse::ok(json!({
        "total_seconds": spent.total_seconds,
        "hours": spent.hours,
        "minutes": spent.minutes,
        "display": spent.display(),
    })))
}

/// Goals previously logged against a project; empty without a project.
pub fn goals_for_project(conn: &Connection, project_id: Option<i64>) -> ApiResponse {
    finish(goals_for_project_inner(conn, project_id))
}

fn goals_for_project_inner(conn: &Connection, project_id: Option<i64>) -> HandlerResult {
    let goals = match project_id {
        Some(project_id) => SqliteCatalogRepository::new(conn)
            .goals_for_project(project_id)
            .map_err(ServiceError::from)?,
        None => Vec::new(),
    };
    Ok(ApiResponse::ok(json!({ "goals": to_json(&goals)? })))
}

/// Targets created under a goal; empty without a goal.
pub fn targets_for_goal(conn: &Connection, goal_id: Option<i64>) -> ApiResponse {
    finish(targets_for_goal_inner(conn, goal_id))
}

fn targets_for_goal_inner(conn: &Connection, goal_id: Option<i64>) -> HandlerResult {
    let targets = match goal_id {
        Some(goal_id) => SqliteCatalogRepository::new(conn)
            .targets_for_goal(goal_id)
            .map_err(ServiceError::from)?,
        None => Vec::new(),
    };
    Ok(ApiResponse::ok(json!({ "targets": to_json(&targets)? })))
}

#[cfg(test)]
mod tests {
    use super::{
        agenda_dates, get_agenda, goals_for_project, save_agenda, save_target_score, time_spent,
    };
    use crate::db::open_db_in_memory;
    use crate::model::activity::TimeLog;
    use crate::model::planning::{Goal, Project};
    use crate::model::record::{SourceKey, SOURCE_TOGGL};
    use crate::repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
    use crate::repo::record_repo::{SqliteSyncedRecordRepository, SyncedRecordRepository};
    use chrono::{TimeZone, Utc};
    use rusqlite::Connection;
    use serde_json::json;

    fn seeded() -> Connection {
        let conn = open_db_in_memory().unwrap();
        let catalog = SqliteCatalogRepository::new(&conn);
        catalog
            .upsert_project(&Project {
                project_id: 7,
                display_string: "Writing".to_string(),
            })
            .unwrap();
        catalog
            .upsert_goal(&Goal {
                goal_id: 70,
                display_string: "Novel".to_string(),
            })
            .unwrap();
        conn
    }

    #[test]
    fn save_then_get_round_trips_names() {
        let conn = seeded();
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 15, 0, 0).unwrap();
        let saved = save_agenda(
            &conn,
            &json!({
                "slots": [
                    {"project_id": 7, "goal_id": 70, "target": "Draft chapter 3"},
                    {"project_id": 7, "target": "   "}
                ],
                "notes": "busy day"
            }),
            now,
        );
        assert_eq!(saved.status, 200, "{:?}", saved.body);
        assert_eq!(saved.body["date"], "2025-11-02");

        let fetched = get_agenda(&conn, Some("2025-11-02"));
        assert_eq!(fetched.status, 200);
        let targets = &fetched.body["agenda"]["targets"];
        assert_eq!(targets[0]["project_name"], "Writing");
        assert_eq!(targets[0]["goal_name"], "Novel");
        assert_eq!(targets[0]["target_name"], "Draft chapter 3");
        assert!(targets[1]["target_id"].is_null());
        assert_eq!(fetched.body["agenda"]["notes"], "busy day");

        assert_eq!(agenda_dates(&conn).body["dates"], json!(["2025-11-02"]));
        assert_eq!(goals_for_project(&conn, None).body["goals"], json!([]));
    }

    #[test]
    fn get_requires_a_date_and_an_existing_agenda() {
        let conn = seeded();
        assert_eq!(get_agenda(&conn, None).status, 400);
        let missing = get_agenda(&conn, Some("2025-01-01"));
        assert_eq!(missing.status, 404);
        assert_eq!(missing.body["error"], "No agenda found for this date");
    }

    #[test]
    fn unknown_project_is_rejected() {
        let conn = seeded();
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 15, 0, 0).unwrap();
        let response = save_agenda(
            &conn,
            &json!({"slots": [{"project_id": 99, "target": "x"}]}),
            now,
        );
        assert_eq!(response.status, 400);
        assert_eq!(response.body["success"], false);
    }

    #[test]
    fn scoring_updates_day_score_and_validates_input() {
        let conn = seeded();
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 15, 0, 0).unwrap();
        save_agenda(
            &conn,
            &json!({
                "date": "2025-11-02",
                "slots": [
                    {"project_id": 7, "target": "a"},
                    {"project_id": 7, "target": "b"}
                ]
            }),
            now,
        );

        let scored = save_target_score(
            &conn,
            &json!({"date": "2025-11-02", "target_num": 1, "score": 1}),
        );
        assert_eq!(scored.status, 200);
        assert_eq!(scored.body["day_score"], 0.5);

        let form_style = save_target_score(
            &conn,
            &json!({"date": "2025-11-02", "target_num": "2", "score": "0.5"}),
        );
        assert_eq!(form_style.body["day_score"], 0.75);

        let cleared = save_target_score(
            &conn,
            &json!({"date": "2025-11-02", "target_num": 2, "score": null}),
        );
        assert_eq!(cleared.body["day_score"], 0.5);

        let bad_slot = save_target_score(
            &conn,
            &json!({"date": "2025-11-02", "target_num": 4, "score": 1}),
        );
        assert_eq!(bad_slot.body["error"], "target_num must be 1, 2, or 3");

        let bad_score = save_target_score(
            &conn,
            &json!({"date": "2025-11-02", "target_num": 1, "score": 0.7}),
        );
        assert_eq!(bad_score.status, 400);

        let missing = save_target_score(&conn, &json!({"date": "2025-11-02"}));
        assert_eq!(missing.body["error"], "Missing required parameters");

        let no_agenda = save_target_score(
            &conn,
            &json!({"date": "2025-11-05", "target_num": 1, "score": 1}),
        );
        assert_eq!(no_agenda.status, 404);
    }

    #[test]
    fn time_spent_sums_the_local_day() {
        let conn = seeded();
        let records = SqliteSyncedRecordRepository::new(&conn);
        records
            .upsert_time_log(&TimeLog {
                key: SourceKey::new(SOURCE_TOGGL, "1"),
                start: Utc.with_ymd_and_hms(2025, 11, 2, 15, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 11, 2, 16, 5, 0).unwrap(),
                project_id: Some(7),
                goal_ids: vec![70],
            })
            .unwrap();
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 20, 0, 0).unwrap();

        let response = time_spent(&conn, &json!({"project_id": 7}), now, "America/Chicago");
        assert_eq!(response.status, 200);
        assert_eq!(response.body["total_seconds"], 3900);
        assert_eq!(response.body["display"], "1h 5m");

        let other_day = time_spent(
            &conn,
            &json!({"project_id": 7, "goal_id": 70, "date": "2025-11-01"}),
            now,
            "America/Chicago",
        );
        assert_eq!(other_day.body["display"], "0m");

        assert_eq!(time_spent(&conn, &json!({}), now, "UTC").status, 400);
    }
}
