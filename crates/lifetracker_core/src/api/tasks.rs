//! Kanban board handlers for tasks and their states.
//!
//! # Invariants
//! - Task payloads always carry `state_name` resolved from the current states.
//! - `state_id: null` (or `0`) on update moves a task off the board.

use crate::api::{finish, parse_body, ApiResponse, HandlerResult};
use crate::model::task::{Task, TaskPatch, TaskState};
use crate::service::clock::resolve_tz;
use crate::service::task_service::TaskBoardService;
use crate::service::ServiceResult;
use chrono::{DateTime, Timelike, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateTaskRequest {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateStateRequest {
    name: String,
    bootstrap_icon: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpdateStateRequest {
    name: Option<String>,
}

fn task_json(task: &Task, states: &[TaskState]) -> Value {
    let state_name = task
        .state_id
        .and_then(|id| states.iter().find(|state| state.id == id))
        .map(|state| state.name.clone());
    json!({
        "id": task.id,
        "title": task.title,
        "details": task.details,
        "critical": task.critical,
        "state_id": task.state_id,
        "state_name": state_name,
        "order": task.order,
    })
}

fn state_json(state: &TaskState) -> Value {
    json!({
        "id": state.id,
        "name": state.name,
        "order": state.order,
        "bootstrap_icon": state.icon,
    })
}

/// Full board: states, tasks, and today's calendar events in `timezone`.
pub fn board(conn: &Connection, now: DateTime<Utc>, timezone: &str) -> ApiResponse {
    finish(board_inner(conn, now, timezone))
}

fn board_inner(conn: &Connection, now: DateTime<Utc>, timezone: &str) -> HandlerResult {
    let board = TaskBoardService::sqlite(conn).board(now, timezone)?;
    let tz = resolve_tz(timezone);
    let events: Vec<Value> = board
        .events
        .iter()
        .map(|event| {
            let start = event.start.with_timezone(&tz);
            let end = event.end.with_timezone(&tz);
            json!({
                "id": event.outlook_id,
                "subject": event.subject,
                "start_hour": start.hour(),
                "start_minute": start.minute(),
                "end_hour": end.hour(),
                "end_minute": end.minute(),
                "location": event.location,
                "is_all_day": event.is_all_day,
            })
        })
        .collect();
    Ok(ApiResponse::ok(json!({
        "states": board.states.iter().map(state_json).collect::<Vec<_>>(),
        "tasks": board
            .tasks
            .iter()
            .map(|task| task_json(task, &board.states))
            .collect::<Vec<_>>(),
        "calendar_events": events,
    })))
}

pub fn list_tasks(conn: &Connection) -> ApiResponse {
    finish(list_tasks_inner(conn))
}

fn list_tasks_inner(conn: &Connection) -> HandlerResult {
    let service = TaskBoardService::sqlite(conn);
    let states = service.list_states()?;
    let tasks: Vec<Value> = service
        .list_tasks()?
        .iter()
        .map(|task| task_json(task, &states))
        .collect();
    Ok(ApiResponse::ok(json!({ "tasks": tasks })))
}

/// `POST /todos/create` with `{title}`.
pub fn create_task(conn: &Connection, body: &Value) -> ApiResponse {
    finish(create_task_inner(conn, body))
}

fn create_task_inner(conn: &Connection, body: &Value) -> HandlerResult {
    let request: CreateTaskRequest = parse_body(body)?;
    let service = TaskBoardService::sqlite(conn);
    let task = service.create_task(request.title.trim())?;
    let states = service.list_states()?;
    Ok(ApiResponse::ok(json!({ "task": task_json(&task, &states) })))
}

/// `PATCH /todos/{id}` with any of `{title, details, critical, state_id}`.
pub fn update_task(conn: &Connection, task_id: i64, body: &Value) -> ApiResponse {
    finish(update_task_inner(conn, task_id, body))
}

fn update_task_inner(conn: &Connection, task_id: i64, body: &Value) -> HandlerResult {
    let patch = parse_task_patch(body)?;
    let service = TaskBoardService::sqlite(conn);
    let task = service.update_task(task_id, &patch)?;
    let states = service.list_states()?;
    Ok(ApiResponse::ok(json!({ "task": task_json(&task, &states) })))
}

/// Only keys present in the body are patched.
fn parse_task_patch(body: &Value) -> Result<TaskPatch, ApiResponse> {
    let Some(fields) = body.as_object() else {
        return Err(ApiResponse::bad_request("Invalid JSON: expected an object"));
    };
    let mut patch = TaskPatch::default();
    if let Some(value) = fields.get("title") {
        let title = value
            .as_str()
            .ok_or_else(|| ApiResponse::bad_request("title must be a string"))?;
        patch.title = Some(title.trim().to_string());
    }
    if let Some(value) = fields.get("details") {
        patch.details = Some(match value {
            Value::Null => String::new(),
            Value::String(details) => details.clone(),
            _ => return Err(ApiResponse::bad_request("details must be a string")),
        });
    }
    if let Some(value) = fields.get("critical") {
        let critical = value
            .as_bool()
            .ok_or_else(|| ApiResponse::bad_request("critical must be a boolean"))?;
        patch.critical = Some(critical);
    }
    if let Some(value) = fields.get("state_id") {
        patch.state_id = Some(match value {
            Value::Null => None,
            Value::Number(number) => match number.as_i64() {
                Some(0) => None,
                Some(id) => Some(id),
                None => return Err(ApiResponse::bad_request("state_id must be an integer")),
            },
            _ => return Err(ApiResponse::bad_request("state_id must be an integer")),
        });
    }
    Ok(patch)
}

pub fn delete_task(conn: &Connection, task_id: i64) -> ApiResponse {
    finish(
        TaskBoardService::sqlite(conn)
            .delete_task(task_id)
            .map(|()| ApiResponse::ok(Value::Null))
            .map_err(ApiResponse::from),
    )
}

/// `POST /todos/reorder` with `{task_ids: [..]}`.
pub fn reorder_tasks(conn: &Connection, body: &Value) -> ApiResponse {
    finish(reorder_inner(body, "task_ids", |ids| {
        TaskBoardService::sqlite(conn).reorder_tasks(ids)
    }))
}

pub fn list_states(conn: &Connection) -> ApiResponse {
    finish(list_states_inner(conn))
}

fn list_states_inner(conn: &Connection) -> HandlerResult {
    let states: Vec<Value> = TaskBoardService::sqlite(conn)
        .list_states()?
        .iter()
        .map(state_json)
        .collect();
    Ok(ApiResponse::ok(json!({ "states": states })))
}

/// `POST /todos/states` with `{name, bootstrap_icon?}`.
pub fn create_state(conn: &Connection, body: &Value) -> ApiResponse {
    finish(create_state_inner(conn, body))
}

fn create_state_inner(conn: &Connection, body: &Value) -> HandlerResult {
    let request: CreateStateRequest = parse_body(body)?;
    let state = TaskBoardService::sqlite(conn)
        .create_state(request.name.trim(), request.bootstrap_icon.trim())?;
    Ok(ApiResponse::ok(json!({ "state": state_json(&state) })))
}

/// `PATCH /todos/states/{id}` with `{name?, bootstrap_icon?}`; a null icon clears it.
pub fn update_state(conn: &Connection, state_id: i64, body: &Value) -> ApiResponse {
    finish(update_state_inner(conn, state_id, body))
}

fn update_state_inner(conn: &Connection, state_id: i64, body: &Value) -> HandlerResult {
    let request: UpdateStateRequest = parse_body(body)?;
    let icon = match body.get("bootstrap_icon") {
        None => None,
        Some(Value::Null) => Some(String::new()),
        Some(Value::String(icon)) => Some(icon.clone()),
        Some(_) => return Err(ApiResponse::bad_request("bootstrap_icon must be a string")),
    };
    let state = TaskBoardService::sqlite(conn).update_state(
        state_id,
        request.name.as_deref(),
        icon.as_deref(),
    )?;
    Ok(ApiResponse::ok(json!({ "state": state_json(&state) })))
}

pub fn delete_state(conn: &Connection, state_id: i64) -> ApiResponse {
    finish(
        TaskBoardService::sqlite(conn)
            .delete_state(state_id)
            .map(|()| ApiResponse::ok(Value::Null))
            .map_err(ApiResponse::from),
    )
}

/// `POST /todos/states/reorder` with `{order: [..]}`.
pub fn reorder_states(conn: &Connection, body: &Value) -> ApiResponse {
    finish(reorder_inner(body, "order", |ids| {
        TaskBoardService::sqlite(conn).reorder_states(ids)
    }))
}

fn reorder_inner(
    body: &Value,
    key: &str,
    reorder: impl FnOnce(&[i64]) -> ServiceResult<()>,
) -> HandlerResult {
    let ids: Vec<i64> = match body.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => parse_body(value)?,
    };
    reorder(&ids)?;
    Ok(ApiResponse::ok(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::{
        board, create_state, create_task, delete_state, delete_task, list_states, list_tasks,
        reorder_states, reorder_tasks, update_state, update_task,
    };
    use crate::db::open_db_in_memory;
    use crate::model::activity::CalendarEvent;
    use crate::repo::calendar_repo::{CalendarRepository, SqliteCalendarRepository};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn new_task_lands_in_first_state() {
        let conn = open_db_in_memory().unwrap();
        create_state(&conn, &json!({"name": "Backlog"}));
        create_state(&conn, &json!({"name": "Doing", "bootstrap_icon": "bi-play"}));

        let created = create_task(&conn, &json!({"title": "  Ship sync  "}));
        assert_eq!(created.status, 200);
        assert_eq!(created.body["task"]["title"], "Ship sync");
        assert_eq!(created.body["task"]["state_name"], "Backlog");

        let blank = create_task(&conn, &json!({"title": "  "}));
        assert_eq!(blank.status, 400);
        assert_eq!(blank.body["error"], "Title is required");
    }

    #[test]
    fn update_applies_only_present_fields() {
        let conn = open_db_in_memory().unwrap();
        let doing = create_state(&conn, &json!({"name": "Doing"}));
        let doing_id = doing.body["state"]["id"].as_i64().unwrap();
        let task = create_task(&conn, &json!({"title": "Write tests"}));
        let task_id = task.body["task"]["id"].as_i64().unwrap();

        let updated = update_task(
            &conn,
            task_id,
            &json!({"critical": true, "details": "api layer", "state_id": doing_id}),
        );
        assert_eq!(updated.status, 200, "{:?}", updated.body);
        assert_eq!(updated.body["task"]["title"], "Write tests");
        assert_eq!(updated.body["task"]["critical"], true);
        assert_eq!(updated.body["task"]["state_name"], "Doing");

        let off_board = update_task(&conn, task_id, &json!({"state_id": null}));
        assert!(off_board.body["task"]["state_id"].is_null());

        let missing_state = update_task(&conn, task_id, &json!({"state_id": 999}));
        assert_eq!(missing_state.status, 404);
        assert_eq!(missing_state.body["error"], "State not found");

        let missing_task = update_task(&conn, 999, &json!({"title": "x"}));
        assert_eq!(missing_task.body["error"], "Task not found");

        let bad_type = update_task(&conn, task_id, &json!({"critical": "yes"}));
        assert_eq!(bad_type.status, 400);
    }

    #[test]
    fn delete_and_reorder_tasks() {
        let conn = open_db_in_memory().unwrap();
        let first = create_task(&conn, &json!({"title": "a"})).body["task"]["id"]
            .as_i64()
            .unwrap();
        let second = create_task(&conn, &json!({"title": "b"})).body["task"]["id"]
            .as_i64()
            .unwrap();

        assert_eq!(
            reorder_tasks(&conn, &json!({"task_ids": [second, first]})).status,
            200
        );
        let tasks = list_tasks(&conn);
        assert_eq!(tasks.body["tasks"][0]["id"], second);

        assert_eq!(delete_task(&conn, first).status, 200);
        assert_eq!(delete_task(&conn, first).status, 404);
        assert_eq!(list_tasks(&conn).body["tasks"].as_array().unwrap().len(), 1);
        assert_eq!(reorder_tasks(&conn, &json!({"task_ids": "nope"})).status, 400);
    }

    #[test]
    fn state_lifecycle() {
        let conn = open_db_in_memory().unwrap();
        let todo = create_state(&conn, &json!({"name": "Todo"})).body["state"]["id"]
            .as_i64()
            .unwrap();
        let done = create_state(&conn, &json!({"name": "Done"})).body["state"]["id"]
            .as_i64()
            .unwrap();

        let duplicate = create_state(&conn, &json!({"name": "Todo"}));
        assert_eq!(duplicate.status, 400);
        assert_eq!(create_state(&conn, &json!({})).body["error"], "Name is required");

        let renamed = update_state(&conn, todo, &json!({"name": "Next", "bootstrap_icon": "bi-x"}));
        assert_eq!(renamed.body["state"]["name"], "Next");
        assert_eq!(renamed.body["state"]["bootstrap_icon"], "bi-x");
        let cleared = update_state(&conn, todo, &json!({"bootstrap_icon": null}));
        assert_eq!(cleared.body["state"]["bootstrap_icon"], "");

        reorder_states(&conn, &json!({"order": [done, todo]}));
        let states = list_states(&conn);
        assert_eq!(states.body["states"][0]["name"], "Done");
        assert_eq!(states.body["states"][0]["order"], 0);

        assert_eq!(delete_state(&conn, done).status, 200);
        assert_eq!(delete_state(&conn, done).status, 404);
        assert_eq!(update_state(&conn, done, &json!({"name": "x"})).status, 404);
    }

    #[test]
    fn board_shows_todays_events_in_local_time() {
        let conn = open_db_in_memory().unwrap();
        SqliteCalendarRepository::new(&conn)
            .upsert_event(&CalendarEvent {
                outlook_id: "evt-1".to_string(),
                subject: "Standup".to_string(),
                start: Utc.with_ymd_and_hms(2025, 11, 3, 15, 30, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 11, 3, 16, 0, 0).unwrap(),
                is_all_day: false,
                location: String::new(),
                organizer: String::new(),
                body_preview: String::new(),
            })
            .unwrap();
        let now = Utc.with_ymd_and_hms(2025, 11, 3, 14, 0, 0).unwrap();

        let response = board(&conn, now, "America/Chicago");
        assert_eq!(response.status, 200);
        let events = &response.body["calendar_events"];
        assert_eq!(events.as_array().unwrap().len(), 1);
        assert_eq!(events[0]["start_hour"], 9);
        assert_eq!(events[0]["start_minute"], 30);
    }
}
