//! Activity logger handlers: fasts and daily habit logs.

use crate::api::{finish, parse_date, ApiResponse, HandlerResult};
use crate::service::activity_service::ActivityService;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde_json::{json, Value};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// `POST /fasting/log` with `{hours}`; the fast ends at `now`.
pub fn log_fast(conn: &Connection, body: &Value, now: DateTime<Utc>) -> ApiResponse {
    finish(log_fast_inner(conn, body, now))
}

fn log_fast_inner(conn: &Connection, body: &Value, now: DateTime<Utc>) -> HandlerResult {
    let hours = match body.get("hours") {
        None | Some(Value::Null) => {
            return Err(ApiResponse::bad_request("Fast duration is required"))
        }
        Some(Value::Number(number)) => number.as_u64(),
        Some(Value::String(text)) if text.trim().is_empty() => {
            return Err(ApiResponse::bad_request("Fast duration is required"))
        }
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    let Some(hours) = hours.and_then(|hours| u32::try_from(hours).ok()) else {
        return Err(ApiResponse::bad_request("Invalid fast duration"));
    };

    let session = ActivityService::sqlite(conn).log_fast(hours, now)?;
    Ok(ApiResponse::ok(json!({
        "message": format!("{hours}-hour fast logged successfully!"),
        "fast_id": session.key.source_id,
        "start": session.fast_start().format(DISPLAY_FORMAT).to_string(),
        "end": session.fast_end.format(DISPLAY_FORMAT).to_string(),
    })))
}

/// `POST /waist/log` with `{inches, date?}`.
pub fn log_waist(conn: &Connection, body: &Value, now: DateTime<Utc>) -> ApiResponse {
    finish(log_waist_inner(conn, body, now))
}

fn log_waist_inner(conn: &Connection, body: &Value, now: DateTime<Utc>) -> HandlerResult {
    let date = log_date(body, now)?;
    let Some(inches) = body.get("inches").and_then(number_value) else {
        return Err(ApiResponse::bad_request("Waist measurement is required"));
    };
    let entry = ActivityService::sqlite(conn).log_waist(date, inches)?;
    Ok(ApiResponse::ok(json!({
        "message": format!("Waist measurement of {inches} inches logged"),
        "date": entry.log_date.to_string(),
    })))
}

/// `POST /youtube/log` with `{date?}`.
pub fn log_youtube_avoidance(conn: &Connection, body: &Value, now: DateTime<Utc>) -> ApiResponse {
    finish(log_youtube_avoidance_inner(conn, body, now))
}

fn log_youtube_avoidance_inner(
    conn: &Connection,
    body: &Value,
    now: DateTime<Utc>,
) -> HandlerResult {
    let date = log_date(body, now)?;
    let entry = ActivityService::sqlite(conn).log_youtube_avoidance(date)?;
    Ok(ApiResponse::ok(json!({
        "message": "YouTube avoidance logged",
        "date": entry.log_date.to_string(),
    })))
}

/// `POST /writing/log` with `{hours?, date?}`.
pub fn log_writing(conn: &Connection, body: &Value, now: DateTime<Utc>) -> ApiResponse {
    finish(log_writing_inner(conn, body, now))
}

fn log_writing_inner(conn: &Connection, body: &Value, now: DateTime<Utc>) -> HandlerResult {
    let date = log_date(body, now)?;
    let hours = match body.get("hours") {
        None | Some(Value::Null) => None,
        Some(value) => match number_value(value) {
            Some(hours) => Some(hours),
            None => return Err(ApiResponse::bad_request("hours must be a number")),
        },
    };
    let entry = ActivityService::sqlite(conn).log_writing(date, hours)?;
    Ok(ApiResponse::ok(json!({
        "message": "Writing session logged",
        "date": entry.log_date.to_string(),
        "hours": entry.duration_hours,
    })))
}

fn log_date(body: &Value, now: DateTime<Utc>) -> Result<NaiveDate, ApiResponse> {
    match body.get("date").and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => parse_date(value),
        _ => Ok(now.date_naive()),
    }
}

fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
