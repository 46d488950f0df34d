//! JSON handler layer for the planning and logging pages.
//!
//! # Responsibility
//! - Turn decoded request bodies into service calls.
//! - Map service errors to HTTP-style status codes and JSON envelopes.
//!
//! # Invariants
//! - Every body carries `success`; failures also carry `error`.
//! - Handlers never panic and never return a bare service error.
//! - Storage failures are logged and surface as status 500.

pub mod activity;
pub mod agenda;
pub mod tasks;

use crate::service::ServiceError;
use chrono::NaiveDate;
use log::error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_SERVER_ERROR: u16 = 500;

/// Status code plus JSON body, ready for any HTTP framework to send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// 200 with `success: true` merged into `fields` (an object, or `null`).
    pub fn ok(fields: Value) -> Self {
        let mut body = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.insert("success".to_string(), Value::Bool(true));
        Self {
            status: STATUS_OK,
            body: Value::Object(body),
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "success": false, "error": message.into() }),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(STATUS_BAD_REQUEST, message)
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

impl From<ServiceError> for ApiResponse {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) | ServiceError::Conflict(message) => {
                Self::bad_request(message)
            }
            ServiceError::NotFound(message) => Self::error(STATUS_NOT_FOUND, message),
            other => {
                error!("event=api_request module=api status=error error={other}");
                Self::error(STATUS_SERVER_ERROR, other.to_string())
            }
        }
    }
}

/// Handler-internal result; both arms are sent as-is.
pub(crate) type HandlerResult = Result<ApiResponse, ApiResponse>;

pub(crate) fn finish(result: HandlerResult) -> ApiResponse {
    result.unwrap_or_else(|response| response)
}

/// Decodes a request body into `T`, or a 400 `Invalid JSON` response.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Value) -> Result<T, ApiResponse> {
    serde_json::from_value(body.clone())
        .map_err(|err| ApiResponse::bad_request(format!("Invalid JSON: {err}")))
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, ApiResponse> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ApiResponse::bad_request(format!("Invalid date `{value}`, expected YYYY-MM-DD")))
}

/// Serializes a payload; a failure here is a server error.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, ApiResponse> {
    serde_json::to_value(value).map_err(|err| {
        error!("event=api_serialize module=api status=error error={err}");
        ApiResponse::error(STATUS_SERVER_ERROR, err.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_date, ApiResponse, STATUS_NOT_FOUND};
    use crate::repo::RepoError;
    use crate::service::ServiceError;
    use serde_json::json;

    #[test]
    fn ok_merges_success_flag() {
        let response = ApiResponse::ok(json!({ "dates": [] }));
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "success": true, "dates": [] }));
        assert_eq!(ApiResponse::ok(json!(null)).body, json!({ "success": true }));
    }

    #[test]
    fn service_errors_map_to_status_codes() {
        let validation: ApiResponse = ServiceError::Validation("Title is required".into()).into();
        assert_eq!(validation.status, 400);
        assert_eq!(validation.body["error"], "Title is required");

        let conflict: ApiResponse = ServiceError::Conflict("taken".into()).into();
        assert_eq!(conflict.status, 400);

        let missing: ApiResponse = ServiceError::NotFound("Task not found".into()).into();
        assert_eq!(missing.status, STATUS_NOT_FOUND);
        assert_eq!(missing.body["success"], false);

        let storage: ApiResponse =
            ServiceError::Repo(RepoError::InvalidData("bad row".into())).into();
        assert_eq!(storage.status, 500);
        assert!(!storage.is_success());
    }

    #[test]
    fn parse_date_rejects_other_formats() {
        assert!(parse_date("2025-11-02").is_ok());
        assert_eq!(parse_date("11/02/2025").unwrap_err().status, 400);
    }
}
