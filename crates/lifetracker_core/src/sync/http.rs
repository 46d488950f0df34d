//! HTTP seam for provider clients.
//!
//! # Responsibility
//! - Describe one request/response pair without tying callers to a client.
//! - Provide `ReqwestTransport` for real network access.
//!
//! # Invariants
//! - Non-2xx statuses are returned, not raised; callers decide how to map them.
//! - `Debug` output of a request never includes credentials.

use crate::sync::SyncError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Clone, PartialEq)]
pub enum HttpAuth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

impl Debug for HttpAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::Basic { .. } => f.write_str("Basic(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HttpBody {
    Empty,
    Form(Vec<(String, String)>),
    Json(Value),
}

#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub auth: HttpAuth,
    pub body: HttpBody,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            auth: HttpAuth::None,
            body: HttpBody::Empty,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.auth = HttpAuth::Bearer(token.to_string());
        self
    }

    pub fn basic(mut self, username: &str, password: &str) -> Self {
        self.auth = HttpAuth::Basic {
            username: username.to_string(),
            password: password.to_string(),
        };
        self
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = HttpBody::Form(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = HttpBody::Json(value);
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        match &self.body {
            HttpBody::Form(pairs) => pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

impl Debug for HttpRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let auth = match self.auth {
            HttpAuth::None => "none",
            HttpAuth::Bearer(_) => "bearer",
            HttpAuth::Basic { .. } => "basic",
        };
        let body = match self.body {
            HttpBody::Empty => "empty",
            HttpBody::Form(_) => "form",
            HttpBody::Json(_) => "json",
        };
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("auth", &auth)
            .field("body", &body)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fails with `SyncError::Api` on a non-2xx status.
    pub fn error_for_status(self) -> Result<Self, SyncError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(SyncError::Api {
            status: self.status,
            message: truncate(&self.body, 200),
        })
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

pub trait HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SyncError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SyncError> {
        (**self).send(request)
    }
}

/// Blocking reqwest client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, SyncError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SyncError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SyncError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.auth {
            HttpAuth::None => builder,
            HttpAuth::Bearer(token) => builder.bearer_auth(token),
            HttpAuth::Basic { username, password } => builder.basic_auth(username, Some(password)),
        };
        builder = match &request.body {
            HttpBody::Empty => builder,
            HttpBody::Form(pairs) => builder.form(pairs),
            HttpBody::Json(value) => builder.json(value),
        };

        let response = builder
            .send()
            .map_err(|err| SyncError::Http(err.without_url().to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| SyncError::Http(err.without_url().to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut out = value.chars().take(max_chars).collect::<String>();
    if value.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
pub(crate) mod fake {
    use super::{HttpRequest, HttpResponse, HttpTransport};
    use crate::sync::SyncError;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned responses in order and records every request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: RefCell<VecDeque<HttpResponse>>,
        pub requests: RefCell<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(responses: Vec<(u16, &str)>) -> Self {
            Self {
                responses: RefCell::new(
                    responses
                        .into_iter()
                        .map(|(status, body)| HttpResponse::new(status, body))
                        .collect(),
                ),
                requests: RefCell::new(Vec::new()),
            }
        }

        pub fn request(&self, index: usize) -> HttpRequest {
            self.requests.borrow()[index].clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SyncError> {
            self.requests.borrow_mut().push(request.clone());
            self.responses
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| SyncError::Http(format!("no scripted response for {}", request.url)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpRequest, HttpResponse};
    use crate::sync::SyncError;

    #[test]
    fn request_debug_hides_credentials() {
        let request = HttpRequest::post("https://example.test/token")
            .bearer("secret-token")
            .form(&[("client_secret", "hush")]);
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("hush"));
        assert_eq!(request.form_value("client_secret"), Some("hush"));
    }

    #[test]
    fn error_for_status_maps_to_api_error() {
        let err = HttpResponse::new(503, "unavailable")
            .error_for_status()
            .unwrap_err();
        assert!(matches!(err, SyncError::Api { status: 503, .. }));
        assert!(HttpResponse::new(204, "").error_for_status().is_ok());
    }
}
