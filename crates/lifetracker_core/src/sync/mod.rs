//! Provider sync jobs.
//!
//! # Responsibility
//! - Pull workouts, weigh-ins, time entries, and nutrition from providers.
//! - Upsert them idempotently keyed on `(source, source_id)`.
//!
//! # Invariants
//! - One provider failing never aborts the others.
//! - Network access goes through `HttpTransport`; tests use a scripted fake.
//! - Tokens and passwords never reach log lines.

pub mod cronometer;
pub mod http;
pub mod oauth;
pub mod result;
pub mod runner;
pub mod toggl;
pub mod whoop;
pub mod window;
pub mod withings;

use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use cronometer::{CommandExporter, CronometerSync, DailyNutrition, NutritionExporter};
pub use http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use oauth::{OAuthProvider, OAuthSession, TokenGrant};
pub use result::{Batch, SyncResult};
pub use runner::SyncRunner;
pub use toggl::TogglSync;
pub use whoop::WhoopSync;
pub use window::{SyncSource, SyncWindow, DEFAULT_SYNC_DAYS};
pub use withings::WithingsSync;

#[derive(Debug)]
pub enum SyncError {
    /// Credentials are missing or rejected; the user must re-authenticate.
    Auth(String),
    Http(String),
    Api { status: u16, message: String },
    Config(String),
    Parse(String),
    /// The external nutrition exporter failed or timed out.
    Export(String),
    Repo(RepoError),
}

pub type SyncOutcome<T> = Result<T, SyncError>;

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(message) => write!(f, "authentication failed: {message}"),
            Self::Http(message) => write!(f, "http error: {message}"),
            Self::Api { status, message } => write!(f, "api error {status}: {message}"),
            Self::Config(message) => write!(f, "configuration error: {message}"),
            Self::Parse(message) => write!(f, "unexpected response: {message}"),
            Self::Export(message) => write!(f, "export failed: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SyncError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}
