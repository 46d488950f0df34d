//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep handler and CLI layers decoupled from storage details.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Per-item failures inside batch operations are logged and counted, never
//!   propagated.

pub mod activity_service;
pub mod agenda_service;
pub mod clock;
pub mod habit_service;
pub mod objective_service;
pub mod settings_service;
pub mod task_service;

use crate::model::record::ModelValidationError;
use crate::query::QueryError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-layer error shared by all use-case services.
#[derive(Debug)]
pub enum ServiceError {
    /// Caller input failed validation.
    Validation(String),
    /// A referenced row does not exist.
    NotFound(String),
    /// A unique value is already taken.
    Conflict(String),
    /// An admin-authored SQL snippet was rejected or failed.
    Query(QueryError),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "{message}"),
            Self::NotFound(message) => write!(f, "{message}"),
            Self::Conflict(message) => write!(f, "{message}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Query(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err.to_string()),
            RepoError::NotFound { .. } => Self::NotFound(value.to_string()),
            RepoError::Conflict(message) => Self::Conflict(message),
            other => Self::Repo(other),
        }
    }
}

impl From<ModelValidationError> for ServiceError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<QueryError> for ServiceError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}
