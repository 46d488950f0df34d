//! Core domain logic for the life tracker.
//! This crate is the single source of truth for storage, sync, and scoring rules.

pub mod api;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;
pub mod sync;

pub use api::ApiResponse;
pub use config::{ConfigError, LifeTrackerConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use repo::{RepoError, RepoResult};
pub use service::{ServiceError, ServiceResult};
pub use sync::{SyncError, SyncResult, SyncRunner, SyncSource, SyncWindow};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
