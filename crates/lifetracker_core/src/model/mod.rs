//! Domain model for tracked records, planning data and integrations.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep validation rules next to the data they constrain.
//!
//! # Invariants
//! - Every externally synced record is identified by a `SourceKey`.
//! - Timestamps are UTC; calendar dates are naive local dates.

pub mod activity;
pub mod credential;
pub mod health;
pub mod objective;
pub mod planning;
pub mod record;
pub mod task;
