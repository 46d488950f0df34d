//! Evaluation of admin-authored SQL snippets.
//!
//! # Responsibility
//! - Run objective definitions and habit column queries against the live DB.
//! - Bind the date-window placeholders as named SQLite parameters.
//!
//! # Invariants
//! - Only single, read-only statements are executed.
//! - Snippet text is never rewritten or interpolated.

pub mod snippet;

pub use snippet::{
    evaluate_scalar, fetch_rows, render_template, validate_snippet, QueryError, QueryResult,
    QueryRow, QueryWindow,
};
