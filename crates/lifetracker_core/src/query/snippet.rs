//! Named-parameter snippet runner.
//!
//! # Responsibility
//! - Bind `:day_start`, `:day_end`, `:current_date`, `:day`, `:period_start`
//!   and `:period_end` when, and only when, the statement references them.
//! - Coerce the first column of the first row to `f64`.
//!
//! # Invariants
//! - Timestamp placeholders bind epoch milliseconds; `*_end` is the last
//!   millisecond of the window (inclusive).
//! - Date placeholders bind ISO `YYYY-MM-DD` text.
//! - Only one `SELECT`, `WITH` or `VALUES` statement runs per call; anything
//!   else (writes, transaction control, `ATTACH`, trailing statements) is
//!   rejected before execution.
//! - A snippet never leaves the connection inside a transaction.

use crate::repo::{date_to_db, to_millis};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Statement};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type QueryResult<T> = Result<T, QueryError>;

/// One result row keyed by column name, values rendered as text.
pub type QueryRow = BTreeMap<String, String>;

const READ_KEYWORDS: [&str; 3] = ["SELECT", "WITH", "VALUES"];

static TEMPLATE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"));

#[derive(Debug)]
pub enum QueryError {
    /// Blank snippet.
    Empty,
    /// The statement could modify the database.
    NotReadOnly,
    /// The text holds more than one statement.
    MultipleStatements,
    /// The statement references a placeholder this runner does not bind.
    UnknownParameter(String),
    /// Validation run produced no row.
    NoRows,
    /// The first column could not be read as a number.
    NonNumeric(String),
    Sqlite(rusqlite::Error),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "query is empty"),
            Self::NotReadOnly => write!(f, "query must be a read-only SELECT statement"),
            Self::MultipleStatements => write!(f, "query must contain exactly one statement"),
            Self::UnknownParameter(name) => write!(f, "unknown query parameter `{name}`"),
            Self::NoRows => {
                write!(f, "query returned no results; it must return one numeric row")
            }
            Self::NonNumeric(value) => write!(f, "query returned a non-numeric value `{value}`"),
            Self::Sqlite(err) => write!(f, "query failed: {err}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::MultipleStatement => Self::MultipleStatements,
            other => Self::Sqlite(other),
        }
    }
}

/// Time window a snippet is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub day: NaiveDate,
    pub day_start: DateTime<Utc>,
    pub day_end: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl QueryWindow {
    /// Window whose period equals the day itself.
    pub fn for_day(day: NaiveDate, day_start: DateTime<Utc>, day_end: DateTime<Utc>) -> Self {
        Self {
            day,
            day_start,
            day_end,
            period_start: day_start,
            period_end: day_end,
        }
    }

    pub fn with_period(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.period_start = start;
        self.period_end = end;
        self
    }
}

/// Runs `sql` and returns the first column of the first row; NULL or no row is `0.0`.
pub fn evaluate_scalar(conn: &Connection, sql: &str, window: &QueryWindow) -> QueryResult<f64> {
    run_snippet(conn, sql, window, |stmt| {
        let mut rows = stmt.raw_query();
        let Some(row) = rows.next()? else {
            return Ok(0.0);
        };
        let value = value_to_f64(row.get_ref(0)?);
        value
    })
}

/// Runs `sql` and returns every row keyed by column name.
pub fn fetch_rows(conn: &Connection, sql: &str, window: &QueryWindow) -> QueryResult<Vec<QueryRow>> {
    run_snippet(conn, sql, window, |stmt| {
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = QueryRow::new();
            for (index, name) in names.iter().enumerate() {
                record.insert(name.clone(), value_to_text(row.get_ref(index)?));
            }
            out.push(record);
        }
        Ok(out)
    })
}

/// Checks that `sql` is acceptable and yields at least one row whose first
/// column is numeric or NULL for the sample window. Returns the sample value.
pub fn validate_snippet(conn: &Connection, sql: &str, sample: &QueryWindow) -> QueryResult<f64> {
    run_snippet(conn, sql, sample, |stmt| {
        let mut rows = stmt.raw_query();
        let Some(row) = rows.next()? else {
            return Err(QueryError::NoRows);
        };
        let value = match row.get_ref(0)? {
            ValueRef::Null => Ok(0.0),
            ValueRef::Integer(v) => Ok(v as f64),
            ValueRef::Real(v) => Ok(v),
            other => Err(QueryError::NonNumeric(value_to_text(other))),
        };
        value
    })
}

/// Replaces each `{field}` with the matching row value. Unknown fields are kept verbatim.
pub fn render_template(template: &str, row: &QueryRow) -> String {
    TEMPLATE_FIELD
        .replace_all(template, |caps: &Captures<'_>| match row.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn run_snippet<T>(
    conn: &Connection,
    sql: &str,
    window: &QueryWindow,
    read: impl FnOnce(&mut Statement<'_>) -> QueryResult<T>,
) -> QueryResult<T> {
    let was_autocommit = conn.is_autocommit();
    let result = {
        let mut stmt = prepare_snippet(conn, sql)?;
        bind_window(&mut stmt, window)?;
        read(&mut stmt)
    };
    if was_autocommit && !conn.is_autocommit() {
        conn.execute_batch("ROLLBACK;")?;
        return Err(QueryError::NotReadOnly);
    }
    result
}

fn prepare_snippet<'conn>(conn: &'conn Connection, sql: &str) -> QueryResult<Statement<'conn>> {
    let body = single_statement(sql)?;
    let start = skip_trivia(body.as_bytes(), 0);
    if start == body.len() {
        return Err(QueryError::Empty);
    }
    let keyword: String = body[start..]
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    if !READ_KEYWORDS
        .iter()
        .any(|allowed| keyword.eq_ignore_ascii_case(allowed))
    {
        return Err(QueryError::NotReadOnly);
    }
    let stmt = conn.prepare(body)?;
    if !stmt.readonly() {
        return Err(QueryError::NotReadOnly);
    }
    Ok(stmt)
}

/// Text of the only statement in `sql`, without its terminating `;`.
fn single_statement(sql: &str) -> QueryResult<&str> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        i = match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => skip_quoted(bytes, i, quote),
            b'[' => skip_quoted(bytes, i, b']'),
            b'-' | b'/' => match skip_comment(bytes, i) {
                Some(next) => next,
                None => i + 1,
            },
            b';' => {
                if skip_trivia(bytes, i + 1) != bytes.len() {
                    return Err(QueryError::MultipleStatements);
                }
                return Ok(sql[..i].trim());
            }
            _ => i + 1,
        };
    }
    Ok(sql.trim())
}

fn skip_quoted(bytes: &[u8], open: usize, close: u8) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == close {
            // Doubled quotes escape themselves; brackets have no escape.
            if close != b']' && bytes.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// End of the comment starting at `at`, or `None` when no comment starts there.
fn skip_comment(bytes: &[u8], at: usize) -> Option<usize> {
    match (bytes.get(at), bytes.get(at + 1)) {
        (Some(b'-'), Some(b'-')) => Some(
            bytes[at..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |offset| at + offset + 1),
        ),
        (Some(b'/'), Some(b'*')) => Some(
            bytes[at + 2..]
                .windows(2)
                .position(|pair| pair == b"*/")
                .map_or(bytes.len(), |offset| at + 2 + offset + 2),
        ),
        _ => None,
    }
}

/// First index at or after `from` that is neither whitespace nor comment.
fn skip_trivia(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }
        match skip_comment(bytes, i) {
            Some(next) => i = next,
            None => break,
        }
    }
    i
}

fn bind_window(stmt: &mut Statement<'_>, window: &QueryWindow) -> QueryResult<()> {
    for index in 1..=stmt.parameter_count() {
        let name = stmt
            .parameter_name(index)
            .map(str::to_string)
            .unwrap_or_else(|| format!("?{index}"));
        match name.as_str() {
            ":day_start" => stmt.raw_bind_parameter(index, to_millis(window.day_start))?,
            ":day_end" => stmt.raw_bind_parameter(index, inclusive_end(window.day_end))?,
            ":period_start" => stmt.raw_bind_parameter(index, to_millis(window.period_start))?,
            ":period_end" => stmt.raw_bind_parameter(index, inclusive_end(window.period_end))?,
            ":current_date" | ":day" => stmt.raw_bind_parameter(index, date_to_db(window.day))?,
            _ => return Err(QueryError::UnknownParameter(name)),
        }
    }
    Ok(())
}

fn inclusive_end(exclusive_end: DateTime<Utc>) -> i64 {
    to_millis(exclusive_end) - 1
}

fn value_to_f64(value: ValueRef<'_>) -> QueryResult<f64> {
    match value {
        ValueRef::Null => Ok(0.0),
        ValueRef::Integer(v) => Ok(v as f64),
        ValueRef::Real(v) => Ok(v),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            text.trim()
                .parse::<f64>()
                .map_err(|_| QueryError::NonNumeric(text.into_owned()))
        }
        ValueRef::Blob(_) => Err(QueryError::NonNumeric("<blob>".to_string())),
    }
}

fn value_to_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<{} bytes>", bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        evaluate_scalar, fetch_rows, render_template, validate_snippet, QueryError, QueryWindow,
    };
    use crate::db::open_db_in_memory;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn window() -> QueryWindow {
        let start = Utc.with_ymd_and_hms(2025, 11, 2, 6, 0, 0).unwrap();
        QueryWindow::for_day(
            NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
            start,
            start + Duration::days(1),
        )
    }

    #[test]
    fn null_and_empty_results_are_zero() {
        let conn = open_db_in_memory().unwrap();
        assert_eq!(evaluate_scalar(&conn, "SELECT NULL", &window()).unwrap(), 0.0);
        assert_eq!(
            evaluate_scalar(&conn, "SELECT 1 FROM settings WHERE 0", &window()).unwrap(),
            0.0
        );
    }

    #[test]
    fn only_referenced_placeholders_are_bound() {
        let conn = open_db_in_memory().unwrap();
        let value = evaluate_scalar(&conn, "SELECT :day_end - :day_start", &window()).unwrap();
        assert_eq!(value, 86_399_999.0);
        let day = fetch_rows(&conn, "SELECT :day AS d, :current_date AS c", &window()).unwrap();
        assert_eq!(day[0]["d"], "2025-11-02");
        assert_eq!(day[0]["c"], "2025-11-02");
    }

    #[test]
    fn write_statements_are_rejected() {
        let conn = open_db_in_memory().unwrap();
        let err = evaluate_scalar(&conn, "DELETE FROM settings", &window()).unwrap_err();
        assert!(matches!(err, QueryError::NotReadOnly));
    }

    #[test]
    fn multiple_statements_are_rejected() {
        let conn = open_db_in_memory().unwrap();
        let err =
            evaluate_scalar(&conn, "SELECT 1; DELETE FROM settings", &window()).unwrap_err();
        assert!(matches!(err, QueryError::MultipleStatements));
    }

    #[test]
    fn trailing_semicolon_and_comments_are_allowed() {
        let conn = open_db_in_memory().unwrap();
        let sql = "-- daily count\nSELECT ';' AS sep, 2 /* two */ ; -- done\n";
        assert_eq!(evaluate_scalar(&conn, "SELECT 2;", &window()).unwrap(), 2.0);
        assert_eq!(fetch_rows(&conn, sql, &window()).unwrap()[0]["sep"], ";");
        assert!(matches!(
            evaluate_scalar(&conn, "SELECT 1;;", &window()).unwrap_err(),
            QueryError::MultipleStatements
        ));
        assert!(matches!(
            evaluate_scalar(&conn, "  ; -- nothing", &window()).unwrap_err(),
            QueryError::Empty
        ));
    }

    #[test]
    fn transaction_control_and_attach_are_rejected() {
        let conn = open_db_in_memory().unwrap();
        for sql in [
            "BEGIN",
            "SAVEPOINT snippet",
            "ATTACH DATABASE ':memory:' AS other",
            "PRAGMA user_version",
        ] {
            let err = evaluate_scalar(&conn, sql, &window()).unwrap_err();
            assert!(matches!(err, QueryError::NotReadOnly), "{sql}: {err}");
            assert!(conn.is_autocommit(), "{sql} left a transaction open");
        }
        let attached = conn
            .prepare("PRAGMA database_list")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .count();
        assert_eq!(attached, 1);
    }

    #[test]
    fn common_table_expressions_are_allowed() {
        let conn = open_db_in_memory().unwrap();
        let sql = "WITH n(v) AS (VALUES (3)) SELECT v FROM n";
        assert_eq!(evaluate_scalar(&conn, sql, &window()).unwrap(), 3.0);
        assert!(matches!(
            evaluate_scalar(&conn, "WITH n AS (SELECT 1) DELETE FROM settings", &window())
                .unwrap_err(),
            QueryError::NotReadOnly
        ));
    }

    #[test]
    fn unknown_placeholders_are_rejected() {
        let conn = open_db_in_memory().unwrap();
        let err = evaluate_scalar(&conn, "SELECT :tomorrow", &window()).unwrap_err();
        assert!(matches!(err, QueryError::UnknownParameter(name) if name == ":tomorrow"));
    }

    #[test]
    fn text_results_must_be_numeric() {
        let conn = open_db_in_memory().unwrap();
        assert_eq!(evaluate_scalar(&conn, "SELECT '2.5'", &window()).unwrap(), 2.5);
        assert!(matches!(
            evaluate_scalar(&conn, "SELECT 'abc'", &window()).unwrap_err(),
            QueryError::NonNumeric(_)
        ));
    }

    #[test]
    fn validation_requires_a_numeric_row() {
        let conn = open_db_in_memory().unwrap();
        assert_eq!(validate_snippet(&conn, "SELECT COUNT(*) FROM settings", &window()).unwrap(), 0.0);
        assert!(matches!(
            validate_snippet(&conn, "SELECT 1 FROM settings WHERE 0", &window()).unwrap_err(),
            QueryError::NoRows
        ));
        assert!(matches!(
            validate_snippet(&conn, "SELECT 'x'", &window()).unwrap_err(),
            QueryError::NonNumeric(_)
        ));
    }

    #[test]
    fn template_substitutes_known_fields() {
        let mut row = super::QueryRow::new();
        row.insert("duration".into(), "16".into());
        assert_eq!(render_template("{duration}h fast {note}", &row), "16h fast {note}");
    }
}
