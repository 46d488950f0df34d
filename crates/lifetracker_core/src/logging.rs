//! Process logging bootstrap.
//!
//! # Responsibility
//! - Start one rolling log file per process, rotated daily or by size.
//! - Mirror warnings to stderr for interactive CLI runs.
//! - Record panics as single-line `event=panic` entries.
//!
//! # Invariants
//! - Repeating initialization with the same level and directory is a no-op.
//! - A second initialization with another level or directory is an error.
//! - Credentials and tokens never appear in log lines.

use crate::config::LifeTrackerConfig;
use flexi_logger::{Age, Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Once;

const LOG_BASENAME: &str = "lifetracker";
const ROTATE_AT_BYTES: u64 = 5 * 1024 * 1024;
const KEEP_ROTATED_FILES: usize = 14;
const PANIC_TEXT_LIMIT: usize = 200;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: Once = Once::new();

struct ActiveLogger {
    level: LevelFilter,
    dir: PathBuf,
    _handle: LoggerHandle,
}

#[derive(Debug)]
pub enum LoggingError {
    UnsupportedLevel(String),
    EmptyDirectory,
    CreateDirectory { path: PathBuf, source: std::io::Error },
    Backend(String),
    /// Logging is already running with a different level or directory.
    Conflict(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unknown log level `{level}`; use off, error, warn, info, debug, or trace"
            ),
            Self::EmptyDirectory => f.write_str("log_dir is empty"),
            Self::CreateDirectory { path, source } => {
                write!(f, "cannot create log directory `{}`: {source}", path.display())
            }
            Self::Backend(message) => write!(f, "logger failed to start: {message}"),
            Self::Conflict(message) => f.write_str(message),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        if let Self::CreateDirectory { source, .. } = self {
            return Some(source);
        }
        None
    }
}

/// Starts file logging at `level` under `log_dir`.
///
/// Relative directories are resolved against the current working directory.
/// With `echo_warnings`, warnings and errors are also written to stderr.
pub fn init_logging(level: &str, log_dir: &Path, echo_warnings: bool) -> Result<(), LoggingError> {
    let level = parse_level(level)?;
    let dir = absolute_dir(log_dir)?;
    let active = ACTIVE.get_or_try_init(|| start(level, &dir, echo_warnings))?;
    ensure_same(active, level, &dir)
}

/// Starts logging from config when `log_dir` is set; returns whether it did.
pub fn init_from_config(config: &LifeTrackerConfig) -> Result<bool, LoggingError> {
    let Some(log_dir) = config.log_dir.as_deref() else {
        return Ok(false);
    };
    let level = config.log_level.as_deref().unwrap_or(default_log_level());
    init_logging(level, log_dir, true)?;
    Ok(true)
}

/// `(level, directory)` of the running logger.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (level_name(active.level), active.dir.clone()))
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start(level: LevelFilter, dir: &Path, echo_warnings: bool) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDirectory {
        path: dir.to_path_buf(),
        source,
    })?;

    let handle = Logger::try_with_str(level_name(level))
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(FileSpec::default().directory(dir).basename(LOG_BASENAME))
        .rotate(
            Criterion::AgeOrSize(Age::Day, ROTATE_AT_BYTES),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(KEEP_ROTATED_FILES),
        )
        .append()
        .duplicate_to_stderr(if echo_warnings {
            Duplicate::Warn
        } else {
            Duplicate::None
        })
        .format_for_files(flexi_logger::detailed_format)
        .format_for_stderr(flexi_logger::default_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    PANIC_HOOK.call_once(install_panic_hook);

    info!(
        "event=logging_init module=core status=ok level={} log_dir={} version={} os={}",
        level_name(level),
        dir.display(),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    );

    Ok(ActiveLogger {
        level,
        dir: dir.to_path_buf(),
        _handle: handle,
    })
}

fn ensure_same(active: &ActiveLogger, level: LevelFilter, dir: &Path) -> Result<(), LoggingError> {
    if active.dir != dir {
        return Err(LoggingError::Conflict(format!(
            "logging already writes to `{}`; cannot move it to `{}`",
            active.dir.display(),
            dir.display()
        )));
    }
    if active.level != level {
        return Err(LoggingError::Conflict(format!(
            "logging already runs at `{}`; cannot change it to `{}`",
            level_name(active.level),
            level_name(level)
        )));
    }
    Ok(())
}

fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    let trimmed = level.trim();
    let candidate = if trimmed.eq_ignore_ascii_case("warning") {
        "warn"
    } else {
        trimmed
    };
    LevelFilter::from_str(candidate).map_err(|_| LoggingError::UnsupportedLevel(trimmed.to_string()))
}

fn level_name(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

fn absolute_dir(log_dir: &Path) -> Result<PathBuf, LoggingError> {
    if log_dir.as_os_str().is_empty() {
        return Err(LoggingError::EmptyDirectory);
    }
    if log_dir.is_absolute() {
        return Ok(log_dir.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(log_dir))
        .map_err(|source| LoggingError::CreateDirectory {
            path: log_dir.to_path_buf(),
            source,
        })
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map_or_else(|| "unknown".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));
        error!(
            "event=panic module=core status=error location={location} message={}",
            one_line(&panic_text(panic_info.payload()), PANIC_TEXT_LIMIT)
        );
        previous(panic_info);
    }));
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-text payload>".to_string())
}

/// Collapses line breaks and caps the text at `limit` characters.
fn one_line(text: &str, limit: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if matches!(c, '\n' | '\r') { ' ' } else { c })
        .collect();
    match flat.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        absolute_dir, init_from_config, init_logging, logging_status, one_line, panic_text,
        parse_level, LoggingError,
    };
    use crate::config::LifeTrackerConfig;
    use log::LevelFilter;
    use std::path::Path;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("INFO").unwrap(), LevelFilter::Info);
        assert_eq!(parse_level(" Warning ").unwrap(), LevelFilter::Warn);
        assert!(matches!(
            parse_level("chatty"),
            Err(LoggingError::UnsupportedLevel(level)) if level == "chatty"
        ));
    }

    #[test]
    fn relative_dirs_resolve_under_cwd() {
        let resolved = absolute_dir(Path::new("logs/sync")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("logs/sync"));
        assert!(matches!(
            absolute_dir(Path::new("")),
            Err(LoggingError::EmptyDirectory)
        ));
    }

    #[test]
    fn panic_text_is_flattened_and_capped() {
        assert_eq!(one_line("token\nrefresh\rfailed", 64), "token refresh failed");
        assert_eq!(one_line("abcdefgh", 4), "abcd...");
        assert_eq!(one_line("héllo", 5), "héllo");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_text(boxed.as_ref()), "boom");
    }

    #[test]
    fn config_without_log_dir_skips_logging() {
        assert!(!init_from_config(&LifeTrackerConfig::default()).unwrap());
    }

    #[test]
    fn second_init_must_match_the_first() {
        let log_dir = tempfile::tempdir().unwrap();
        let other_dir = tempfile::tempdir().unwrap();

        init_logging("info", log_dir.path(), false).unwrap();
        init_logging("INFO", log_dir.path(), false).unwrap();

        let level_error = init_logging("debug", log_dir.path(), false).unwrap_err();
        assert!(level_error.to_string().contains("cannot change"));
        let dir_error = init_logging("info", other_dir.path(), false).unwrap_err();
        assert!(matches!(dir_error, LoggingError::Conflict(_)));

        assert_eq!(logging_status(), Some(("info", log_dir.path().to_path_buf())));
    }
}
