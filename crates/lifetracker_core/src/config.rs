//! File and environment configuration.
//!
//! # Responsibility
//! - Load `LifeTrackerConfig` from a TOML file.
//! - Fill credentials the file omits from environment variables.
//!
//! # Invariants
//! - Values present in the file win over environment variables.
//! - Secrets never appear in `Debug` output.

use crate::model::credential::{
    ApiCredential, OAuthCredential, PROVIDER_TOGGL, PROVIDER_WHOOP, PROVIDER_WITHINGS,
};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE_PATH: &str = "lifetracker.sqlite3";
pub const DEFAULT_CRONOMETER_BINARY: &str = "cronometer_export";
pub const DEFAULT_CRONOMETER_TIMEZONE: &str = "America/Los_Angeles";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config file: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// OAuth client registration for Whoop or Withings.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OAuthClientConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl OAuthClientConfig {
    /// Builds a credential when both client id and secret are known.
    pub fn to_credential(&self, provider: &str) -> Option<OAuthCredential> {
        let client_id = non_blank(self.client_id.as_deref())?;
        let client_secret = non_blank(self.client_secret.as_deref())?;
        let mut credential = OAuthCredential::new(
            provider,
            client_id,
            client_secret,
            self.redirect_uri.clone().unwrap_or_default(),
        );
        credential.access_token = self.access_token.clone().filter(|v| !v.is_empty());
        credential.refresh_token = self.refresh_token.clone().filter(|v| !v.is_empty());
        Some(credential)
    }

    fn fill_from_env(&mut self, prefix: &str, lookup: &impl Fn(&str) -> Option<String>) {
        fill(&mut self.client_id, lookup(&format!("{prefix}_CLIENT_ID")));
        fill(&mut self.client_secret, lookup(&format!("{prefix}_CLIENT_SECRET")));
        fill(&mut self.redirect_uri, lookup(&format!("{prefix}_REDIRECT_URI")));
        fill(&mut self.access_token, lookup(&format!("{prefix}_ACCESS_TOKEN")));
        fill(&mut self.refresh_token, lookup(&format!("{prefix}_REFRESH_TOKEN")));
    }
}

impl Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("redirect_uri", &self.redirect_uri)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TogglConfig {
    pub api_token: Option<String>,
    pub workspace_id: Option<String>,
}

impl TogglConfig {
    pub fn to_credential(&self) -> Option<ApiCredential> {
        let token = non_blank(self.api_token.as_deref())?;
        let mut credential = ApiCredential::new(PROVIDER_TOGGL, token);
        credential.workspace_id = self.workspace_id.clone().filter(|v| !v.is_empty());
        Some(credential)
    }
}

impl Debug for TogglConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TogglConfig")
            .field("has_api_token", &self.api_token.is_some())
            .field("workspace_id", &self.workspace_id)
            .finish()
    }
}

#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CronometerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Zone the exported calendar dates are interpreted in.
    pub timezone: Option<String>,
}

impl CronometerConfig {
    pub fn timezone_name(&self) -> &str {
        self.timezone
            .as_deref()
            .filter(|tz| !tz.trim().is_empty())
            .unwrap_or(DEFAULT_CRONOMETER_TIMEZONE)
    }
}

impl Debug for CronometerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronometerConfig")
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("timezone", &self.timezone)
            .finish()
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LifeTrackerConfig {
    pub database_path: Option<PathBuf>,
    /// Directory for rolling logs. Logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub default_timezone: Option<String>,
    pub cronometer_binary: Option<PathBuf>,
    pub whoop: OAuthClientConfig,
    pub withings: OAuthClientConfig,
    pub toggl: TogglConfig,
    pub cronometer: CronometerConfig,
}

impl LifeTrackerConfig {
    /// Reads `path` and applies process environment fallbacks.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_toml_str(&text)?.with_env_fallbacks(|key| std::env::var(key).ok()))
    }

    /// Config made only from environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_fallbacks(|key| std::env::var(key).ok())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Fills every unset value from `lookup`.
    pub fn with_env_fallbacks(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.database_path.is_none() {
            self.database_path = lookup("LIFETRACKER_DATABASE").map(PathBuf::from);
        }
        if self.log_dir.is_none() {
            self.log_dir = lookup("LIFETRACKER_LOG_DIR").map(PathBuf::from);
        }
        fill(&mut self.log_level, lookup("LIFETRACKER_LOG_LEVEL"));
        fill(&mut self.default_timezone, lookup("LIFETRACKER_TIMEZONE"));
        if self.cronometer_binary.is_none() {
            self.cronometer_binary = lookup("CRONOMETER_BINARY").map(PathBuf::from);
        }
        self.whoop.fill_from_env("WHOOP", &lookup);
        self.withings.fill_from_env("WITHINGS", &lookup);
        fill(&mut self.toggl.api_token, lookup("TOGGL_API_TOKEN"));
        fill(&mut self.toggl.workspace_id, lookup("TOGGL_WORKSPACE_ID"));
        fill(&mut self.cronometer.username, lookup("CRONOMETER_USERNAME"));
        fill(&mut self.cronometer.password, lookup("CRONOMETER_PASSWORD"));
        fill(&mut self.cronometer.timezone, lookup("CRONOMETER_TIMEZONE"));
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
    }

    pub fn cronometer_binary(&self) -> PathBuf {
        self.cronometer_binary
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CRONOMETER_BINARY))
    }

    pub fn oauth_client(&self, provider: &str) -> Option<&OAuthClientConfig> {
        match provider {
            PROVIDER_WHOOP => Some(&self.whoop),
            PROVIDER_WITHINGS => Some(&self.withings),
            _ => None,
        }
    }
}

fn fill(slot: &mut Option<String>, fallback: Option<String>) {
    if slot.as_deref().map_or(true, |value| value.trim().is_empty()) {
        if let Some(value) = fallback.filter(|v| !v.trim().is_empty()) {
            *slot = Some(value);
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::LifeTrackerConfig;
    use crate::model::credential::PROVIDER_WHOOP;
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn file_values_win_over_environment() {
        let config = LifeTrackerConfig::from_toml_str(
            r#"
            database_path = "/var/lib/lifetracker.sqlite3"
            [whoop]
            client_id = "file-id"
            "#,
        )
        .unwrap();
        let vars = env(&[("WHOOP_CLIENT_ID", "env-id"), ("WHOOP_CLIENT_SECRET", "env-secret")]);
        let config = config.with_env_fallbacks(|key| vars.get(key).cloned());

        assert_eq!(config.whoop.client_id.as_deref(), Some("file-id"));
        assert_eq!(config.whoop.client_secret.as_deref(), Some("env-secret"));
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/lifetracker.sqlite3")
        );
        let credential = config.whoop.to_credential(PROVIDER_WHOOP).unwrap();
        assert_eq!(credential.client_id, "file-id");
    }

    #[test]
    fn toggl_credential_requires_token() {
        let config = LifeTrackerConfig::default();
        assert!(config.toggl.to_credential().is_none());

        let vars = env(&[("TOGGL_API_TOKEN", "tok"), ("TOGGL_WORKSPACE_ID", "42")]);
        let config = config.with_env_fallbacks(|key| vars.get(key).cloned());
        let credential = config.toggl.to_credential().unwrap();
        assert_eq!(credential.workspace_id.as_deref(), Some("42"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let vars = env(&[("WITHINGS_CLIENT_SECRET", "very-secret"), ("TOGGL_API_TOKEN", "tok-123")]);
        let config = LifeTrackerConfig::default().with_env_fallbacks(|key| vars.get(key).cloned());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("tok-123"));
    }

    #[test]
    fn load_reads_file_and_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_timezone = \"America/Chicago\"").unwrap();
        let config = LifeTrackerConfig::load(file.path()).unwrap();
        assert_eq!(config.default_timezone.as_deref(), Some("America/Chicago"));

        let err = LifeTrackerConfig::from_toml_str("database_path = [").unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
    }
}
