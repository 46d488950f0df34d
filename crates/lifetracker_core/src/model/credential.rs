//! Provider credentials and key/value settings.
//!
//! # Responsibility
//! - Hold OAuth client data and tokens for Whoop and Withings.
//! - Hold API tokens for token-based providers such as Toggl.
//!
//! # Invariants
//! - Secrets never appear in `Debug` output.
//! - A token with no recorded expiry is treated as expired.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::fmt::{Debug, Formatter};

pub const PROVIDER_WHOOP: &str = "whoop";
pub const PROVIDER_WITHINGS: &str = "withings";
pub const PROVIDER_TOGGL: &str = "toggl";

/// OAuth client registration plus the current token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredential {
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl OAuthCredential {
    pub fn new(
        provider: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
        }
    }

    pub fn is_token_expired(&self, now: DateTime<Utc>) -> bool {
        match self.token_expires_at {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }

    /// Stores a new token pair. A missing `refresh_token` keeps the current one.
    pub fn update_tokens(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        now: DateTime<Utc>,
    ) {
        self.access_token = Some(access_token.into());
        if let Some(refresh) = refresh_token.filter(|value| !value.is_empty()) {
            self.refresh_token = Some(refresh);
        }
        self.token_expires_at = expires_in_secs.map(|secs| now + Duration::seconds(secs));
    }

    pub fn has_client(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

impl Debug for OAuthCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredential")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_expires_at", &self.token_expires_at)
            .finish()
    }
}

/// Token-authenticated provider settings.
#[derive(Clone, PartialEq)]
pub struct ApiCredential {
    pub provider: String,
    pub api_token: String,
    pub workspace_id: Option<String>,
    pub api_url: Option<String>,
    pub metadata: Value,
}

impl ApiCredential {
    pub fn new(provider: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            api_token: api_token.into(),
            workspace_id: None,
            api_url: None,
            metadata: Value::Object(Default::default()),
        }
    }
}

impl Debug for ApiCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredential")
            .field("provider", &self.provider)
            .field("api_token", &"<redacted>")
            .field("workspace_id", &self.workspace_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Runtime key/value setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::{ApiCredential, OAuthCredential};
    use chrono::{Duration, TimeZone, Utc};

    fn credential() -> OAuthCredential {
        OAuthCredential::new("whoop", "client", "s3cret", "http://localhost/callback")
    }

    #[test]
    fn missing_expiry_counts_as_expired() {
        assert!(credential().is_token_expired(Utc::now()));
    }

    #[test]
    fn expiry_boundary_is_expired() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut cred = credential();
        cred.update_tokens("access", Some("refresh".into()), Some(3600), now);
        assert!(!cred.is_token_expired(now + Duration::seconds(3599)));
        assert!(cred.is_token_expired(now + Duration::seconds(3600)));
    }

    #[test]
    fn refresh_token_is_kept_when_not_rotated() {
        let now = Utc::now();
        let mut cred = credential();
        cred.update_tokens("a1", Some("r1".into()), Some(60), now);
        cred.update_tokens("a2", None, Some(60), now);
        assert_eq!(cred.access_token.as_deref(), Some("a2"));
        assert_eq!(cred.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut cred = credential();
        cred.update_tokens("tok-abc", Some("ref-xyz".into()), None, Utc::now());
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("tok-abc"));
        assert!(!rendered.contains("ref-xyz"));

        let api = ApiCredential::new("toggl", "toggl-token");
        assert!(!format!("{api:?}").contains("toggl-token"));
    }
}
