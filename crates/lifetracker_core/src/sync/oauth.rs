//! Shared OAuth token handling for Whoop and Withings.
//!
//! # Responsibility
//! - Load a credential from the database, falling back to config/env.
//! - Keep the access token fresh and persist every new token pair.
//!
//! # Invariants
//! - A refresh happens up front when the access token is missing or expired.
//! - A 401 triggers exactly one refresh and one retry.
//! - A rejected refresh token surfaces as `SyncError::Auth` with a re-auth hint.

use crate::model::credential::OAuthCredential;
use crate::repo::credential_repo::CredentialRepository;
use crate::sync::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::sync::SyncError;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Deserialize;

/// Token response fields common to both providers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Endpoint shapes of one OAuth provider.
pub trait OAuthProvider {
    /// Key in `oauth_credentials`, e.g. `whoop`.
    fn provider_id(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    /// CLI subcommand that restarts the authorization flow.
    fn auth_command(&self) -> &'static str;
    fn authorization_url(
        &self,
        credential: &OAuthCredential,
        state: &str,
    ) -> Result<String, SyncError>;
    fn code_request(&self, credential: &OAuthCredential, code: &str) -> HttpRequest;
    fn refresh_request(&self, credential: &OAuthCredential, refresh_token: &str) -> HttpRequest;
    fn parse_grant(&self, response: HttpResponse) -> Result<TokenGrant, SyncError>;

    fn reauth_hint(&self) -> String {
        format!(
            "Please re-authenticate by running: lifetracker {}",
            self.auth_command()
        )
    }
}

pub struct OAuthSession<'a, P, T, C> {
    provider: P,
    transport: &'a T,
    credentials: &'a C,
    credential: OAuthCredential,
    stored: bool,
}

impl<'a, P, T, C> OAuthSession<'a, P, T, C>
where
    P: OAuthProvider,
    T: HttpTransport,
    C: CredentialRepository,
{
    /// Stored credentials win; `fallback` comes from config or the environment.
    pub fn load(
        provider: P,
        transport: &'a T,
        credentials: &'a C,
        fallback: Option<OAuthCredential>,
    ) -> Result<Self, SyncError> {
        let (credential, stored) = match credentials.load_oauth(provider.provider_id())? {
            Some(credential) => (credential, true),
            None => match fallback {
                Some(credential) => (credential, false),
                None => {
                    let prefix = provider.provider_id().to_ascii_uppercase();
                    return Err(SyncError::Config(format!(
                        "{} credentials not found. Store them in the database or set \
                         {prefix}_CLIENT_ID and {prefix}_CLIENT_SECRET",
                        provider.display_name()
                    )));
                }
            },
        };
        Ok(Self {
            provider,
            transport,
            credentials,
            credential,
            stored,
        })
    }

    pub fn credential(&self) -> &OAuthCredential {
        &self.credential
    }

    pub fn authorization_url(&self, state: &str) -> Result<String, SyncError> {
        self.provider.authorization_url(&self.credential, state)
    }

    /// Trades an authorization code for the first token pair.
    pub fn exchange_code(&mut self, code: &str, now: DateTime<Utc>) -> Result<(), SyncError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SyncError::Config("authorization code is empty".to_string()));
        }
        let request = self.provider.code_request(&self.credential, code);
        let response = self.transport.send(&request)?;
        if response.status == 400 || response.status == 401 {
            return Err(SyncError::Auth(format!(
                "{} rejected the authorization code. {}",
                self.provider.display_name(),
                self.provider.reauth_hint()
            )));
        }
        let grant = self.provider.parse_grant(response.error_for_status()?)?;
        self.apply_grant(grant, now)?;
        info!(
            "event=oauth_code_exchange module=sync status=ok provider={}",
            self.provider.provider_id()
        );
        Ok(())
    }

    pub fn refresh(&mut self, now: DateTime<Utc>) -> Result<(), SyncError> {
        let Some(refresh_token) = self.credential.refresh_token.clone() else {
            return Err(SyncError::Auth(format!(
                "No {} refresh token available. {}",
                self.provider.display_name(),
                self.provider.reauth_hint()
            )));
        };
        let request = self.provider.refresh_request(&self.credential, &refresh_token);
        let response = self.transport.send(&request)?;
        if response.status == 400 || response.status == 401 {
            warn!(
                "event=oauth_refresh module=sync status=rejected provider={} http_status={}",
                self.provider.provider_id(),
                response.status
            );
            return Err(self.expired_refresh_error());
        }
        let grant = match self.provider.parse_grant(response.error_for_status()?) {
            Ok(grant) => grant,
            Err(SyncError::Api { .. }) => return Err(self.expired_refresh_error()),
            Err(err) => return Err(err),
        };
        self.apply_grant(grant, now)?;
        info!(
            "event=oauth_refresh module=sync status=ok provider={}",
            self.provider.provider_id()
        );
        Ok(())
    }

    /// Returns a usable access token, refreshing first when needed.
    pub fn access_token(&mut self, now: DateTime<Utc>) -> Result<String, SyncError> {
        let has_refresh = self.credential.refresh_token.is_some();
        let needs_refresh = match self.credential.access_token {
            None => has_refresh,
            Some(_) => has_refresh && self.credential.is_token_expired(now),
        };
        if needs_refresh {
            self.refresh(now)?;
        }
        self.credential.access_token.clone().ok_or_else(|| {
            SyncError::Auth(format!(
                "No {} access token available. {}",
                self.provider.display_name(),
                self.provider.reauth_hint()
            ))
        })
    }

    /// Sends `request` with a bearer token. Retries once after a 401.
    pub fn send(
        &mut self,
        request: HttpRequest,
        now: DateTime<Utc>,
    ) -> Result<HttpResponse, SyncError> {
        let token = self.access_token(now)?;
        let response = self.transport.send(&request.clone().bearer(&token))?;
        if response.status != 401 {
            return response.error_for_status();
        }

        info!(
            "event=oauth_retry module=sync status=refreshing provider={}",
            self.provider.provider_id()
        );
        self.refresh(now)?;
        let token = self.access_token(now)?;
        self.transport
            .send(&request.bearer(&token))?
            .error_for_status()
    }

    fn apply_grant(&mut self, grant: TokenGrant, now: DateTime<Utc>) -> Result<(), SyncError> {
        self.credential
            .update_tokens(grant.access_token, grant.refresh_token, grant.expires_in, now);
        if self.stored {
            self.credentials.store_tokens(&self.credential)?;
        } else {
            self.credentials.save_oauth(&self.credential)?;
            self.stored = true;
        }
        Ok(())
    }

    fn expired_refresh_error(&self) -> SyncError {
        SyncError::Auth(format!(
            "{} refresh token expired or invalid. {}",
            self.provider.display_name(),
            self.provider.reauth_hint()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::OAuthSession;
    use crate::db::open_db_in_memory;
    use crate::model::credential::{OAuthCredential, PROVIDER_WHOOP};
    use crate::repo::credential_repo::{CredentialRepository, SqliteCredentialRepository};
    use crate::sync::http::fake::ScriptedTransport;
    use crate::sync::http::{HttpAuth, HttpRequest};
    use crate::sync::whoop::WhoopOAuth;
    use crate::sync::SyncError;
    use chrono::{Duration, TimeZone, Utc};

    fn stored_credential(repo: &SqliteCredentialRepository<'_>, expired: bool) {
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap();
        let mut credential =
            OAuthCredential::new(PROVIDER_WHOOP, "client", "secret", "http://localhost/cb");
        credential.access_token = Some("old-access".to_string());
        credential.refresh_token = Some("old-refresh".to_string());
        credential.token_expires_at = Some(if expired {
            now - Duration::minutes(1)
        } else {
            now + Duration::hours(1)
        });
        repo.save_oauth(&credential).unwrap();
    }

    #[test]
    fn retries_once_after_unauthorized_and_persists_tokens() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCredentialRepository::new(&conn);
        stored_credential(&repo, false);
        let transport = ScriptedTransport::new(vec![
            (401, "{}"),
            (200, r#"{"access_token":"new-access","expires_in":3600}"#),
            (200, r#"{"ok":true}"#),
        ]);
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap();

        let mut session = OAuthSession::load(WhoopOAuth, &transport, &repo, None).unwrap();
        let response = session
            .send(HttpRequest::get("https://api.example.test/data"), now)
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.request_count(), 3);
        assert_eq!(
            transport.request(2).auth,
            HttpAuth::Bearer("new-access".to_string())
        );
        let stored = repo.load_oauth(PROVIDER_WHOOP).unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("new-access"));
        assert_eq!(stored.refresh_token.as_deref(), Some("old-refresh"));
    }

    #[test]
    fn expired_token_is_refreshed_before_the_call() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCredentialRepository::new(&conn);
        stored_credential(&repo, true);
        let transport = ScriptedTransport::new(vec![
            (
                200,
                r#"{"access_token":"fresh","refresh_token":"rotated","expires_in":3600}"#,
            ),
            (200, "{}"),
        ]);
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap();

        let mut session = OAuthSession::load(WhoopOAuth, &transport, &repo, None).unwrap();
        session
            .send(HttpRequest::get("https://api.example.test/data"), now)
            .unwrap();

        assert_eq!(transport.request(0).form_value("grant_type"), Some("refresh_token"));
        assert_eq!(transport.request(0).form_value("refresh_token"), Some("old-refresh"));
        let stored = repo.load_oauth(PROVIDER_WHOOP).unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn rejected_refresh_maps_to_auth_error_with_hint() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCredentialRepository::new(&conn);
        stored_credential(&repo, true);
        let transport = ScriptedTransport::new(vec![(400, r#"{"error":"invalid_grant"}"#)]);
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap();

        let mut session = OAuthSession::load(WhoopOAuth, &transport, &repo, None).unwrap();
        let err = session
            .send(HttpRequest::get("https://api.example.test/data"), now)
            .unwrap_err();

        assert!(err.is_auth());
        assert!(err.to_string().contains("lifetracker whoop-auth"));
    }

    #[test]
    fn missing_credentials_is_a_config_error() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCredentialRepository::new(&conn);
        let transport = ScriptedTransport::new(vec![]);
        let err = OAuthSession::load(WhoopOAuth, &transport, &repo, None)
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::Config(message) if message.contains("WHOOP_CLIENT_ID")));
    }

    #[test]
    fn fallback_credential_is_saved_on_first_token() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCredentialRepository::new(&conn);
        let mut fallback =
            OAuthCredential::new(PROVIDER_WHOOP, "env-client", "env-secret", "http://cb");
        fallback.refresh_token = Some("env-refresh".to_string());
        let transport = ScriptedTransport::new(vec![(
            200,
            r#"{"access_token":"a1","refresh_token":"r1","expires_in":60}"#,
        )]);
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap();

        let mut session =
            OAuthSession::load(WhoopOAuth, &transport, &repo, Some(fallback)).unwrap();
        assert_eq!(session.access_token(now).unwrap(), "a1");

        let stored = repo.load_oauth(PROVIDER_WHOOP).unwrap().unwrap();
        assert_eq!(stored.client_id, "env-client");
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
    }
}
