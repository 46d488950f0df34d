//! OAuth and API credential persistence keyed by provider name.
//!
//! # Invariants
//! - At most one row per provider in each credential table.
//! - Token writes touch only the token columns.

use crate::model::credential::{ApiCredential, OAuthCredential};
use crate::model::record::ModelValidationError;
use crate::repo::{from_millis, to_millis, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

pub trait CredentialRepository {
    fn load_oauth(&self, provider: &str) -> RepoResult<Option<OAuthCredential>>;
    /// Inserts or replaces the full OAuth row for `credential.provider`.
    fn save_oauth(&self, credential: &OAuthCredential) -> RepoResult<()>;
    /// Persists refreshed tokens for an existing provider row.
    fn store_tokens(&self, credential: &OAuthCredential) -> RepoResult<()>;
    fn load_api(&self, provider: &str) -> RepoResult<Option<ApiCredential>>;
    fn save_api(&self, credential: &ApiCredential) -> RepoResult<()>;
}

pub struct SqliteCredentialRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCredentialRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CredentialRepository for SqliteCredentialRepository<'_> {
    fn load_oauth(&self, provider: &str) -> RepoResult<Option<OAuthCredential>> {
        let mut stmt = self.conn.prepare(
            "SELECT provider, client_id, client_secret, redirect_uri,
                    access_token, refresh_token, token_expires_at
             FROM oauth_credentials
             WHERE provider = ?1;",
        )?;
        let mut rows = stmt.query([provider])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_oauth_row(row)?));
        }
        Ok(None)
    }

    fn save_oauth(&self, credential: &OAuthCredential) -> RepoResult<()> {
        if credential.provider.trim().is_empty() {
            return Err(ModelValidationError::BlankField("provider").into());
        }
        self.conn.execute(
            "INSERT INTO oauth_credentials (
                provider, client_id, client_secret, redirect_uri,
                access_token, refresh_token, token_expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (provider) DO UPDATE SET
                client_id = excluded.client_id,
                client_secret = excluded.client_secret,
                redirect_uri = excluded.redirect_uri,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expires_at = excluded.token_expires_at,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                credential.provider,
                credential.client_id,
                credential.client_secret,
                credential.redirect_uri,
                credential.access_token,
                credential.refresh_token,
                credential.token_expires_at.map(to_millis),
            ],
        )?;
        Ok(())
    }

    fn store_tokens(&self, credential: &OAuthCredential) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE oauth_credentials
             SET access_token = ?1,
                 refresh_token = ?2,
                 token_expires_at = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE provider = ?4;",
            params![
                credential.access_token,
                credential.refresh_token,
                credential.token_expires_at.map(to_millis),
                credential.provider,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("oauth credential", &credential.provider));
        }
        Ok(())
    }

    fn load_api(&self, provider: &str) -> RepoResult<Option<ApiCredential>> {
        let mut stmt = self.conn.prepare(
            "SELECT provider, api_token, workspace_id, api_url, metadata
             FROM api_credentials
             WHERE provider = ?1;",
        )?;
        let mut rows = stmt.query([provider])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let metadata_text: String = row.get("metadata")?;
        let metadata = serde_json::from_str(&metadata_text).map_err(|err| {
            RepoError::InvalidData(format!("invalid json in api_credentials.metadata: {err}"))
        })?;
        let credential = ApiCredential {
            provider: row.get("provider")?,
            api_token: row.get("api_token")?,
            workspace_id: row.get("workspace_id")?,
            api_url: row.get("api_url")?,
            metadata,
        };
        Ok(Some(credential))
    }

    fn save_api(&self, credential: &ApiCredential) -> RepoResult<()> {
        if credential.provider.trim().is_empty() {
            return Err(ModelValidationError::BlankField("provider").into());
        }
        self.conn.execute(
            "INSERT INTO api_credentials (provider, api_token, workspace_id, api_url, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (provider) DO UPDATE SET
                api_token = excluded.api_token,
                workspace_id = excluded.workspace_id,
                api_url = excluded.api_url,
                metadata = excluded.metadata,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                credential.provider,
                credential.api_token,
                credential.workspace_id,
                credential.api_url,
                credential.metadata.to_string(),
            ],
        )?;
        Ok(())
    }
}

fn parse_oauth_row(row: &Row<'_>) -> RepoResult<OAuthCredential> {
    let token_expires_at = match row.get::<_, Option<i64>>("token_expires_at")? {
        Some(ms) => Some(from_millis("oauth_credentials.token_expires_at", ms)?),
        None => None,
    };
    Ok(OAuthCredential {
        provider: row.get("provider")?,
        client_id: row.get("client_id")?,
        client_secret: row.get("client_secret")?,
        redirect_uri: row.get("redirect_uri")?,
        access_token: row.get("access_token")?,
        refresh_token: row.get("refresh_token")?,
        token_expires_at,
    })
}
