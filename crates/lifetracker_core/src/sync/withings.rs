//! Withings weigh-ins over OAuth2.
//!
//! # Invariants
//! - Every Withings payload carries `status`; anything but `0` is an error.
//! - Weight is `value * 10^unit` kilograms, stored in pounds with 2 decimals.

use crate::model::credential::{OAuthCredential, PROVIDER_WITHINGS};
use crate::model::health::WeighIn;
use crate::model::record::{round2, SourceKey, SOURCE_WITHINGS};
use crate::repo::credential_repo::CredentialRepository;
use crate::sync::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::sync::oauth::{OAuthProvider, OAuthSession, TokenGrant};
use crate::sync::result::Batch;
use crate::sync::{SyncError, SyncOutcome};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

pub const WITHINGS_API_BASE: &str = "https://wbsapi.withings.net";
pub const WITHINGS_AUTH_URL: &str = "https://account.withings.com/oauth2_user/authorize2";
pub const WITHINGS_SCOPE: &str = "user.metrics";
const MIN_STATE_LEN: usize = 8;
const KG_TO_LBS: f64 = 2.20462;
const MEASURE_TYPE_WEIGHT: i64 = 1;
const CATEGORY_REAL: i64 = 1;

pub struct WithingsOAuth;

impl OAuthProvider for WithingsOAuth {
    fn provider_id(&self) -> &'static str {
        PROVIDER_WITHINGS
    }

    fn display_name(&self) -> &'static str {
        "Withings"
    }

    fn auth_command(&self) -> &'static str {
        "withings-auth"
    }

    fn authorization_url(
        &self,
        credential: &OAuthCredential,
        state: &str,
    ) -> Result<String, SyncError> {
        if state.chars().count() < MIN_STATE_LEN {
            return Err(SyncError::Config(format!(
                "Withings state must be at least {MIN_STATE_LEN} characters"
            )));
        }
        let url = Url::parse_with_params(
            WITHINGS_AUTH_URL,
            &[
                ("response_type", "code"),
                ("client_id", credential.client_id.as_str()),
                ("redirect_uri", credential.redirect_uri.as_str()),
                ("scope", WITHINGS_SCOPE),
                ("state", state),
            ],
        )
        .map_err(|err| SyncError::Config(format!("invalid Withings auth url: {err}")))?;
        Ok(url.into())
    }

    fn code_request(&self, credential: &OAuthCredential, code: &str) -> HttpRequest {
        HttpRequest::post(format!("{WITHINGS_API_BASE}/v2/oauth2")).form(&[
            ("action", "requesttoken"),
            ("grant_type", "authorization_code"),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", credential.redirect_uri.as_str()),
        ])
    }

    fn refresh_request(&self, credential: &OAuthCredential, refresh_token: &str) -> HttpRequest {
        HttpRequest::post(format!("{WITHINGS_API_BASE}/v2/oauth2")).form(&[
            ("action", "requesttoken"),
            ("grant_type", "refresh_token"),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ])
    }

    fn parse_grant(&self, response: HttpResponse) -> Result<TokenGrant, SyncError> {
        unwrap_envelope(&response)
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Envelope<T> {
    status: i64,
    #[serde(default)]
    body: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// Opens the `{status, body}` wrapper every Withings endpoint returns.
fn unwrap_envelope<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, SyncError> {
    let envelope: Envelope<T> = response.json()?;
    if envelope.status != 0 {
        return Err(SyncError::Api {
            status: response.status,
            message: format!(
                "Withings status {}: {}",
                envelope.status,
                envelope.error.unwrap_or_default()
            ),
        });
    }
    envelope
        .body
        .ok_or_else(|| SyncError::Parse("Withings response has no body".to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct MeasureBody {
    #[serde(default)]
    measuregrps: Vec<MeasureGroup>,
    #[serde(default)]
    more: i64,
}

#[derive(Debug, Default, Deserialize)]
struct MeasureGroup {
    #[serde(default)]
    grpid: Option<i64>,
    #[serde(default)]
    date: Option<i64>,
    #[serde(default)]
    measures: Vec<Measure>,
}

#[derive(Debug, Default, Deserialize)]
struct Measure {
    #[serde(rename = "type", default)]
    kind: Option<i64>,
    #[serde(default)]
    value: Option<i64>,
    #[serde(default)]
    unit: Option<i32>,
}

pub struct WithingsSync<'a, T, C> {
    session: OAuthSession<'a, WithingsOAuth, T, C>,
}

impl<'a, T, C> WithingsSync<'a, T, C>
where
    T: HttpTransport,
    C: CredentialRepository,
{
    pub fn new(
        transport: &'a T,
        credentials: &'a C,
        fallback: Option<OAuthCredential>,
    ) -> SyncOutcome<Self> {
        Ok(Self {
            session: OAuthSession::load(WithingsOAuth, transport, credentials, fallback)?,
        })
    }

    pub fn authorization_url(&self, state: &str) -> SyncOutcome<String> {
        self.session.authorization_url(state)
    }

    pub fn exchange_code(&mut self, code: &str, now: DateTime<Utc>) -> SyncOutcome<()> {
        self.session.exchange_code(code, now)
    }

    /// Pulls every page of weight groups between `start` and `end`.
    pub fn fetch_weigh_ins(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SyncOutcome<Batch<WeighIn>> {
        let mut batch = Batch::default();
        let mut offset = 0usize;
        loop {
            let request = HttpRequest::get(format!("{WITHINGS_API_BASE}/measure"))
                .query("action", "getmeas")
                .query("meastype", MEASURE_TYPE_WEIGHT)
                .query("category", CATEGORY_REAL)
                .query("startdate", start.timestamp())
                .query("enddate", end.timestamp())
                .query("offset", offset);
            let response = self.session.send(request, now)?;
            let body: MeasureBody = unwrap_envelope(&response)?;
            let page_len = body.measuregrps.len();
            for group in body.measuregrps {
                batch.push(map_group(group));
            }
            if body.more == 0 || page_len == 0 {
                break;
            }
            offset += page_len;
        }
        info!(
            "event=withings_fetch module=sync status=ok weigh_ins={} skipped={}",
            batch.records.len(),
            batch.skipped
        );
        Ok(batch)
    }
}

fn map_group(group: MeasureGroup) -> Option<WeighIn> {
    let grpid = group.grpid.filter(|id| *id != 0)?;
    let Some(measured_at) = group
        .date
        .filter(|ts| *ts != 0)
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    else {
        debug!("event=withings_group_skipped module=sync reason=no_timestamp grpid={grpid}");
        return None;
    };
    let weight = group
        .measures
        .iter()
        .find(|measure| measure.kind == Some(MEASURE_TYPE_WEIGHT));
    let Some((value, unit)) = weight.and_then(|m| Some((m.value?, m.unit?))) else {
        debug!("event=withings_group_skipped module=sync reason=no_weight grpid={grpid}");
        return None;
    };

    let kilograms = value as f64 * 10f64.powi(unit);
    Some(WeighIn {
        key: SourceKey::new(SOURCE_WITHINGS, grpid.to_string()),
        measured_at,
        weight_lbs: round2(kilograms * KG_TO_LBS),
    })
}

#[cfg(test)]
mod tests {
    use super::{map_group, unwrap_envelope, Measure, MeasureGroup, WithingsSync};
    use crate::db::open_db_in_memory;
    use crate::model::credential::{OAuthCredential, PROVIDER_WITHINGS};
    use crate::repo::credential_repo::{CredentialRepository, SqliteCredentialRepository};
    use crate::sync::http::fake::ScriptedTransport;
    use crate::sync::http::HttpResponse;
    use crate::sync::oauth::TokenGrant;
    use crate::sync::SyncError;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn weight_group(value: i64, unit: i32) -> MeasureGroup {
        MeasureGroup {
            grpid: Some(9001),
            date: Some(1_730_548_800),
            measures: vec![
                Measure {
                    kind: Some(6),
                    value: Some(215),
                    unit: Some(-1),
                },
                Measure {
                    kind: Some(1),
                    value: Some(value),
                    unit: Some(unit),
                },
            ],
        }
    }

    #[test]
    fn converts_scaled_kilograms_to_pounds() {
        let weigh_in = map_group(weight_group(81_650, -3)).unwrap();
        assert_eq!(weigh_in.weight_lbs, 180.01);
        assert_eq!(weigh_in.key.source_id, "9001");
        assert_eq!(
            weigh_in.measured_at,
            Utc.with_ymd_and_hms(2024, 11, 2, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn envelope_yields_body_or_status_error() {
        let ok = HttpResponse::new(200, r#"{"status":0,"body":{"access_token":"a","expires_in":10800}}"#);
        let grant: TokenGrant = unwrap_envelope(&ok).unwrap();
        assert_eq!(grant.access_token, "a");
        assert_eq!(grant.expires_in, Some(10_800));

        let rejected = HttpResponse::new(200, r#"{"status":401,"error":"invalid_token"}"#);
        let err = unwrap_envelope::<TokenGrant>(&rejected).unwrap_err();
        assert!(matches!(err, SyncError::Api { .. }));
        assert!(err.to_string().contains("invalid_token"));

        let empty = HttpResponse::new(200, r#"{"status":0}"#);
        assert!(matches!(
            unwrap_envelope::<TokenGrant>(&empty).unwrap_err(),
            SyncError::Parse(_)
        ));
    }

    #[test]
    fn groups_without_weight_or_date_are_skipped() {
        let mut no_weight = weight_group(80_000, -3);
        no_weight.measures.retain(|m| m.kind != Some(1));
        assert!(map_group(no_weight).is_none());

        let mut no_date = weight_group(80_000, -3);
        no_date.date = None;
        assert!(map_group(no_date).is_none());

        let mut no_id = weight_group(80_000, -3);
        no_id.grpid = None;
        assert!(map_group(no_id).is_none());
    }

    fn stored_session(repo: &SqliteCredentialRepository<'_>, now: chrono::DateTime<Utc>) {
        let mut credential =
            OAuthCredential::new(PROVIDER_WITHINGS, "id", "secret", "http://localhost/cb");
        credential.access_token = Some("access".to_string());
        credential.refresh_token = Some("refresh".to_string());
        credential.token_expires_at = Some(now + Duration::hours(2));
        repo.save_oauth(&credential).unwrap();
    }

    #[test]
    fn pages_by_offset_while_more_is_set() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCredentialRepository::new(&conn);
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap();
        stored_session(&repo, now);

        let page_one = json!({"status": 0, "body": {"more": 1, "measuregrps": [
            {"grpid": 1, "date": 1_730_000_000, "measures": [{"type": 1, "value": 80000, "unit": -3}]},
            {"grpid": 2, "date": 1_730_100_000, "measures": [{"type": 6, "value": 20, "unit": 0}]}
        ]}})
        .to_string();
        let page_two = json!({"status": 0, "body": {"more": 0, "measuregrps": [
            {"grpid": 3, "date": 1_730_200_000, "measures": [{"type": 1, "value": 79500, "unit": -3}]}
        ]}})
        .to_string();
        let transport =
            ScriptedTransport::new(vec![(200, page_one.as_str()), (200, page_two.as_str())]);

        let mut sync = WithingsSync::new(&transport, &repo, None).unwrap();
        let batch = sync
            .fetch_weigh_ins(now - Duration::days(30), now, now)
            .unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.skipped, 1);
        assert_eq!(transport.request(0).query_value("offset"), Some("0"));
        assert_eq!(transport.request(1).query_value("offset"), Some("2"));
        assert_eq!(transport.request(0).query_value("meastype"), Some("1"));
    }

    #[test]
    fn non_zero_status_is_an_api_error() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCredentialRepository::new(&conn);
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap();
        stored_session(&repo, now);
        let transport = ScriptedTransport::new(vec![(200, r#"{"status": 503, "error": "invalid params"}"#)]);

        let mut sync = WithingsSync::new(&transport, &repo, None).unwrap();
        let err = sync
            .fetch_weigh_ins(now - Duration::days(1), now, now)
            .unwrap_err();
        assert!(matches!(err, SyncError::Api { .. }));
    }

    #[test]
    fn short_state_is_rejected() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCredentialRepository::new(&conn);
        let transport = ScriptedTransport::new(vec![]);
        let fallback = OAuthCredential::new(PROVIDER_WITHINGS, "cid", "sec", "http://cb");
        let sync = WithingsSync::new(&transport, &repo, Some(fallback)).unwrap();

        assert!(sync.authorization_url("short").is_err());
        let url = sync.authorization_url("state-12345").unwrap();
        assert!(url.contains("scope=user.metrics"));
    }
}
