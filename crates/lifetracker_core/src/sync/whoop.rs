//! Whoop workouts over OAuth2.
//!
//! # Invariants
//! - Unscored workouts and workouts with unreadable timestamps are skipped.
//! - Calories are converted from kilojoules and rounded to 2 decimals.

use crate::model::credential::{OAuthCredential, PROVIDER_WHOOP};
use crate::model::health::Workout;
use crate::model::record::{round2, SourceKey, SOURCE_WHOOP};
use crate::repo::credential_repo::CredentialRepository;
use crate::sync::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::sync::oauth::{OAuthProvider, OAuthSession, TokenGrant};
use crate::sync::result::Batch;
use crate::sync::{SyncError, SyncOutcome};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

pub const WHOOP_API_BASE: &str = "https://api.prod.whoop.com";
pub const WHOOP_AUTH_URL: &str = "https://api.prod.whoop.com/oauth/oauth2/auth";
pub const WHOOP_SCOPES: &str =
    "offline read:profile read:workout read:cycles read:recovery read:sleep";
const KILOJOULE_TO_KCAL: f64 = 0.239006;
const PAGE_LIMIT: u32 = 25;

pub struct WhoopOAuth;

impl OAuthProvider for WhoopOAuth {
    fn provider_id(&self) -> &'static str {
        PROVIDER_WHOOP
    }

    fn display_name(&self) -> &'static str {
        "Whoop"
    }

    fn auth_command(&self) -> &'static str {
        "whoop-auth"
    }

    fn authorization_url(
        &self,
        credential: &OAuthCredential,
        state: &str,
    ) -> Result<String, SyncError> {
        let mut params = vec![
            ("client_id", credential.client_id.as_str()),
            ("redirect_uri", credential.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", WHOOP_SCOPES),
        ];
        if !state.is_empty() {
            params.push(("state", state));
        }
        let url = Url::parse_with_params(WHOOP_AUTH_URL, &params)
            .map_err(|err| SyncError::Config(format!("invalid Whoop auth url: {err}")))?;
        Ok(url.into())
    }

    fn code_request(&self, credential: &OAuthCredential, code: &str) -> HttpRequest {
        HttpRequest::post(format!("{WHOOP_API_BASE}/oauth/oauth2/token")).form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("redirect_uri", credential.redirect_uri.as_str()),
        ])
    }

    fn refresh_request(&self, credential: &OAuthCredential, refresh_token: &str) -> HttpRequest {
        HttpRequest::post(format!("{WHOOP_API_BASE}/oauth/oauth2/token")).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("scope", WHOOP_SCOPES),
        ])
    }

    fn parse_grant(&self, response: HttpResponse) -> Result<TokenGrant, SyncError> {
        response.json()
    }
}

#[derive(Debug, Deserialize)]
struct WorkoutPage {
    #[serde(default)]
    records: Vec<RawWorkout>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWorkout {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    timezone_offset: Option<String>,
    #[serde(default)]
    sport_id: Option<i64>,
    #[serde(default)]
    score: Option<RawScore>,
}

#[derive(Debug, Default, Deserialize)]
struct RawScore {
    #[serde(default)]
    kilojoule: Option<f64>,
    #[serde(default)]
    average_heart_rate: Option<f64>,
    #[serde(default)]
    max_heart_rate: Option<f64>,
}

pub struct WhoopSync<'a, T, C> {
    session: OAuthSession<'a, WhoopOAuth, T, C>,
}

impl<'a, T, C> WhoopSync<'a, T, C>
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
            session: OAuthSession::load(WhoopOAuth, transport, credentials, fallback)?,
        })
    }

    pub fn authorization_url(&self, state: &str) -> SyncOutcome<String> {
        self.session.authorization_url(state)
    }

    pub fn exchange_code(&mut self, code: &str, now: DateTime<Utc>) -> SyncOutcome<()> {
        self.session.exchange_code(code, now)
    }

    /// Pulls every page of workouts between `start` and `end`.
    pub fn fetch_workouts(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SyncOutcome<Batch<Workout>> {
        let mut batch = Batch::default();
        let mut next_token: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let mut request =
                HttpRequest::get(format!("{WHOOP_API_BASE}/developer/v2/activity/workout"))
                    .query("start", whoop_timestamp(start))
                    .query("end", whoop_timestamp(end))
                    .query("limit", PAGE_LIMIT);
            if let Some(token) = next_token.as_deref() {
                request = request.query("nextToken", token);
            }
            let page: WorkoutPage = self.session.send(request, now)?.json()?;
            pages += 1;
            for raw in page.records {
                batch.push(map_workout(raw));
            }
            match page.next_token.filter(|token| !token.is_empty()) {
                Some(token) if next_token.as_deref() != Some(token.as_str()) => {
                    next_token = Some(token)
                }
                _ => break,
            }
        }
        info!(
            "event=whoop_fetch module=sync status=ok pages={} workouts={} skipped={}",
            pages,
            batch.records.len(),
            batch.skipped
        );
        Ok(batch)
    }
}

fn whoop_timestamp(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S.000Z").to_string()
}

fn map_workout(raw: RawWorkout) -> Option<Workout> {
    let id = match raw.id? {
        Value::String(id) if !id.trim().is_empty() => id,
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let Some(score) = raw.score else {
        debug!("event=whoop_workout_skipped module=sync reason=unscored id={id}");
        return None;
    };
    let start = parse_instant(raw.start.as_deref());
    let end = parse_instant(raw.end.as_deref());
    let (Some(start), Some(end)) = (start, end) else {
        debug!("event=whoop_workout_skipped module=sync reason=bad_timestamp id={id}");
        return None;
    };

    let calories_burned = score
        .kilojoule
        .filter(|kj| *kj != 0.0)
        .map(|kj| round2(kj * KILOJOULE_TO_KCAL));
    Some(Workout {
        key: SourceKey::new(SOURCE_WHOOP, id),
        start,
        end,
        timezone_offset: raw
            .timezone_offset
            .filter(|offset| !offset.is_empty())
            .unwrap_or_else(|| "+00:00".to_string()),
        sport_id: raw.sport_id.unwrap_or(0),
        average_heart_rate: score.average_heart_rate.map(|hr| hr.round() as i64),
        max_heart_rate: score.max_heart_rate.map(|hr| hr.round() as i64),
        calories_burned,
    })
}

fn parse_instant(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::{map_workout, RawScore, RawWorkout, WhoopSync};
    use crate::db::open_db_in_memory;
    use crate::model::credential::{OAuthCredential, PROVIDER_WHOOP};
    use crate::repo::credential_repo::{CredentialRepository, SqliteCredentialRepository};
    use crate::sync::http::fake::ScriptedTransport;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn scored(kilojoule: Option<f64>) -> RawWorkout {
        RawWorkout {
            id: Some(json!("abc-1")),
            start: Some("2025-11-02T14:00:00.000Z".to_string()),
            end: Some("2025-11-02T15:00:00.000Z".to_string()),
            timezone_offset: Some("-06:00".to_string()),
            sport_id: None,
            score: Some(RawScore {
                kilojoule,
                average_heart_rate: Some(131.0),
                max_heart_rate: Some(172.0),
            }),
        }
    }

    #[test]
    fn maps_kilojoules_to_rounded_calories() {
        let workout = map_workout(scored(Some(1000.0))).unwrap();
        assert_eq!(workout.calories_burned, Some(239.01));
        assert_eq!(workout.sport_id, 0);
        assert_eq!(workout.key.source_id, "abc-1");
        assert_eq!(workout.average_heart_rate, Some(131));
    }

    #[test]
    fn zero_kilojoules_leave_calories_empty() {
        assert_eq!(map_workout(scored(Some(0.0))).unwrap().calories_burned, None);
        assert_eq!(map_workout(scored(None)).unwrap().calories_burned, None);
    }

    #[test]
    fn unscored_or_malformed_workouts_are_skipped() {
        let mut unscored = scored(Some(10.0));
        unscored.score = None;
        assert!(map_workout(unscored).is_none());

        let mut bad_time = scored(Some(10.0));
        bad_time.end = Some("yesterday".to_string());
        assert!(map_workout(bad_time).is_none());

        let mut no_id = scored(Some(10.0));
        no_id.id = None;
        assert!(map_workout(no_id).is_none());
    }

    #[test]
    fn follows_next_token_until_exhausted() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCredentialRepository::new(&conn);
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 18, 0, 0).unwrap();
        let mut credential = OAuthCredential::new(PROVIDER_WHOOP, "id", "secret", "http://cb");
        credential.access_token = Some("access".to_string());
        credential.refresh_token = Some("refresh".to_string());
        credential.token_expires_at = Some(now + Duration::hours(1));
        repo.save_oauth(&credential).unwrap();

        let page_one = json!({
            "records": [
                {"id": "w1", "start": "2025-11-01T10:00:00.000Z", "end": "2025-11-01T11:00:00.000Z",
                 "sport_id": 1, "score": {"kilojoule": 500.0}},
                {"id": "w2", "start": "2025-11-01T12:00:00.000Z", "end": "2025-11-01T12:30:00.000Z"}
            ],
            "next_token": "page-2"
        })
        .to_string();
        let page_two = json!({
            "records": [
                {"id": "w3", "start": "2025-11-02T10:00:00.000Z", "end": "2025-11-02T11:00:00.000Z",
                 "score": {"kilojoule": 800.0, "max_heart_rate": 160}}
            ]
        })
        .to_string();
        let transport =
            ScriptedTransport::new(vec![(200, page_one.as_str()), (200, page_two.as_str())]);

        let mut sync = WhoopSync::new(&transport, &repo, None).unwrap();
        let batch = sync
            .fetch_workouts(now - Duration::days(30), now, now)
            .unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.skipped, 1);
        assert_eq!(transport.request(1).query_value("nextToken"), Some("page-2"));
        assert_eq!(
            transport.request(0).query_value("start"),
            Some("2025-10-03T18:00:00.000Z")
        );
    }

    #[test]
    fn authorization_url_carries_scopes_and_state() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCredentialRepository::new(&conn);
        let transport = ScriptedTransport::new(vec![]);
        let fallback = OAuthCredential::new(PROVIDER_WHOOP, "client-1", "s", "http://localhost/cb");
        let sync = WhoopSync::new(&transport, &repo, Some(fallback)).unwrap();

        let url = sync.authorization_url("state123").unwrap();
        assert!(url.starts_with("https://api.prod.whoop.com/oauth/oauth2/auth?"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("read%3Aworkout") || url.contains("read:workout"));
        assert!(url.contains("state=state123"));
    }
}
