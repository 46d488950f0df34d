use chrono::{Duration, TimeZone, Utc};
use lifetracker_core::db::open_db_in_memory;
use lifetracker_core::model::activity::{CalendarEvent, TimeLog};
use lifetracker_core::model::credential::{ApiCredential, OAuthCredential};
use lifetracker_core::model::health::WeighIn;
use lifetracker_core::model::planning::{Goal, Project};
use lifetracker_core::model::record::{SourceKey, UpsertOutcome};
use lifetracker_core::repo::calendar_repo::{CalendarRepository, SqliteCalendarRepository};
use lifetracker_core::repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
use lifetracker_core::repo::credential_repo::{CredentialRepository, SqliteCredentialRepository};
use lifetracker_core::repo::record_repo::{
    RecordTable, SqliteSyncedRecordRepository, SyncedRecordRepository,
};
use lifetracker_core::RepoError;

#[test]
fn weigh_in_upsert_updates_in_place() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSyncedRecordRepository::new(&conn);
    let measured_at = Utc.with_ymd_and_hms(2025, 11, 1, 7, 30, 0).unwrap();
    let mut weigh_in = WeighIn {
        key: SourceKey::new("withings", "grp-1"),
        measured_at,
        weight_lbs: 181.2,
    };

    assert_eq!(repo.upsert_weigh_in(&weigh_in).unwrap(), UpsertOutcome::Created);
    weigh_in.weight_lbs = 180.8;
    assert_eq!(repo.upsert_weigh_in(&weigh_in).unwrap(), UpsertOutcome::Updated);

    let stored = repo
        .list_weigh_ins(measured_at - Duration::days(1), measured_at + Duration::days(1))
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].weight_lbs, 180.8);
    assert!(repo.record_exists(RecordTable::WeighIns, &weigh_in.key).unwrap());
}

#[test]
fn negative_weight_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSyncedRecordRepository::new(&conn);
    let err = repo
        .upsert_weigh_in(&WeighIn {
            key: SourceKey::new("withings", "grp-2"),
            measured_at: Utc.with_ymd_and_hms(2025, 11, 1, 7, 30, 0).unwrap(),
            weight_lbs: -1.0,
        })
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn time_log_goal_links_are_replaced_on_upsert() {
    let conn = open_db_in_memory().unwrap();
    let catalog = SqliteCatalogRepository::new(&conn);
    catalog
        .upsert_project(&Project {
            project_id: 7,
            display_string: "Writing".to_string(),
        })
        .unwrap();
    for (goal_id, name) in [(70, "Novel"), (71, "Essays")] {
        catalog
            .upsert_goal(&Goal {
                goal_id,
                display_string: name.to_string(),
            })
            .unwrap();
    }

    let repo = SqliteSyncedRecordRepository::new(&conn);
    let start = Utc.with_ymd_and_hms(2025, 11, 2, 15, 0, 0).unwrap();
    let mut log = TimeLog {
        key: SourceKey::new("toggl", "1"),
        start,
        end: start + Duration::minutes(50),
        project_id: Some(7),
        goal_ids: vec![70, 71],
    };
    repo.upsert_time_log(&log).unwrap();
    log.goal_ids = vec![71];
    assert_eq!(repo.upsert_time_log(&log).unwrap(), UpsertOutcome::Updated);

    let logs = repo
        .list_time_logs(start - Duration::hours(1), start + Duration::hours(2))
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].goal_ids, vec![71]);
    assert_eq!(logs[0].project_id, Some(7));
}

#[test]
fn oauth_tokens_update_without_touching_client_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCredentialRepository::new(&conn);
    let mut credential = OAuthCredential::new("whoop", "client", "secret", "http://cb");
    repo.save_oauth(&credential).unwrap();

    credential.client_id = "ignored".to_string();
    credential.access_token = Some("access".to_string());
    credential.refresh_token = Some("refresh".to_string());
    credential.token_expires_at = Some(Utc.with_ymd_and_hms(2025, 11, 3, 13, 0, 0).unwrap());
    repo.store_tokens(&credential).unwrap();

    let loaded = repo.load_oauth("whoop").unwrap().unwrap();
    assert_eq!(loaded.client_id, "client");
    assert_eq!(loaded.access_token.as_deref(), Some("access"));
    assert_eq!(loaded.token_expires_at, credential.token_expires_at);
}

#[test]
fn storing_tokens_for_unknown_provider_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCredentialRepository::new(&conn);
    let credential = OAuthCredential::new("withings", "client", "secret", "http://cb");
    assert!(matches!(
        repo.store_tokens(&credential),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn api_credentials_round_trip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCredentialRepository::new(&conn);
    let mut credential = ApiCredential::new("toggl", "token");
    credential.workspace_id = Some("123".to_string());
    repo.save_api(&credential).unwrap();

    let loaded = repo.load_api("toggl").unwrap().unwrap();
    assert_eq!(loaded.api_token, "token");
    assert_eq!(loaded.workspace_id.as_deref(), Some("123"));
    assert!(repo.load_api("missing").unwrap().is_none());
}

#[test]
fn calendar_lookup_returns_overlapping_events_in_order() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCalendarRepository::new(&conn);
    let day = Utc.with_ymd_and_hms(2025, 11, 3, 0, 0, 0).unwrap();
    let event = |id: &str, start_hour: i64, hours: i64| CalendarEvent {
        outlook_id: id.to_string(),
        subject: format!("Event {id}"),
        start: day + Duration::hours(start_hour),
        end: day + Duration::hours(start_hour + hours),
        is_all_day: false,
        location: String::new(),
        organizer: String::new(),
        body_preview: String::new(),
    };

    repo.upsert_event(&event("late", 15, 1)).unwrap();
    repo.upsert_event(&event("overnight", -2, 4)).unwrap();
    repo.upsert_event(&event("yesterday", -5, 1)).unwrap();
    assert_eq!(
        repo.upsert_event(&event("late", 16, 1)).unwrap(),
        UpsertOutcome::Updated
    );

    let events = repo
        .events_overlapping(day, day + Duration::days(1))
        .unwrap();
    let ids: Vec<&str> = events.iter().map(|e| e.outlook_id.as_str()).collect();
    assert_eq!(ids, vec!["overnight", "late"]);
    assert_eq!(events[1].start, day + Duration::hours(16));
}
