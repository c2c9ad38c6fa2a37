use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use eventful_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use eventful_feed::store::schema::{EVENTS, EVENTS_BY_OWNER, INVITATIONS, INVITATIONS_BY_RECIPIENT};
use eventful_feed::store::sqlite::{delete_event, insert_event, insert_invitation, insert_user};
use eventful_feed::{
    ContinuationToken, FeedError, FeedService, FeedSettings, KeyQuery, PaginatedStore,
    SqliteStore, StoreError, UserDirectory,
};
use eventful_types::{Event, Invitation, InvitationStatus, PageRequest, User, ViewMode};
use tempfile::TempDir;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
}

fn test_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("feed.db");
    let pool = create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("failed to create pool");
    {
        let conn = pool.get().expect("failed to get connection");
        run_migrations(&conn).expect("failed to run migrations");
    }
    (dir, pool)
}

fn seed_scenario(pool: &DbPool) {
    let conn = pool.get().expect("failed to get connection");
    for (id, address, name) in [("u1", "u1@example.com", "Ada"), ("u2", "u2@example.com", "Grace")] {
        insert_user(
            &conn,
            &User {
                id: id.to_string(),
                contact_address: address.to_string(),
                name: Some(name.to_string()),
            },
        )
        .expect("failed to insert user");
    }
    for event in [
        Event::new("E1", "u1", day(3)).with_detail("title", "Launch party"),
        Event::new("E3", "u1", day(1)),
        Event::new("E2", "u2", day(2)),
        Event::new("E4", "u2", day(4)),
    ] {
        insert_event(&conn, &event).expect("failed to insert event");
    }
    for event_id in ["E2", "E4"] {
        insert_invitation(
            &conn,
            &Invitation {
                event_id: event_id.to_string(),
                recipient_address: "u1@example.com".to_string(),
                status: InvitationStatus::Pending,
            },
        )
        .expect("failed to insert invitation");
    }
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.id.as_str()).collect()
}

fn record_ids(records: &[serde_json::Value], field: &str) -> Vec<String> {
    records
        .iter()
        .map(|r| r[field].as_str().expect("field should be a string").to_string())
        .collect()
}

#[tokio::test]
async fn scenario_pages_match_over_sqlite() {
    let (_dir, pool) = test_pool();
    seed_scenario(&pool);
    let store = Arc::new(SqliteStore::new(pool));
    let feed = FeedService::new(store.clone(), store, FeedSettings::default());

    let all_1 = feed.get_feed("u1", ViewMode::All, PageRequest::new(1, 2)).await.unwrap();
    let all_2 = feed.get_feed("u1", ViewMode::All, PageRequest::new(2, 2)).await.unwrap();
    let hosting = feed.get_feed("u1", ViewMode::Hosting, PageRequest::new(1, 10)).await.unwrap();
    let invited = feed.get_feed("u1", ViewMode::Invited, PageRequest::new(1, 10)).await.unwrap();

    assert_eq!(ids(&all_1), vec!["E4", "E1"]);
    assert_eq!(ids(&all_2), vec!["E2", "E3"]);
    assert_eq!(ids(&hosting), vec!["E1", "E3"]);
    assert_eq!(ids(&invited), vec!["E4", "E2"]);
    assert_eq!(hosting[0].details["title"], "Launch party");
}

#[tokio::test]
async fn keyset_tokens_resume_across_equal_timestamps() {
    let (_dir, pool) = test_pool();
    {
        let conn = pool.get().unwrap();
        for (id, d) in [("a", 2), ("b", 2), ("c", 2), ("d", 1), ("e", 3)] {
            insert_event(&conn, &Event::new(id, "u1", day(d))).unwrap();
        }
        insert_event(&conn, &Event::new("other", "u2", day(2))).unwrap();
    }
    let store = SqliteStore::new(pool);
    let query = KeyQuery::new(EVENTS, EVENTS_BY_OWNER, "u1").descending();

    let mut walked = Vec::new();
    let mut token: Option<ContinuationToken> = None;
    let mut rounds = 0;
    loop {
        let page = store.query_by_key(&query, 2, token.as_ref()).await.unwrap();
        rounds += 1;
        walked.extend(record_ids(&page.items, "id"));
        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    assert_eq!(walked, vec!["e", "a", "b", "c", "d"]);
    assert_eq!(rounds, 3);
}

#[tokio::test]
async fn invitation_index_projects_event_ids() {
    let (_dir, pool) = test_pool();
    seed_scenario(&pool);
    let store = SqliteStore::new(pool);

    let query = KeyQuery::new(INVITATIONS, INVITATIONS_BY_RECIPIENT, "u1@example.com")
        .project(&["eventId"]);
    let first = store.query_by_key(&query, 1, None).await.unwrap();
    assert_eq!(first.items, vec![serde_json::json!({ "eventId": "E2" })]);

    let second = store
        .query_by_key(&query, 1, first.next_token.as_ref())
        .await
        .unwrap();
    assert_eq!(record_ids(&second.items, "eventId"), vec!["E4"]);
    assert!(second.next_token.is_none());
}

#[tokio::test]
async fn foreign_tokens_and_unknown_indexes_are_rejected() {
    let (_dir, pool) = test_pool();
    seed_scenario(&pool);
    let store = SqliteStore::new(pool);

    let u1 = KeyQuery::new(EVENTS, EVENTS_BY_OWNER, "u1").descending();
    let u2 = KeyQuery::new(EVENTS, EVENTS_BY_OWNER, "u2").descending();
    let token = store
        .query_by_key(&u1, 1, None)
        .await
        .unwrap()
        .next_token
        .expect("u1 has two events");

    assert!(matches!(
        store.query_by_key(&u2, 1, Some(&token)).await,
        Err(StoreError::InvalidToken)
    ));
    assert!(matches!(
        store
            .query_by_key(&KeyQuery::new(EVENTS, "no-such-index", "u1"), 1, None)
            .await,
        Err(StoreError::UnknownIndex { .. })
    ));
}

#[tokio::test]
async fn users_and_events_resolve_by_id() {
    let (_dir, pool) = test_pool();
    seed_scenario(&pool);
    let store = SqliteStore::new(pool);

    let user = store.find_user("u2").await.unwrap().expect("u2 exists");
    assert_eq!(user.contact_address, "u2@example.com");
    assert!(store.find_user("nobody").await.unwrap().is_none());

    let record = store.get_by_id(EVENTS, "E4").await.unwrap().expect("E4 exists");
    assert_eq!(record["ownerId"], "u2");
    assert_eq!(record["createdAt"], "2024-01-04T00:00:00.000000Z");
}

#[tokio::test]
async fn deleted_invited_event_is_skipped_and_detail_is_not_found() {
    let (_dir, pool) = test_pool();
    seed_scenario(&pool);
    {
        let conn = pool.get().unwrap();
        assert!(delete_event(&conn, "E4").unwrap());
    }
    let store = Arc::new(SqliteStore::new(pool));
    let feed = FeedService::new(store.clone(), store, FeedSettings::default());

    let invited = feed
        .get_feed("u1", ViewMode::Invited, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(ids(&invited), vec!["E2"]);

    assert!(matches!(feed.get_event("E4").await, Err(FeedError::NotFound(_))));
    let detail = feed.get_event("E1").await.unwrap();
    assert_eq!(detail.host_name.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn guest_list_reads_event_and_address_indexes() {
    let (_dir, pool) = test_pool();
    seed_scenario(&pool);
    {
        let conn = pool.get().expect("failed to get connection");
        for (address, status) in [
            ("u2@example.com", InvitationStatus::Accepted),
            ("walk-in@example.com", InvitationStatus::Declined),
        ] {
            insert_invitation(
                &conn,
                &Invitation {
                    event_id: "E2".to_string(),
                    recipient_address: address.to_string(),
                    status,
                },
            )
            .expect("failed to insert invitation");
        }
    }
    let store = Arc::new(SqliteStore::new(pool));
    let feed = FeedService::new(store.clone(), store, FeedSettings::default());

    let guests = feed.get_event_guests("E2").await.expect("E2 should exist");
    let addresses: Vec<&str> = guests.iter().map(|g| g.contact_address.as_str()).collect();
    assert_eq!(addresses, vec!["u1@example.com", "u2@example.com", "walk-in@example.com"]);
    assert_eq!(guests[0].user_id.as_deref(), Some("u1"));
    assert_eq!(guests[1].name.as_deref(), Some("Grace"));
    assert_eq!(guests[1].invitation_status, InvitationStatus::Accepted);
    assert_eq!(guests[2].user_id, None);

    let profile = feed.get_user("u1").await.expect("u1 should exist");
    assert_eq!(profile.name.as_deref(), Some("Ada"));
}
