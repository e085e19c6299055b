use calbridge_core::{EventDraft, SyncCursor};
use calbridge_providers::google::{GoogleAdapter, GoogleConfig};
use calbridge_providers::{ProviderAdapter, ProviderErrorCode, Reconciler, SyncStart};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> GoogleAdapter {
    GoogleAdapter::new(GoogleConfig::new().with_api_base(server.uri())).unwrap()
}

async fn mount_calendar(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/calendars/work"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "work",
            "timeZone": "Europe/Paris"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn sync_drains_pages_and_strips_token_suffix() {
    let server = MockServer::start().await;
    mount_calendar(&server).await;

    // Second page first: the more specific mock must win.
    Mock::given(method("GET"))
        .and(path("/calendars/work/events"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "b", "status": "cancelled"},
                {"id": "c", "status": "confirmed", "etag": "\"3\"", "summary": "Retro",
                 "start": {"date": "2024-03-16"}, "end": {"date": "2024-03-17"}}
            ],
            "nextSyncToken": "sync-2=ok"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/calendars/work/events"))
        .and(query_param("syncToken", "sync-1"))
        .and(header("Authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "a", "status": "confirmed", "etag": "\"1\"", "summary": "Standup",
                 "start": {"dateTime": "2024-03-15T10:00:00+01:00"},
                 "end": {"dateTime": "2024-03-15T10:30:00+01:00"}}
            ],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let result = Reconciler::new(&adapter)
        .sync(
            "at-1",
            "work",
            &SyncStart::Since(SyncCursor::new("sync-1")),
            Some(chrono_tz::UTC),
        )
        .await
        .unwrap();

    let ids: Vec<_> = result.updated_events.iter().map(|e| e.id()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(result.updated_events[0].properties.start_time, "2024-03-15T09:00:00");
    assert_eq!(result.updated_events[1].properties.start_time, "2024-03-16");
    assert_eq!(result.deleted_event_ids, vec!["b".to_string()]);
    assert_eq!(result.new_cursor.as_str(), "sync-2");
}

#[tokio::test]
async fn delete_calendar_renames_first() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/calendars/work"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "work"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/work"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server).delete_calendar("at", "work").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let methods: Vec<_> = requests.iter().map(|r| r.method.to_string()).collect();
    assert_eq!(methods, vec!["PATCH", "DELETE"]);
    let rename: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(rename["summary"].as_str().unwrap().len(), 13);
}

#[tokio::test]
async fn deleting_missing_calendar_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/calendars/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let err = adapter(&server).delete_calendar("at", "gone").await.unwrap_err();
    assert_eq!(err.code(), ProviderErrorCode::NotFound);
    assert_eq!(err.provider(), Some("google"));
}

#[tokio::test]
async fn stale_etag_is_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/calendars/work/events/a"))
        .and(header("If-Match", "\"1\""))
        .respond_with(ResponseTemplate::new(412).set_body_string("Precondition Failed"))
        .mount(&server)
        .await;

    let draft = EventDraft::new("Standup", "2024-03-15T10:00:00", "2024-03-15T10:30:00");
    let err = adapter(&server)
        .update_event("at", "work", "a", "\"1\"", &draft)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ProviderErrorCode::Conflict);
}

#[tokio::test]
async fn create_event_returns_etag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/work/events"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "new-1", "etag": "\"10\""})),
        )
        .mount(&server)
        .await;

    let draft = EventDraft::new("Review", "2024-03-15T10:00:00", "2024-03-15T11:00:00")
        .with_time_zone("Europe/Paris");
    let created = adapter(&server).create_event("at", "work", &draft).await.unwrap();
    assert_eq!(created.id, "new-1");
    assert_eq!(created.concurrency_tag, "\"10\"");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["start"]["timeZone"], "Europe/Paris");
}

#[tokio::test]
async fn expired_token_is_auth_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/work"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let err = Reconciler::new(&adapter)
        .sync("stale", "work", &SyncStart::Since(SyncCursor::new("s")), None)
        .await
        .unwrap_err();
    assert!(err.is_auth_rejection());
}
