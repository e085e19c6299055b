use calbridge_core::{EventDraft, SyncCursor};
use calbridge_providers::caldav::{CalDavAdapter, CalDavConfig};
use calbridge_providers::{NewCalendar, ProviderAdapter, ProviderErrorCode, Reconciler, SyncStart};
use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

// "alice:app-password"
const AUTH: &str = "Basic YWxpY2U6YXBwLXBhc3N3b3Jk";
const PASSWORD: &str = "app-password";

fn adapter(server: &MockServer) -> CalDavAdapter {
    CalDavAdapter::new(CalDavConfig::new(&server.uri(), "alice").unwrap()).unwrap()
}

fn multistatus(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(207).set_body_raw(
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">{body}</d:multistatus>"#
        ),
        "application/xml",
    )
}

async fn mount_principal(server: &MockServer) {
    Mock::given(method("PROPFIND"))
        .and(path("/"))
        .and(header("Authorization", AUTH))
        .respond_with(multistatus(
            r#"<d:response><d:href>/</d:href><d:propstat><d:prop>
                <d:current-user-principal>
                  <d:href>/123/principal/</d:href>
                </d:current-user-principal>
            </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#,
        ))
        .mount(server)
        .await;
}

const STANDUP: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:standup\r\n\
DTSTART;TZID=Europe/Paris:20240315T100000\r\nDTEND;TZID=Europe/Paris:20240315T103000\r\n\
SUMMARY:Standup\r\nDESCRIPTION:Daily\\, short\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

#[tokio::test]
async fn sync_collection_with_multiget() {
    let server = MockServer::start().await;
    mount_principal(&server).await;

    Mock::given(method("PROPFIND"))
        .and(path("/123/calendars/work/"))
        .respond_with(multistatus(
            r#"<d:response><d:href>/123/calendars/work/</d:href><d:propstat><d:prop>
                <d:sync-token>tok-1</d:sync-token>
                <c:calendar-timezone>BEGIN:VCALENDAR
BEGIN:VTIMEZONE
TZID:Europe/Paris
END:VTIMEZONE
END:VCALENDAR</c:calendar-timezone>
            </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("REPORT"))
        .and(path("/123/calendars/work/"))
        .and(body_string_contains("sync-collection"))
        .and(body_string_contains("<d:sync-token>tok-1</d:sync-token>"))
        .respond_with(multistatus(
            r#"<d:response><d:href>/123/calendars/work/standup.ics</d:href><d:propstat>
                <d:prop><d:getetag>"e1"</d:getetag></d:prop>
                <d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>
              <d:response><d:href>/123/calendars/work/broken.ics</d:href><d:propstat>
                <d:prop><d:getetag>"e9"</d:getetag></d:prop>
                <d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>
              <d:response><d:href>/123/calendars/work/old.ics</d:href>
                <d:status>HTTP/1.1 404 Not Found</d:status></d:response>
              <d:sync-token>tok-2</d:sync-token>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("REPORT"))
        .and(path("/123/calendars/work/"))
        .and(body_string_contains("calendar-multiget"))
        .respond_with(multistatus(&format!(
            r#"<d:response><d:href>/123/calendars/work/standup.ics</d:href><d:propstat><d:prop>
                <d:getetag>"e1"</d:getetag><c:calendar-data>{STANDUP}</c:calendar-data>
              </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>
              <d:response><d:href>/123/calendars/work/broken.ics</d:href>
                <d:status>HTTP/1.1 404 Not Found</d:status></d:response>"#
        )))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let result = Reconciler::new(&adapter)
        .sync(
            PASSWORD,
            "/123/calendars/work/",
            &SyncStart::Since(SyncCursor::new("tok-1")),
            Some(chrono_tz::UTC),
        )
        .await
        .unwrap();

    assert_eq!(result.updated_events.len(), 1);
    let event = &result.updated_events[0];
    assert_eq!(event.id(), "/123/calendars/work/standup.ics");
    assert_eq!(event.properties.summary, "Standup");
    assert_eq!(event.properties.start_time, "2024-03-15T09:00:00");
    assert_eq!(event.concurrency_tag, "\"e1\"");
    assert_eq!(result.deleted_event_ids, vec!["/123/calendars/work/old.ics".to_string()]);
    assert_eq!(result.new_cursor.as_str(), "tok-2");
}

const SPRING_FORWARD: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:early\r\n\
DTSTART;TZID=Europe/Paris:20240331T023000\r\nDTEND;TZID=Europe/Paris:20240331T040000\r\n\
SUMMARY:Early shift\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

#[tokio::test]
async fn wall_clock_time_in_dst_gap_still_syncs() {
    let server = MockServer::start().await;
    mount_principal(&server).await;
    Mock::given(method("PROPFIND"))
        .and(path("/cal/"))
        .respond_with(multistatus(""))
        .mount(&server)
        .await;

    Mock::given(method("REPORT"))
        .and(path("/cal/"))
        .and(body_string_contains("sync-collection"))
        .respond_with(multistatus(
            r#"<d:response><d:href>/cal/early.ics</d:href><d:propstat>
                <d:prop><d:getetag>"e4"</d:getetag></d:prop>
                <d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>
              <d:sync-token>tok-5</d:sync-token>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("REPORT"))
        .and(path("/cal/"))
        .and(body_string_contains("calendar-multiget"))
        .respond_with(multistatus(&format!(
            r#"<d:response><d:href>/cal/early.ics</d:href><d:propstat><d:prop>
                <d:getetag>"e4"</d:getetag><c:calendar-data>{SPRING_FORWARD}</c:calendar-data>
              </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#
        )))
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let reconciler = Reconciler::new(&adapter);
    let start = SyncStart::Since(SyncCursor::new("tok-4"));

    // Read with the pre-transition offset: 02:30 +01:00 is 03:30 +02:00.
    let result = reconciler
        .sync(PASSWORD, "/cal/", &start, None)
        .await
        .unwrap();
    assert_eq!(result.updated_events.len(), 1);
    let event = &result.updated_events[0].properties;
    assert_eq!(event.summary, "Early shift");
    assert_eq!(event.start_time, "2024-03-31T03:30:00");
    assert_eq!(event.end_time, "2024-03-31T04:00:00");
    assert_eq!(result.new_cursor.as_str(), "tok-5");

    let result = reconciler
        .sync(PASSWORD, "/cal/", &start, Some(chrono_tz::UTC))
        .await
        .unwrap();
    assert_eq!(result.updated_events[0].properties.start_time, "2024-03-31T01:30:00");
}

#[tokio::test]
async fn truncated_report_continues_with_returned_token() {
    let server = MockServer::start().await;
    mount_principal(&server).await;
    Mock::given(method("PROPFIND"))
        .and(path("/cal/"))
        .respond_with(multistatus(""))
        .mount(&server)
        .await;

    Mock::given(method("REPORT"))
        .and(body_string_contains("<d:sync-token>partial</d:sync-token>"))
        .respond_with(multistatus(
            r#"<d:response><d:href>/cal/b.ics</d:href>
                <d:status>HTTP/1.1 404 Not Found</d:status></d:response>
              <d:sync-token>final</d:sync-token>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("REPORT"))
        .and(body_string_contains("<d:sync-token>start</d:sync-token>"))
        .respond_with(multistatus(
            r#"<d:response><d:href>/cal/a.ics</d:href>
                <d:status>HTTP/1.1 404 Not Found</d:status></d:response>
              <d:response><d:href>/cal/</d:href>
                <d:status>HTTP/1.1 507 Insufficient Storage</d:status></d:response>
              <d:sync-token>partial</d:sync-token>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let result = Reconciler::new(&adapter)
        .sync(PASSWORD, "/cal/", &SyncStart::Since(SyncCursor::new("start")), None)
        .await
        .unwrap();
    assert_eq!(result.deleted_event_ids, vec!["/cal/a.ics".to_string(), "/cal/b.ics".to_string()]);
    assert_eq!(result.new_cursor.as_str(), "final");
}

#[tokio::test]
async fn create_calendar_discovers_home_and_reads_sync_token() {
    let server = MockServer::start().await;
    mount_principal(&server).await;

    Mock::given(method("PROPFIND"))
        .and(path("/123/principal/"))
        .respond_with(multistatus(
            r#"<d:response><d:href>/123/principal/</d:href><d:propstat><d:prop>
                <c:calendar-home-set><d:href>/123/calendars/</d:href></c:calendar-home-set>
            </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("MKCALENDAR"))
        .and(path_regex(r"^/123/calendars/[0-9a-f-]{36}/$"))
        .and(body_string_contains("<d:displayname>Team</d:displayname>"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path_regex(r"^/123/calendars/[0-9a-f-]{36}/$"))
        .respond_with(multistatus(
            r#"<d:response><d:href>/x/</d:href><d:propstat><d:prop>
                <d:sync-token>https://example.com/sync/1</d:sync-token>
            </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#,
        ))
        .mount(&server)
        .await;

    let created = adapter(&server)
        .create_calendar(PASSWORD, &NewCalendar::new("Team"))
        .await
        .unwrap();
    assert!(created.id.starts_with(&format!("{}/123/calendars/", server.uri())));
    assert_eq!(
        created.cursor.as_ref().map(|c| c.as_str()),
        Some("https://example.com/sync/1")
    );
}

#[tokio::test]
async fn create_event_puts_new_resource() {
    let server = MockServer::start().await;
    mount_principal(&server).await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/cal/[0-9a-f-]{36}\.ics$"))
        .and(header("If-None-Match", "*"))
        .and(body_string_contains("SUMMARY:Review"))
        .respond_with(ResponseTemplate::new(201).insert_header("ETag", "\"new-1\""))
        .expect(1)
        .mount(&server)
        .await;

    let draft = EventDraft::new("Review", "2024-03-15T10:00:00", "2024-03-15T11:00:00");
    let created = adapter(&server)
        .create_event(PASSWORD, "/cal/", &draft)
        .await
        .unwrap();
    assert!(created.id.starts_with("/cal/"));
    assert!(created.id.ends_with(".ics"));
    assert_eq!(created.concurrency_tag, "\"new-1\"");
}

#[tokio::test]
async fn stale_etag_is_conflict() {
    let server = MockServer::start().await;
    mount_principal(&server).await;
    Mock::given(method("REPORT"))
        .and(body_string_contains("calendar-multiget"))
        .respond_with(multistatus(&format!(
            r#"<d:response><d:href>/cal/standup.ics</d:href><d:propstat><d:prop>
                <d:getetag>"e2"</d:getetag><c:calendar-data>{STANDUP}</c:calendar-data>
              </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"#
        )))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/cal/standup.ics"))
        .and(header("If-Match", "\"e1\""))
        .and(body_string_contains("UID:standup"))
        .respond_with(ResponseTemplate::new(412))
        .expect(1)
        .mount(&server)
        .await;

    let draft = EventDraft::new("Standup", "2024-03-15T10:00:00", "2024-03-15T10:30:00");
    let err = adapter(&server)
        .update_event(PASSWORD, "/cal/", "/cal/standup.ics", "\"e1\"", &draft)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ProviderErrorCode::Conflict);
    assert_eq!(err.provider(), Some("caldav"));
}

#[tokio::test]
async fn failed_probe_stops_before_any_other_request() {
    let server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = adapter(&server)
        .delete_calendar("wrong", "/cal/")
        .await
        .unwrap_err();
    assert!(err.is_auth_rejection());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_missing_calendar_is_not_found() {
    let server = MockServer::start().await;
    mount_principal(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/cal/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = adapter(&server).delete_calendar(PASSWORD, "/cal/").await.unwrap_err();
    assert_eq!(err.code(), ProviderErrorCode::NotFound);
}
