use nxweb_core::db::open_db_in_memory;
use nxweb_core::model::debug::{
    DebugSessionStatus, DebugSessionType, InspectorRequest, InspectorResponse,
};
use nxweb_core::repo::debug_repo::{DebugRepository, SessionQuery, SqliteDebugRepository};
use nxweb_core::repo::inspector_repo::{
    InspectorRepository, RequestQuery, ResponseQuery, SqliteInspectorRepository,
};
use nxweb_core::service::inspector_service::{RequestModifications, ResentResponse};
use nxweb_core::{DebugService, InspectorService, PageRequest, ServiceError};
use rusqlite::Connection;
use serde_json::json;

fn debug(conn: &Connection) -> DebugService<SqliteDebugRepository<'_>> {
    DebugService::new(SqliteDebugRepository::new(conn))
}

fn inspector(conn: &Connection) -> InspectorService<SqliteInspectorRepository<'_>> {
    InspectorService::new(SqliteInspectorRepository::new(conn))
}

#[test]
fn duplicate_debug_project_name_conflicts() {
    let conn = open_db_in_memory().unwrap();
    debug(&conn).create_project("news", "print(1)".into()).unwrap();

    let err = debug(&conn).create_project("news", String::new()).unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let err = debug(&conn).create_project("  ", String::new()).unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[test]
fn replace_script_snapshots_previous_version() {
    let conn = open_db_in_memory().unwrap();
    let service = debug(&conn);
    service.create_project("news", "v1".into()).unwrap();

    service.replace_script("news", "v2").unwrap();
    service.replace_script("news", "v3").unwrap();

    assert_eq!(service.script("news").unwrap(), "v3");
    let history = service.history("news").unwrap();
    let contents: Vec<_> = history.iter().map(|item| item.content.as_str()).collect();
    assert_eq!(contents, vec!["v2", "v1"]);

    let item = service.history_item("news", &history[1].id).unwrap();
    assert_eq!(item.content, "v1");

    service.create_project("other", "x".into()).unwrap();
    assert!(matches!(
        service.history_item("other", &history[1].id).unwrap_err(),
        ServiceError::NotFound(_)
    ));
    assert!(matches!(
        service.replace_script("news", "").unwrap_err(),
        ServiceError::InvalidInput(_)
    ));
}

#[test]
fn sync_script_creates_or_refreshes() {
    let conn = open_db_in_memory().unwrap();
    let service = debug(&conn);

    let created = service.sync_script("news", "fetched").unwrap();
    assert_eq!(created.script, "fetched");

    let unchanged = service.sync_script("news", "").unwrap();
    assert_eq!(unchanged.script, "fetched");

    let refreshed = service.sync_script("news", "newer").unwrap();
    assert_eq!(refreshed.script, "newer");
    assert!(service.history("news").unwrap().is_empty());
}

#[test]
fn begin_run_records_session_and_task() {
    let conn = open_db_in_memory().unwrap();
    let service = debug(&conn);
    service.create_project("news", "v1".into()).unwrap();

    let run = service
        .begin_run("news", Some("script"), Some(json!("{\"url\": \"http://a/\"}")))
        .unwrap();
    assert_eq!(run.session.kind, DebugSessionType::Debugger);
    assert_eq!(run.session.status, DebugSessionStatus::Running);
    assert_eq!(run.task["url"], "http://a/");
    assert_eq!(run.task["taskid"], "data:,on_start");

    let repo = SqliteDebugRepository::new(&conn);
    let stored = repo.list_debug_tasks(&run.session.id).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].url, "http://a/");
    assert_eq!(stored[0].process, json!({"callback": "on_start"}));

    let finished = service
        .finish_session(run.session, json!({"ok": true}))
        .unwrap();
    let loaded = repo.get_session(&finished.id).unwrap().unwrap();
    assert_eq!(loaded.status, DebugSessionStatus::Stopped);
    assert!(loaded.ended_at.is_some());
    assert_eq!(loaded.data, Some(json!({"ok": true})));
}

#[test]
fn begin_run_validates_input() {
    let conn = open_db_in_memory().unwrap();
    let service = debug(&conn);
    service.create_project("news", "v1".into()).unwrap();

    assert!(matches!(
        service.begin_run("news", None, Some(json!({}))).unwrap_err(),
        ServiceError::InvalidInput(_)
    ));
    assert!(matches!(
        service.begin_run("news", Some("s"), None).unwrap_err(),
        ServiceError::InvalidInput(_)
    ));
    assert!(matches!(
        service
            .begin_run("news", Some("s"), Some(json!("{broken")))
            .unwrap_err(),
        ServiceError::InvalidInput(_)
    ));
    assert!(matches!(
        service
            .begin_run("missing", Some("s"), Some(json!({})))
            .unwrap_err(),
        ServiceError::NotFound(_)
    ));

    let sessions: i64 = conn
        .query_row("SELECT COUNT(*) FROM debug_sessions;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(sessions, 0);
}

#[test]
fn latest_session_filters_by_profiling_type_and_status() {
    let conn = open_db_in_memory().unwrap();
    let service = debug(&conn);

    let memory = service
        .start_session(
            DebugSessionType::Profiler,
            Some(json!({"profilingType": "MEMORY"})),
        )
        .unwrap();
    let cpu = service
        .start_session(
            DebugSessionType::Profiler,
            Some(json!({"profilingType": "CPU"})),
        )
        .unwrap();

    let query = SessionQuery::new(DebugSessionType::Profiler)
        .with_statuses(&[DebugSessionStatus::Running])
        .with_profiling_type("CPU");
    let found = service.latest_session(&query).unwrap().unwrap();
    assert_eq!(found.id, cpu.id);

    let mut stopped = found;
    stopped.stop(nxweb_core::now_ms());
    service.save_session(&stopped).unwrap();
    assert!(service.latest_session(&query).unwrap().is_none());

    let any_profiler = service
        .latest_session(&SessionQuery::new(DebugSessionType::Profiler))
        .unwrap()
        .unwrap();
    assert!(any_profiler.id == memory.id || any_profiler.id == cpu.id);
}

#[test]
fn deleting_debug_project_detaches_sessions() {
    let conn = open_db_in_memory().unwrap();
    let service = debug(&conn);
    service.create_project("news", "v1".into()).unwrap();
    let run = service
        .begin_run("news", Some("s"), Some(json!({})))
        .unwrap();

    service.delete_project("news").unwrap();
    let session = SqliteDebugRepository::new(&conn)
        .get_session(&run.session.id)
        .unwrap()
        .unwrap();
    assert_eq!(session.project_id, None);
}

fn seed_request(conn: &Connection, id: &str, url: &str, method: &str, timestamp: i64) {
    SqliteInspectorRepository::new(conn)
        .create_request(&InspectorRequest {
            id: id.into(),
            url: url.into(),
            method: method.into(),
            headers: Some(json!({"accept": "*/*"})),
            body: None,
            timestamp,
            debug_session_id: None,
        })
        .unwrap();
}

#[test]
fn request_listing_filters_and_pages() {
    let conn = open_db_in_memory().unwrap();
    seed_request(&conn, "r1", "http://a.example/list", "GET", 1);
    seed_request(&conn, "r2", "http://b.example/item", "POST", 2);
    seed_request(&conn, "r3", "http://a.example/item", "GET", 3);
    SqliteInspectorRepository::new(&conn)
        .create_response(&InspectorResponse {
            id: "s1".into(),
            status_code: 404,
            headers: None,
            body: Some("missing".into()),
            timestamp: 4,
            request_id: "r1".into(),
            debug_session_id: None,
        })
        .unwrap();

    let page = inspector(&conn)
        .list_requests(&RequestQuery {
            url: Some("a.example".into()),
            ..Default::default()
        })
        .unwrap();
    let ids: Vec<_> = page.requests.iter().map(|item| item.request.id.as_str()).collect();
    assert_eq!(ids, vec!["r3", "r1"]);
    assert_eq!(page.pagination.total, 2);
    assert_eq!(page.requests[1].response.as_ref().unwrap().status_code, 404);
    assert!(page.requests[0].response.is_none());

    let posts = inspector(&conn)
        .list_requests(&RequestQuery {
            method: Some("POST".into()),
            page: PageRequest::new(Some(1), Some(1)),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(posts.pagination.total_pages, 1);
    assert_eq!(posts.requests[0].request.id, "r2");

    let responses = inspector(&conn)
        .list_responses(&ResponseQuery {
            status_code: Some(404),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(responses.responses.len(), 1);
    assert_eq!(
        responses.responses[0].request.as_ref().unwrap().url,
        "http://a.example/list"
    );
}

#[test]
fn request_detail_and_delete() {
    let conn = open_db_in_memory().unwrap();
    seed_request(&conn, "r1", "http://a.example/", "GET", 1);

    let detail = inspector(&conn).get_request("r1").unwrap();
    assert!(detail.response.is_none());
    assert!(detail.debug_session.is_none());

    inspector(&conn).delete_request("r1").unwrap();
    assert!(matches!(
        inspector(&conn).get_request("r1").unwrap_err(),
        ServiceError::NotFound(_)
    ));
    assert!(matches!(
        inspector(&conn).delete_request("r1").unwrap_err(),
        ServiceError::NotFound(_)
    ));
}

#[test]
fn resend_records_new_request_and_response() {
    let conn = open_db_in_memory().unwrap();
    seed_request(&conn, "r1", "http://a.example/", "GET", 1);
    let session = debug(&conn)
        .start_session(DebugSessionType::Inspector, Some(json!({})))
        .unwrap();

    let service = inspector(&conn);
    let prepared = service
        .prepare_resend(
            "r1",
            &RequestModifications {
                method: Some("POST".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let stored = service
        .record_resend(
            &session.id,
            &prepared,
            Some(ResentResponse {
                status_code: 201,
                headers: None,
                body: Some("ok".into()),
            }),
        )
        .unwrap();

    let detail = service.get_request(&stored.id).unwrap();
    assert_eq!(detail.request.method, "POST");
    assert_eq!(detail.request.url, "http://a.example/");
    assert_eq!(detail.response.unwrap().status_code, 201);
    assert_eq!(detail.debug_session.unwrap().id, session.id);

    assert!(matches!(
        service
            .prepare_resend("missing", &RequestModifications::default())
            .unwrap_err(),
        ServiceError::NotFound(_)
    ));
}
