use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_test::TestServer;
use futures::{SinkExt, StreamExt};
use nxweb_core::model::debug::{DebugSessionStatus, DebugSessionType, InspectorRequest};
use nxweb_core::now_ms;
use nxweb_core::repo::debug_repo::SessionQuery;
use nxweb_core::repo::inspector_repo::{InspectorRepository, SqliteInspectorRepository};
use nxweb_core::ServiceError;
use nxweb_server::{router, AppState, PySpiderClient, Store};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

/// Nothing listens here; crawler calls fail fast.
const UNREACHABLE_CRAWLER: &str = "http://127.0.0.1:9";

const INDEX_WITH_PROJECTS: &str = r#"<html><script>
window.projects = [{"name": "news", "status": "RUNNING", "rate": 2}];
</script></html>"#;

const INDEX_WITH_TABLE: &str = r#"<html><body><table class="projects"><tbody>
<tr data-name="shop">
  <td class="project-group"><span>retail &amp; co</span></td>
  <td class="project-status"><span>TODO</span></td>
  <td class="project-rate"><span>0.5/4</span></td>
</tr>
</tbody></table></body></html>"#;

const REMOTE_DEBUG_PAGE: &str = r#"<html><script>
var script_content = "print(\"remote\")";
</script></html>"#;

fn dashboard(crawler_url: &str) -> (TestServer, Store) {
    let store = Store::in_memory().unwrap();
    let state = AppState::new(store.clone(), PySpiderClient::new(crawler_url));
    (TestServer::new(router(state)).unwrap(), store)
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

async fn remote_debug_page(Path(name): Path<String>) -> Response {
    if name == "jsonproj" {
        return Json(json!({"name": "jsonproj", "script": "from_json()", "extra": 1})).into_response();
    }
    Html(REMOTE_DEBUG_PAGE).into_response()
}

/// Serves the crawler pages and debug endpoints the dashboard drives.
async fn spawn_crawler_with_index(index: &'static str) -> String {
    let app = Router::new()
        .route("/", get(move || async move { Html(index) }))
        .route("/debug/{name}", get(remote_debug_page))
        .route(
            "/api/debug/default_script",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                let project = query.get("project").cloned().unwrap_or_default();
                let start_url = query.get("start-url").cloned().unwrap_or_default();
                Json(json!({"script": format!("# {project} from {start_url}")}))
            }),
        )
        .route(
            "/api/projects/{name}",
            post(|| async { Json(json!({"ok": true})) })
                .delete(|| async { Json(json!({"ok": true})) }),
        )
        .route(
            "/debug/debugger/start",
            post(|| async { Json(json!({"ok": true})) }),
        )
        .route(
            "/debug/debugger/stop",
            post(|| async { Json(json!({"stopped": true})) }),
        )
        .route(
            "/debug/debugger/step_into",
            post(|| async { Json(json!({"frame": {"line": 12}})) }),
        )
        .route(
            "/debug/debugger/step_over",
            post(|| async { Json(json!({"frame": {"line": 13}})) }),
        )
        .route(
            "/debug/debugger/continue",
            post(|| async { Json(json!({"resumed": true})) }),
        )
        .route(
            "/debug/profiler/cpu/start",
            post(|| async { Json(json!({"started": true})) }),
        )
        .route(
            "/debug/profiler/cpu/stop",
            post(|| async { Json(json!({"samples": 3})) }),
        )
        .route(
            "/debug/inspector/resend",
            post(|| async {
                Json(json!({
                    "data": {"response": {"statusCode": 202, "headers": {}, "body": "accepted"}}
                }))
            }),
        );
    format!("http://{}", serve(app).await)
}

async fn spawn_crawler() -> String {
    spawn_crawler_with_index(INDEX_WITH_PROJECTS).await
}

async fn seed_requests(store: &Store, requests: Vec<InspectorRequest>) {
    store
        .call(move |conn| {
            let repo = SqliteInspectorRepository::new(conn);
            for request in &requests {
                repo.create_request(request)?;
            }
            Ok(())
        })
        .await
        .unwrap();
}

async fn create_project(server: &TestServer, name: &str) -> String {
    let response = server
        .post("/api/projects")
        .json(&json!({"name": name, "description": "crawl"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Value>()["id"].as_str().unwrap().to_string()
}

async fn create_task(server: &TestServer, project_id: &str, name: &str) -> String {
    let response = server
        .post("/api/tasks")
        .json(&json!({"name": name, "projectId": project_id}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Value>()["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn project_lifecycle_round_trips_through_http() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);
    let id = create_project(&server, "news").await;

    let listed = server.get("/api/projects").await.json::<Value>();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let project = server.get(&format!("/api/projects/{id}")).await.json::<Value>();
    assert_eq!(project["name"], "news");
    assert_eq!(project["_count"]["tasks"], 0);

    let updated = server
        .put(&format!("/api/projects/{id}"))
        .json(&json!({"description": "daily crawl"}))
        .await;
    assert_eq!(updated.status_code(), StatusCode::OK);
    assert_eq!(updated.json::<Value>()["description"], "daily crawl");

    let deleted = server.delete(&format!("/api/projects/{id}")).await;
    assert_eq!(deleted.json::<Value>(), json!({"success": true}));

    let missing = server.get(&format!("/api/projects/{id}")).await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<Value>()["error"], "Project not found");
}

#[tokio::test]
async fn project_without_name_is_rejected() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);
    let response = server.post("/api/projects").json(&json!({"name": " "})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "Project name is required");
}

#[tokio::test]
async fn task_status_and_progress_updates() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);
    let project_id = create_project(&server, "shop").await;
    let task_id = create_task(&server, &project_id, "list pages").await;

    let running = server
        .put(&format!("/api/tasks/{task_id}/status"))
        .json(&json!({"status": "RUNNING"}))
        .await
        .json::<Value>();
    assert_eq!(running["status"], "RUNNING");
    assert!(running["startedAt"].is_i64());

    let invalid = server
        .put(&format!("/api/tasks/{task_id}/status"))
        .json(&json!({"status": "SLEEPING"}))
        .await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(invalid.json::<Value>()["error"], "Invalid status");

    let not_a_number = server
        .put(&format!("/api/progress/{task_id}"))
        .json(&json!({"progress": "half"}))
        .await;
    assert_eq!(not_a_number.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        not_a_number.json::<Value>()["error"],
        "Progress must be a number between 0 and 100"
    );

    let out_of_range = server
        .put(&format!("/api/progress/{task_id}"))
        .json(&json!({"progress": 140}))
        .await;
    assert_eq!(out_of_range.status_code(), StatusCode::BAD_REQUEST);

    let done = server
        .put(&format!("/api/progress/{task_id}"))
        .json(&json!({"progress": 100}))
        .await
        .json::<Value>();
    assert_eq!(done["status"], "COMPLETED");
    assert!(done["completedAt"].is_i64());

    let progress = server
        .get(&format!("/api/progress/{task_id}"))
        .await
        .json::<Value>();
    assert_eq!(progress["progress"], 100.0);
}

#[tokio::test]
async fn task_logs_are_written_and_filtered() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);
    let project_id = create_project(&server, "blog").await;
    let task_id = create_task(&server, &project_id, "fetch").await;

    let created = server
        .post(&format!("/api/tasks/{task_id}/logs"))
        .json(&json!({"message": "page failed", "level": "ERROR"}))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    assert_eq!(created.json::<Value>()["level"], "ERROR");

    let empty = server
        .post(&format!("/api/tasks/{task_id}/logs"))
        .json(&json!({"message": ""}))
        .await;
    assert_eq!(empty.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(empty.json::<Value>()["error"], "Log message is required");

    let bad_level = server
        .post(&format!("/api/tasks/{task_id}/logs"))
        .json(&json!({"message": "x", "level": "LOUD"}))
        .await;
    assert_eq!(bad_level.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(bad_level.json::<Value>()["error"], "Invalid log level");

    server
        .put(&format!("/api/tasks/{task_id}/status"))
        .json(&json!({"status": "RUNNING"}))
        .await;

    let errors = server
        .get(&format!("/api/tasks/{task_id}/logs"))
        .add_query_param("level", "ERROR")
        .await
        .json::<Value>();
    assert_eq!(errors["logs"].as_array().unwrap().len(), 1);
    assert_eq!(errors["logs"][0]["message"], "page failed");
    assert_eq!(errors["pagination"]["total"], 1);

    let all = server
        .get(&format!("/api/tasks/{task_id}/logs"))
        .await
        .json::<Value>();
    assert_eq!(all["pagination"]["total"], 2);
}

#[tokio::test]
async fn schedule_run_starts_attached_tasks() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);
    let project_id = create_project(&server, "feeds").await;

    let bad_cron = server
        .post("/api/schedules")
        .json(&json!({"name": "hourly", "cron": "every hour", "projectId": project_id}))
        .await;
    assert_eq!(bad_cron.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(bad_cron.json::<Value>()["error"], "Invalid cron expression");

    let created = server
        .post("/api/schedules")
        .json(&json!({"name": "hourly", "cron": "0 * * * *", "projectId": project_id}))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let schedule = created.json::<Value>();
    let schedule_id = schedule["id"].as_str().unwrap().to_string();
    assert!(schedule["nextRun"].is_i64());

    let task = server
        .post("/api/tasks")
        .json(&json!({"name": "fetch", "projectId": project_id, "scheduleId": schedule_id}))
        .await
        .json::<Value>();

    let run = server
        .post(&format!("/api/schedules/{schedule_id}/run"))
        .await
        .json::<Value>();
    assert_eq!(run["success"], true);
    assert_eq!(run["message"], "Started 1 tasks");
    assert_eq!(run["tasks"][0]["id"], task["id"]);
    assert_eq!(run["tasks"][0]["status"], "RUNNING");

    let paused = server
        .put(&format!("/api/schedules/{schedule_id}/deactivate"))
        .await
        .json::<Value>();
    assert_eq!(paused["active"], false);

    let detail = server
        .get(&format!("/api/schedules/{schedule_id}"))
        .await
        .json::<Value>();
    assert_eq!(detail["project"]["name"], "feeds");
    assert!(detail["lastRun"].is_i64());
}

#[tokio::test]
async fn unknown_schedule_is_not_found() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);
    let response = server.post("/api/schedules/nope/run").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"], "Schedule not found");
}

#[tokio::test]
async fn debug_projects_fall_back_when_crawler_is_offline() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);

    let created = server
        .post("/api/debug/projects")
        .json(&json!({"name": "demo", "startUrl": "http://books.test/"}))
        .await;
    assert_eq!(created.status_code(), StatusCode::OK);
    let project = created.json::<Value>();
    assert_eq!(project["name"], "demo");
    assert!(project["script"]
        .as_str()
        .unwrap()
        .contains("http://books.test/"));

    let duplicate = server
        .post("/api/debug/projects")
        .json(&json!({"name": "demo"}))
        .await;
    assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
    assert_eq!(duplicate.json::<Value>()["error"], "Project name already exists");

    let fetched = server.get("/api/debug/projects/demo").await.json::<Value>();
    assert_eq!(fetched["script"], project["script"]);
    assert_eq!(fetched["task"]["project"], "demo");

    let run = server
        .post("/api/debug/projects/demo/run")
        .json(&json!({"script": "print(1)", "task": {"url": "http://books.test/page"}}))
        .await;
    assert_eq!(run.status_code(), StatusCode::OK);
    let result = run.json::<Value>();
    assert_eq!(result["fetch_result"]["url"], "http://books.test/page");
    assert_eq!(result["follows"], json!([]));

    let no_task = server
        .post("/api/debug/projects/demo/run")
        .json(&json!({"script": "print(1)"}))
        .await;
    assert_eq!(no_task.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(no_task.json::<Value>()["error"], "Task is required");
}

#[tokio::test]
async fn debugger_session_follows_crawler_replies() {
    let crawler = spawn_crawler().await;
    let (server, _) = dashboard(&crawler);

    let idle = server.get("/api/debug/debugger/status").await.json::<Value>();
    assert_eq!(idle["status"], "STOPPED");
    assert_eq!(idle["message"], "No debugger session found");

    let started = server.post("/api/debug/debugger/start").await.json::<Value>();
    assert_eq!(started["success"], true);
    assert_eq!(started["data"], json!({"ok": true}));
    let session_id = started["sessionId"].clone();

    let again = server.post("/api/debug/debugger/start").await.json::<Value>();
    assert_eq!(again["success"], false);
    assert_eq!(again["message"], "A debugger session is already running");
    assert_eq!(again["sessionId"], session_id);

    let status = server.get("/api/debug/debugger/status").await.json::<Value>();
    assert_eq!(status["status"], "RUNNING");

    let step = server.post("/api/debug/debugger/step_over").await;
    assert_eq!(step.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        step.json::<Value>()["message"],
        "No paused debugger session found"
    );

    let stopped = server.post("/api/debug/debugger/stop").await.json::<Value>();
    assert_eq!(stopped["success"], true);
    assert_eq!(stopped["sessionId"], session_id);

    let status = server.get("/api/debug/debugger/status").await.json::<Value>();
    assert_eq!(status["status"], "STOPPED");
    assert_eq!(status["data"]["stopResult"], json!({"stopped": true}));

    let nothing = server.post("/api/debug/debugger/stop").await.json::<Value>();
    assert_eq!(nothing["message"], "No active debugger session found");
}

#[tokio::test]
async fn failed_debugger_start_leaves_session_stopped() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);

    let response = server.post("/api/debug/debugger/start").await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json::<Value>();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Failed to start debugger");
    assert!(body["details"].is_string());

    let status = server.get("/api/debug/debugger/status").await.json::<Value>();
    assert_eq!(status["status"], "STOPPED");
    assert!(status["data"]["error"].is_string());
}

#[tokio::test]
async fn cpu_profiling_round_trip() {
    let crawler = spawn_crawler().await;
    let (server, _) = dashboard(&crawler);

    let idle = server.post("/api/debug/profiler/cpu/stop").await.json::<Value>();
    assert_eq!(idle["message"], "No active CPU profiling session found");

    let started = server.post("/api/debug/profiler/cpu/start").await.json::<Value>();
    assert_eq!(started["success"], true);
    assert_eq!(started["message"], "CPU profiling started successfully");

    let again = server.post("/api/debug/profiler/cpu/start").await.json::<Value>();
    assert_eq!(again["message"], "A CPU profiling session is already running");

    let stopped = server.post("/api/debug/profiler/cpu/stop").await.json::<Value>();
    assert_eq!(stopped["success"], true);
    assert_eq!(stopped["sessionId"], started["sessionId"]);
    assert_eq!(stopped["results"], json!({"samples": 3}));
}

fn captured_request(id: &str, url: &str, method: &str) -> InspectorRequest {
    InspectorRequest {
        id: id.to_string(),
        url: url.to_string(),
        method: method.to_string(),
        headers: Some(json!({"accept": "*/*"})),
        body: None,
        timestamp: now_ms(),
        debug_session_id: None,
    }
}

#[tokio::test]
async fn inspector_lists_filters_and_deletes_requests() {
    let (server, store) = dashboard(UNREACHABLE_CRAWLER);
    seed_requests(
        &store,
        vec![
            captured_request("r1", "http://a.test/list", "GET"),
            captured_request("r2", "http://b.test/form", "POST"),
        ],
    )
    .await;

    let posts = server
        .get("/api/debug/inspector/requests")
        .add_query_param("method", "POST")
        .await
        .json::<Value>();
    assert_eq!(posts["requests"].as_array().unwrap().len(), 1);
    assert_eq!(posts["requests"][0]["id"], "r2");
    assert_eq!(posts["pagination"]["total"], 1);

    let detail = server.get("/api/debug/inspector/request/r1").await;
    assert_eq!(detail.status_code(), StatusCode::OK);
    assert_eq!(detail.json::<Value>()["url"], "http://a.test/list");

    let deleted = server.delete("/api/debug/inspector/request/r1").await;
    assert_eq!(deleted.json::<Value>(), json!({"success": true}));

    let missing = server.get("/api/debug/inspector/request/r1").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<Value>()["error"], "Request not found");
}

#[tokio::test]
async fn inspector_resend_records_new_request_and_response() {
    let crawler = spawn_crawler().await;
    let (server, store) = dashboard(&crawler);
    seed_requests(&store, vec![captured_request("r1", "http://a.test/list", "GET")]).await;

    let missing = server
        .post("/api/debug/inspector/request/ghost/resend")
        .json(&json!({}))
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

    let resent = server
        .post("/api/debug/inspector/request/r1/resend")
        .json(&json!({"modifications": {"method": "HEAD"}}))
        .await
        .json::<Value>();
    assert_eq!(resent["success"], true);
    assert_eq!(resent["message"], "Request resent successfully");
    let new_id = resent["requestId"].as_str().unwrap().to_string();
    assert_ne!(new_id, "r1");

    let responses = server
        .get("/api/debug/inspector/responses")
        .add_query_param("statusCode", "202")
        .await
        .json::<Value>();
    assert_eq!(responses["responses"].as_array().unwrap().len(), 1);

    let heads = server
        .get("/api/debug/inspector/requests")
        .add_query_param("method", "HEAD")
        .await
        .json::<Value>();
    assert_eq!(heads["requests"][0]["id"], new_id.as_str());
    assert_eq!(heads["requests"][0]["response"]["statusCode"], 202);
}

#[tokio::test]
async fn inspector_resend_reports_unreachable_crawler() {
    let (server, store) = dashboard(UNREACHABLE_CRAWLER);
    seed_requests(&store, vec![captured_request("r1", "http://a.test/list", "GET")]).await;

    let response = server
        .post("/api/debug/inspector/request/r1/resend")
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body = response.json::<Value>();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Failed to resend request");
}

#[tokio::test]
async fn crawler_status_reports_offline_crawler() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);
    let status = server.get("/api/pyspider-status").await.json::<Value>();
    assert_eq!(status["status"], "offline");
    assert_eq!(status["url"], UNREACHABLE_CRAWLER);
}

#[tokio::test]
async fn socket_status_is_reported() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);
    let response = server.get("/api/socket").await.json::<Value>();
    assert_eq!(
        response,
        json!({"success": true, "message": "Socket server is running"})
    );
}

#[tokio::test]
async fn malformed_json_bodies_answer_with_error_objects() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);

    let bad_status = server
        .post("/api/projects")
        .json(&json!({"name": "x", "status": "BOGUS"}))
        .await;
    assert_eq!(bad_status.status_code(), StatusCode::BAD_REQUEST);
    let error = bad_status.json::<Value>()["error"].as_str().unwrap().to_string();
    assert!(error.contains("unknown variant"), "{error}");

    let broken = server
        .post("/api/tasks")
        .bytes("{not json".into())
        .content_type("application/json")
        .await;
    assert_eq!(broken.status_code(), StatusCode::BAD_REQUEST);
    assert!(broken.json::<Value>()["error"].is_string());

    let plain_text = server.put("/api/schedules/any").text("active").await;
    assert_eq!(plain_text.status_code(), StatusCode::BAD_REQUEST);
    assert!(plain_text.json::<Value>()["error"].is_string());

    let debug_run = server
        .post("/api/debug/projects/demo/run")
        .json(&json!({"script": 5}))
        .await;
    assert_eq!(debug_run.status_code(), StatusCode::BAD_REQUEST);
    assert!(debug_run.json::<Value>()["error"].is_string());
}

#[tokio::test]
async fn crawler_projects_come_from_embedded_json() {
    let crawler = spawn_crawler_with_index(INDEX_WITH_PROJECTS).await;
    let (server, _) = dashboard(&crawler);

    let listed = server.get("/api/pyspider/projects").await.json::<Value>();
    assert_eq!(
        listed,
        json!({
            "source": "pyspider",
            "projects": [{"name": "news", "status": "RUNNING", "rate": 2}],
        })
    );

    let status = server.get("/api/pyspider-status").await.json::<Value>();
    assert_eq!(status["status"], "online");
    assert_eq!(status["statusCode"], 200);
}

#[tokio::test]
async fn crawler_projects_fall_back_to_table_rows() {
    let crawler = spawn_crawler_with_index(INDEX_WITH_TABLE).await;
    let (server, _) = dashboard(&crawler);

    let listed = server.get("/api/pyspider/projects").await.json::<Value>();
    assert_eq!(listed["source"], "html-parsing");
    let projects = listed["projects"].as_array().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["name"], "shop");
    assert_eq!(projects[0]["status"], "TODO");
    assert_eq!(projects[0]["group"], "retail & co");
    assert_eq!(projects[0]["rate"], 0.5);
    assert_eq!(projects[0]["burst"], 4.0);
}

#[tokio::test]
async fn crawler_projects_report_errors() {
    let (server, _) = dashboard(UNREACHABLE_CRAWLER);
    let listed = server.get("/api/pyspider/projects").await.json::<Value>();
    assert_eq!(listed["source"], "error");
    assert_eq!(listed["projects"], json!([]));
    assert!(listed["error"].is_string());
}

#[tokio::test]
async fn debug_project_uses_crawler_template() {
    let crawler = spawn_crawler().await;
    let (server, _) = dashboard(&crawler);

    let created = server
        .post("/api/debug/projects")
        .json(&json!({"name": "books", "startUrl": "http://books.test/"}))
        .await;
    assert_eq!(created.status_code(), StatusCode::OK);
    assert_eq!(
        created.json::<Value>()["script"],
        "# books from http://books.test/"
    );
}

#[tokio::test]
async fn debug_project_reads_through_online_crawler() {
    let crawler = spawn_crawler().await;
    let (server, store) = dashboard(&crawler);

    let passthrough = server.get("/api/debug/projects/jsonproj").await.json::<Value>();
    assert_eq!(
        passthrough,
        json!({"name": "jsonproj", "script": "from_json()", "extra": 1})
    );

    let scraped = server.get("/api/debug/projects/remote").await.json::<Value>();
    assert_eq!(scraped["name"], "remote");
    assert_eq!(scraped["script"], "print(\"remote\")");
    assert_eq!(scraped["task"]["project"], "remote");

    let stored = store
        .debug(|service| service.find_project("remote"))
        .await
        .unwrap()
        .expect("scraped project stored locally");
    assert_eq!(stored.script, "print(\"remote\")");

    let edited = server
        .put("/api/debug/projects/remote/script")
        .json(&json!({"script": "print(\"local\")"}))
        .await;
    assert_eq!(edited.status_code(), StatusCode::OK);

    let cached = server.get("/api/debug/projects/remote").await.json::<Value>();
    assert_eq!(cached["script"], "print(\"local\")");
    assert!(cached["id"].is_string());

    let refreshed = server
        .get("/api/debug/projects/remote")
        .add_query_param("refresh", "true")
        .await
        .json::<Value>();
    assert_eq!(refreshed["script"], "print(\"remote\")");
    let stored = store
        .debug(|service| service.get_project("remote"))
        .await
        .unwrap();
    assert_eq!(stored.script, "print(\"remote\")");
}

async fn pause_running_debugger(store: &Store) {
    store
        .debug(|service| {
            let query = SessionQuery::new(DebugSessionType::Debugger)
                .with_statuses(&[DebugSessionStatus::Running]);
            let mut session = service
                .latest_session(&query)?
                .ok_or_else(|| ServiceError::not_found("no running debugger"))?;
            session.status = DebugSessionStatus::Paused;
            service.save_session(&session)
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn stepping_requires_a_paused_session() {
    let crawler = spawn_crawler().await;
    let (server, store) = dashboard(&crawler);
    server.post("/api/debug/debugger/start").await;

    for path in [
        "/api/debug/debugger/step_into",
        "/api/debug/debugger/step_over",
        "/api/debug/debugger/continue",
    ] {
        let response = server.post(path).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(
            response.json::<Value>(),
            json!({"success": false, "message": "No paused debugger session found"})
        );
    }

    pause_running_debugger(&store).await;

    let into = server.post("/api/debug/debugger/step_into").await.json::<Value>();
    assert_eq!(
        into,
        json!({
            "success": true,
            "message": "Step into executed successfully",
            "frame": {"line": 12},
        })
    );
    let over = server.post("/api/debug/debugger/step_over").await.json::<Value>();
    assert_eq!(over["frame"], json!({"line": 13}));

    let status = server.get("/api/debug/debugger/status").await.json::<Value>();
    assert_eq!(status["status"], "PAUSED");
    assert_eq!(status["data"]["currentFrame"], json!({"line": 13}));
    assert_eq!(status["data"]["lastAction"], "step_over");

    let resumed = server.post("/api/debug/debugger/continue").await.json::<Value>();
    assert_eq!(
        resumed,
        json!({"success": true, "message": "Execution continued successfully"})
    );
    let status = server.get("/api/debug/debugger/status").await.json::<Value>();
    assert_eq!(status["status"], "RUNNING");

    let again = server.post("/api/debug/debugger/continue").await;
    assert_eq!(again.status_code(), StatusCode::BAD_REQUEST);
}

async fn next_text<S>(socket: &mut S) -> String
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("frame within two seconds")
            .expect("socket open")
            .unwrap();
        if let Message::Text(text) = message {
            return text.as_str().to_string();
        }
    }
}

#[tokio::test]
async fn websocket_answers_ping_with_pong() {
    let store = Store::in_memory().unwrap();
    let state = AppState::new(store, PySpiderClient::new(UNREACHABLE_CRAWLER));
    let addr = serve(router(state)).await;
    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    socket.send(Message::Text("ping".into())).await.unwrap();
    let pong: Value = serde_json::from_str(&next_text(&mut socket).await).unwrap();
    assert_eq!(pong["event"], "pong");
    assert!(pong["data"]["timestamp"].is_i64());

    socket
        .send(Message::Text(r#"{"event":"subscribe"}"#.into()))
        .await
        .unwrap();
    socket
        .send(Message::Text(r#"{"event":"ping"}"#.into()))
        .await
        .unwrap();
    let pong: Value = serde_json::from_str(&next_text(&mut socket).await).unwrap();
    assert_eq!(pong["event"], "pong");
}
