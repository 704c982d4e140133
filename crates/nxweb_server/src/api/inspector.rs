use super::{deleted, parse_int, PageQuery};
use crate::error::{ActionFailure, ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{info, warn};
use nxweb_core::model::debug::{DebugSessionStatus, DebugSessionType, InspectorRequestDetail};
use nxweb_core::repo::debug_repo::SessionQuery;
use nxweb_core::repo::inspector_repo::{RequestQuery, ResponseQuery};
use nxweb_core::service::inspector_service::{
    RequestModifications, RequestPage, ResentResponse, ResponsePage,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RequestsQuery {
    url: Option<String>,
    method: Option<String>,
    session_id: Option<String>,
    #[serde(flatten)]
    page: PageQuery,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ResponsesQuery {
    status_code: Option<String>,
    session_id: Option<String>,
    #[serde(flatten)]
    page: PageQuery,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ResendBody {
    #[serde(default)]
    modifications: Option<RequestModifications>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.is_empty())
}

pub(super) async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestsQuery>,
) -> ApiResult<Json<RequestPage>> {
    let filter = RequestQuery {
        url: non_empty(query.url),
        method: non_empty(query.method),
        session_id: non_empty(query.session_id),
        page: query.page.page_request(),
    };
    let page = state
        .store
        .inspector(move |service| service.list_requests(&filter))
        .await?;
    Ok(Json(page))
}

pub(super) async fn list_responses(
    State(state): State<AppState>,
    Query(query): Query<ResponsesQuery>,
) -> ApiResult<Json<ResponsePage>> {
    let filter = ResponseQuery {
        status_code: parse_int(&query.status_code),
        session_id: non_empty(query.session_id),
        page: query.page.page_request(),
    };
    let page = state
        .store
        .inspector(move |service| service.list_responses(&filter))
        .await?;
    Ok(Json(page))
}

pub(super) async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<InspectorRequestDetail>> {
    let detail = state
        .store
        .inspector(move |service| service.get_request(&id))
        .await?;
    Ok(Json(detail))
}

pub(super) async fn delete_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .store
        .inspector(move |service| service.delete_request(&id))
        .await?;
    Ok(deleted())
}

/// Replays a captured request through the crawler inside an inspector session.
pub(super) async fn resend_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let modifications = resend_body(&body)?.modifications.unwrap_or_default();
    let request = {
        let id = id.clone();
        state
            .store
            .inspector(move |service| service.prepare_resend(&id, &modifications))
            .await?
    };

    let session = state
        .store
        .debug(|service| {
            let running = SessionQuery::new(DebugSessionType::Inspector)
                .with_statuses(&[DebugSessionStatus::Running]);
            match service.latest_session(&running)? {
                Some(session) => Ok(session),
                None => service.start_session(DebugSessionType::Inspector, Some(json!({}))),
            }
        })
        .await?;

    let payload = json!({
        "originalRequestId": id,
        "modifiedRequest": request,
        "sessionId": session.id,
    });
    let reply = match state.pyspider.debug_action("inspector/resend", &payload).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!("event=inspector_resend module=api status=error request_id={id} error={err}");
            return Ok(ActionFailure::upstream("Failed to resend request", err).into_response());
        }
    };

    let response = resent_response(&reply);
    let stored = state
        .store
        .inspector(move |service| service.record_resend(&session.id, &request, response))
        .await?;
    info!(
        "event=inspector_resend module=api status=ok request_id={id} new_request_id={}",
        stored.id
    );
    Ok(Json(json!({
        "success": true,
        "message": "Request resent successfully",
        "requestId": stored.id,
    }))
    .into_response())
}

/// Empty bodies mean "resend unchanged".
fn resend_body(body: &[u8]) -> ApiResult<ResendBody> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ResendBody::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("Invalid JSON body: {err}")))
}

/// Response carried at `data.response` of a resend reply, if well formed.
fn resent_response(reply: &Value) -> Option<ResentResponse> {
    let response = reply.pointer("/data/response")?;
    serde_json::from_value(response.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::{resend_body, resent_response};
    use serde_json::json;

    #[test]
    fn resent_response_reads_nested_payload() {
        let reply = json!({
            "data": {"response": {"statusCode": 201, "headers": {"x": "1"}, "body": "ok"}}
        });
        let response = resent_response(&reply).unwrap();
        assert_eq!(response.status_code, 201);
        assert_eq!(response.body.as_deref(), Some("ok"));
    }

    #[test]
    fn resend_body_may_be_empty() {
        assert!(resend_body(b"").unwrap().modifications.is_none());
        let body = resend_body(br#"{"modifications": {"url": "http://b.test"}}"#).unwrap();
        assert_eq!(
            body.modifications.unwrap().url.as_deref(),
            Some("http://b.test")
        );
        assert!(resend_body(b"{nope").is_err());
    }

    #[test]
    fn resent_response_is_optional() {
        assert!(resent_response(&json!({"data": {}})).is_none());
        assert!(resent_response(&json!(null)).is_none());
    }
}
