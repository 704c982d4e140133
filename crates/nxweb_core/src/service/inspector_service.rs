//! Inspector traffic use-cases: listing captured requests/responses and
//! recording resent requests.

use super::{ServiceError, ServiceResult};
use crate::db::now_ms;
use crate::model::debug::{
    InspectorRequest, InspectorRequestDetail, InspectorRequestItem, InspectorResponse,
    InspectorResponseItem,
};
use crate::model::new_id;
use crate::model::task::Pagination;
use crate::repo::inspector_repo::{InspectorRepository, RequestQuery, ResponseQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const REQUEST_NOT_FOUND: &str = "Request not found";

/// Overrides applied to a captured request before it is resent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestModifications {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<Value>,
    pub body: Option<String>,
}

/// Request as it will be resent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResendRequest {
    pub url: String,
    pub method: String,
    pub headers: Option<Value>,
    pub body: Option<String>,
}

/// Response part of a crawler resend reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResentResponse {
    pub status_code: i64,
    pub headers: Option<Value>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestPage {
    pub requests: Vec<InspectorRequestItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsePage {
    pub responses: Vec<InspectorResponseItem>,
    pub pagination: Pagination,
}

pub struct InspectorService<R: InspectorRepository> {
    repo: R,
}

impl<R: InspectorRepository> InspectorService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn list_requests(&self, query: &RequestQuery) -> ServiceResult<RequestPage> {
        let (requests, total) = self.repo.list_requests(query)?;
        Ok(RequestPage {
            requests,
            pagination: pagination(query.page, total),
        })
    }

    pub fn list_responses(&self, query: &ResponseQuery) -> ServiceResult<ResponsePage> {
        let (responses, total) = self.repo.list_responses(query)?;
        Ok(ResponsePage {
            responses,
            pagination: pagination(query.page, total),
        })
    }

    pub fn get_request(&self, id: &str) -> ServiceResult<InspectorRequestDetail> {
        self.repo
            .get_request_detail(id)?
            .ok_or_else(|| ServiceError::not_found(REQUEST_NOT_FOUND))
    }

    pub fn delete_request(&self, id: &str) -> ServiceResult<()> {
        Ok(self.repo.delete_request(id)?)
    }

    /// Builds the request to resend; non-empty modifications win.
    pub fn prepare_resend(
        &self,
        id: &str,
        modifications: &RequestModifications,
    ) -> ServiceResult<ResendRequest> {
        let original = self
            .repo
            .get_request(id)?
            .ok_or_else(|| ServiceError::not_found(REQUEST_NOT_FOUND))?;
        Ok(apply_modifications(original, modifications))
    }

    /// Stores the resent request and, when present, its response.
    pub fn record_resend(
        &self,
        session_id: &str,
        request: &ResendRequest,
        response: Option<ResentResponse>,
    ) -> ServiceResult<InspectorRequest> {
        let now = now_ms();
        let stored = InspectorRequest {
            id: new_id(),
            url: request.url.clone(),
            method: request.method.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timestamp: now,
            debug_session_id: Some(session_id.to_string()),
        };
        self.repo.create_request(&stored)?;

        if let Some(response) = response {
            self.repo.create_response(&InspectorResponse {
                id: new_id(),
                status_code: response.status_code,
                headers: response.headers,
                body: response.body,
                timestamp: now,
                request_id: stored.id.clone(),
                debug_session_id: Some(session_id.to_string()),
            })?;
        }
        Ok(stored)
    }
}

fn apply_modifications(original: InspectorRequest, modifications: &RequestModifications) -> ResendRequest {
    fn pick(value: &Option<String>, fallback: String) -> String {
        value.clone().filter(|text| !text.is_empty()).unwrap_or(fallback)
    }

    ResendRequest {
        url: pick(&modifications.url, original.url),
        method: pick(&modifications.method, original.method),
        headers: modifications
            .headers
            .clone()
            .filter(|headers| !headers.is_null())
            .or(original.headers),
        body: modifications
            .body
            .clone()
            .filter(|body| !body.is_empty())
            .or(original.body),
    }
}

fn pagination(page: crate::repo::PageRequest, total: u64) -> Pagination {
    Pagination {
        page: page.page(),
        limit: page.limit(),
        total,
        total_pages: page.total_pages(total),
    }
}
