//! Captured inspector traffic: requests and their responses.
//!
//! # Invariants
//! - Listings are newest first by `timestamp`.
//! - Deleting a request removes its response.

use super::debug_repo::parse_session_row;
use super::{json_to_db, parse_json_column, PageRequest, RepoError, RepoResult};
use crate::model::debug::{
    InspectorRequest, InspectorRequestDetail, InspectorRequestItem, InspectorResponse,
    InspectorResponseItem, RequestSummary, ResponseSummary, SessionSummary,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const REQUEST_COLUMNS: &str =
    "r.id, r.url, r.method, r.headers, r.body, r.timestamp, r.debug_session_id";
const RESPONSE_COLUMNS: &str = "s.id, s.status_code, s.headers, s.body, s.timestamp, s.request_id, s.debug_session_id";

#[derive(Debug, Clone, Default)]
pub struct RequestQuery {
    /// Substring match on the request URL.
    pub url: Option<String>,
    pub method: Option<String>,
    pub session_id: Option<String>,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseQuery {
    pub status_code: Option<i64>,
    pub session_id: Option<String>,
    pub page: PageRequest,
}

pub trait InspectorRepository {
    fn create_request(&self, request: &InspectorRequest) -> RepoResult<()>;
    fn create_response(&self, response: &InspectorResponse) -> RepoResult<()>;
    fn get_request(&self, id: &str) -> RepoResult<Option<InspectorRequest>>;
    fn get_request_detail(&self, id: &str) -> RepoResult<Option<InspectorRequestDetail>>;
    fn list_requests(&self, query: &RequestQuery) -> RepoResult<(Vec<InspectorRequestItem>, u64)>;
    fn list_responses(
        &self,
        query: &ResponseQuery,
    ) -> RepoResult<(Vec<InspectorResponseItem>, u64)>;
    fn delete_request(&self, id: &str) -> RepoResult<()>;
}

pub struct SqliteInspectorRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteInspectorRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn count(&self, sql: &str, bind_values: &[Value]) -> RepoResult<u64> {
        let total: i64 = self
            .conn
            .query_row(sql, params_from_iter(bind_values.iter()), |row| row.get(0))?;
        Ok(super::count_to_u64(total))
    }
}

impl InspectorRepository for SqliteInspectorRepository<'_> {
    fn create_request(&self, request: &InspectorRequest) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO inspector_requests (id, url, method, headers, body, timestamp, debug_session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                request.id,
                request.url,
                request.method,
                request.headers.as_ref().map(json_to_db),
                request.body,
                request.timestamp,
                request.debug_session_id,
            ],
        )?;
        Ok(())
    }

    fn create_response(&self, response: &InspectorResponse) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO inspector_responses (
                id, status_code, headers, body, timestamp, request_id, debug_session_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                response.id,
                response.status_code,
                response.headers.as_ref().map(json_to_db),
                response.body,
                response.timestamp,
                response.request_id,
                response.debug_session_id,
            ],
        )?;
        Ok(())
    }

    fn get_request(&self, id: &str) -> RepoResult<Option<InspectorRequest>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM inspector_requests r WHERE r.id = ?1;"
        ))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_request_row(row)?));
        }
        Ok(None)
    }

    fn get_request_detail(&self, id: &str) -> RepoResult<Option<InspectorRequestDetail>> {
        let Some(request) = self.get_request(id)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM inspector_responses s WHERE s.request_id = ?1;"
        ))?;
        let mut rows = stmt.query([id])?;
        let response = match rows.next()? {
            Some(row) => Some(parse_response_row(row)?),
            None => None,
        };

        let debug_session = match request.debug_session_id.as_deref() {
            Some(session_id) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, type, status, started_at, ended_at, data, project_id
                     FROM debug_sessions WHERE id = ?1;",
                )?;
                let mut rows = stmt.query([session_id])?;
                match rows.next()? {
                    Some(row) => {
                        let session = parse_session_row(row)?;
                        Some(SessionSummary {
                            id: session.id,
                            kind: session.kind,
                            status: session.status,
                            started_at: session.started_at,
                        })
                    }
                    None => None,
                }
            }
            None => None,
        };

        Ok(Some(InspectorRequestDetail {
            request,
            response,
            debug_session,
        }))
    }

    fn list_requests(&self, query: &RequestQuery) -> RepoResult<(Vec<InspectorRequestItem>, u64)> {
        let mut filter = String::from(" WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(url) = query.url.as_deref().filter(|value| !value.is_empty()) {
            filter.push_str(" AND instr(r.url, ?) > 0");
            bind_values.push(Value::Text(url.to_string()));
        }
        if let Some(method) = query.method.as_deref().filter(|value| !value.is_empty()) {
            filter.push_str(" AND r.method = ?");
            bind_values.push(Value::Text(method.to_string()));
        }
        if let Some(session_id) = query.session_id.as_deref().filter(|value| !value.is_empty()) {
            filter.push_str(" AND r.debug_session_id = ?");
            bind_values.push(Value::Text(session_id.to_string()));
        }

        let total = self.count(
            &format!("SELECT COUNT(*) FROM inspector_requests r{filter};"),
            &bind_values,
        )?;

        bind_values.push(Value::Integer(i64::from(query.page.limit())));
        bind_values.push(Value::Integer(query.page.offset()));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS},
                s.status_code AS response_status_code,
                s.timestamp AS response_timestamp
             FROM inspector_requests r
             LEFT JOIN inspector_responses s ON s.request_id = r.id
             {filter}
             ORDER BY r.timestamp DESC, r.rowid DESC
             LIMIT ? OFFSET ?;"
        ))?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let response = match (
                row.get::<_, Option<i64>>("response_status_code")?,
                row.get::<_, Option<i64>>("response_timestamp")?,
            ) {
                (Some(status_code), Some(timestamp)) => Some(ResponseSummary {
                    status_code,
                    timestamp,
                }),
                _ => None,
            };
            items.push(InspectorRequestItem {
                request: parse_request_row(row)?,
                response,
            });
        }

        Ok((items, total))
    }

    fn list_responses(
        &self,
        query: &ResponseQuery,
    ) -> RepoResult<(Vec<InspectorResponseItem>, u64)> {
        let mut filter = String::from(" WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(status_code) = query.status_code {
            filter.push_str(" AND s.status_code = ?");
            bind_values.push(Value::Integer(status_code));
        }
        if let Some(session_id) = query.session_id.as_deref().filter(|value| !value.is_empty()) {
            filter.push_str(" AND s.debug_session_id = ?");
            bind_values.push(Value::Text(session_id.to_string()));
        }

        let total = self.count(
            &format!("SELECT COUNT(*) FROM inspector_responses s{filter};"),
            &bind_values,
        )?;

        bind_values.push(Value::Integer(i64::from(query.page.limit())));
        bind_values.push(Value::Integer(query.page.offset()));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESPONSE_COLUMNS},
                r.url AS request_url,
                r.method AS request_method,
                r.timestamp AS request_timestamp
             FROM inspector_responses s
             LEFT JOIN inspector_requests r ON r.id = s.request_id
             {filter}
             ORDER BY s.timestamp DESC, s.rowid DESC
             LIMIT ? OFFSET ?;"
        ))?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let request = match row.get::<_, Option<String>>("request_url")? {
                Some(url) => Some(RequestSummary {
                    url,
                    method: row.get("request_method")?,
                    timestamp: row.get("request_timestamp")?,
                }),
                None => None,
            };
            items.push(InspectorResponseItem {
                response: parse_response_row(row)?,
                request,
            });
        }

        Ok((items, total))
    }

    fn delete_request(&self, id: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM inspector_requests WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("request", id));
        }
        Ok(())
    }
}

fn parse_request_row(row: &Row<'_>) -> RepoResult<InspectorRequest> {
    Ok(InspectorRequest {
        id: row.get("id")?,
        url: row.get("url")?,
        method: row.get("method")?,
        headers: parse_json_column(row, "headers")?,
        body: row.get("body")?,
        timestamp: row.get("timestamp")?,
        debug_session_id: row.get("debug_session_id")?,
    })
}

fn parse_response_row(row: &Row<'_>) -> RepoResult<InspectorResponse> {
    Ok(InspectorResponse {
        id: row.get("id")?,
        status_code: row.get("status_code")?,
        headers: parse_json_column(row, "headers")?,
        body: row.get("body")?,
        timestamp: row.get("timestamp")?,
        request_id: row.get("request_id")?,
        debug_session_id: row.get("debug_session_id")?,
    })
}
