//! HTTP client for the external PySpider crawler.
//!
//! # Responsibility
//! - Proxy project, script and debug actions to the crawler web UI.
//! - Scrape the crawler HTML where it offers no JSON.
//!
//! # Invariants
//! - Non-2xx crawler replies are errors.
//! - No call is retried.

pub mod scrape;

use log::{info, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
const ALIVE_TIMEOUT: Duration = Duration::from_secs(2);
const RUN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PySpiderError {
    Timeout(String),
    Unreachable(String),
    Status { status: u16, url: String },
    Decode(String),
}

impl Display for PySpiderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(url) => write!(f, "PySpider request timed out: {url}"),
            Self::Unreachable(message) => write!(f, "PySpider is not reachable: {message}"),
            Self::Status { status, url } => {
                write!(f, "PySpider responded with status {status}: {url}")
            }
            Self::Decode(message) => write!(f, "PySpider response could not be decoded: {message}"),
        }
    }
}

impl Error for PySpiderError {}

impl From<reqwest::Error> for PySpiderError {
    fn from(value: reqwest::Error) -> Self {
        let url = value
            .url()
            .map(|url| url.to_string())
            .unwrap_or_default();
        if value.is_timeout() {
            Self::Timeout(url)
        } else if let Some(status) = value.status() {
            Self::Status {
                status: status.as_u16(),
                url,
            }
        } else if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Unreachable(value.to_string())
        }
    }
}

pub type PySpiderResult<T> = Result<T, PySpiderError>;

/// What `/debug/{name}` returned.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugPage {
    /// JSON reply, passed through untouched.
    Json(Value),
    /// HTML reply; the scraped script, possibly empty.
    Script(String),
}

#[derive(Debug, Clone)]
pub struct PySpiderClient {
    http: reqwest::Client,
    base_url: String,
}

impl PySpiderClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Reachability report; failures are part of the payload.
    pub async fn status(&self) -> Value {
        info!(
            "event=pyspider_status module=pyspider status=start url={}",
            self.base_url
        );
        let result = self
            .http
            .get(&self.base_url)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        match result {
            Ok(response) => {
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                json!({
                    "status": "online",
                    "url": self.base_url,
                    "statusCode": response.status().as_u16(),
                    "contentType": content_type,
                })
            }
            Err(err) => {
                let err = PySpiderError::from(err);
                warn!("event=pyspider_status module=pyspider status=offline error={err}");
                json!({
                    "status": "offline",
                    "error": err.to_string(),
                    "url": self.base_url,
                })
            }
        }
    }

    /// Crawler project list with its provenance in `source`.
    pub async fn projects(&self) -> Value {
        let html = match self.get_text(&self.base_url, STATUS_TIMEOUT).await {
            Ok(html) => html,
            Err(err) => {
                warn!("event=pyspider_projects module=pyspider status=error error={err}");
                return json!({
                    "source": "error",
                    "error": err.to_string(),
                    "projects": [],
                });
            }
        };

        if let Some(projects) = scrape::projects_json(&html) {
            info!(
                "event=pyspider_projects module=pyspider status=ok source=pyspider count={}",
                projects.as_array().map_or(0, Vec::len)
            );
            return json!({ "source": "pyspider", "projects": projects });
        }

        let rows = scrape::project_rows(&html, now_secs());
        info!(
            "event=pyspider_projects module=pyspider status=ok source=html-parsing count={}",
            rows.len()
        );
        json!({ "source": "html-parsing", "projects": rows })
    }

    pub async fn debug_page(&self, name: &str) -> PySpiderResult<DebugPage> {
        let response = self
            .http
            .get(self.url(&format!("/debug/{name}")))
            .header(ACCEPT, "application/json")
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("application/json"));

        if is_json {
            return Ok(DebugPage::Json(response.json::<Value>().await?));
        }
        let html = response.text().await?;
        Ok(DebugPage::Script(scrape::debug_script(&html)))
    }

    /// Handler template generated by the crawler.
    pub async fn default_script(&self, name: &str, start_url: &str) -> PySpiderResult<String> {
        let body: Value = self
            .http
            .get(self.url("/api/debug/default_script"))
            .query(&[("project", name), ("start-url", start_url)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        body.get("script")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PySpiderError::Decode("missing `script` field".to_string()))
    }

    pub async fn save_project(&self, name: &str, script: &str) -> PySpiderResult<()> {
        self.http
            .post(self.url(&format!("/api/projects/{name}")))
            .json(&json!({ "script": script }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn delete_project(&self, name: &str) -> PySpiderResult<()> {
        self.http
            .delete(self.url(&format!("/api/projects/{name}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn is_alive(&self) -> bool {
        self.get_text(&self.base_url, ALIVE_TIMEOUT).await.is_ok()
    }

    /// Runs `task` against `script`; the task travels as JSON text.
    pub async fn run_debug(&self, name: &str, script: &str, task: &Value) -> PySpiderResult<Value> {
        let body = json!({ "script": script, "task": task.to_string() });
        let reply = self
            .http
            .post(self.url(&format!("/debug/{name}/run")))
            .header(ACCEPT, "application/json")
            .json(&body)
            .timeout(RUN_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(reply)
    }

    /// POST `/debug/<path>` used by the debugger, profiler and inspector actions.
    pub async fn debug_action(&self, path: &str, body: &Value) -> PySpiderResult<Value> {
        info!("event=pyspider_action module=pyspider status=start action={path}");
        let response = self
            .http
            .post(self.url(&format!("/debug/{path}")))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| PySpiderError::Decode(err.to_string()))
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> PySpiderResult<String> {
        let text = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}
