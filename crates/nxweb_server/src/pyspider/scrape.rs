//! Extraction of project data from crawler HTML pages.
//!
//! The crawler UI has no stable JSON API for these pages. Embedded script
//! literals are matched with fixed patterns; the project table is read through
//! CSS selectors. Any mismatch yields an empty result.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::Value;

static PROJECTS_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)window\.projects\s*=\s*(\[.*?\]);").expect("valid projects regex")
});
static PROJECT_ROW: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table.projects tbody tr").expect("valid project row selector")
});
static STATUS_SPAN: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".project-status span").expect("valid status selector"));
static GROUP_SPAN: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".project-group span").expect("valid group selector"));
static RATE_SPAN: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".project-rate span").expect("valid rate selector"));
static SCRIPT_CONTENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)var script_content = "(.+?)";"#).expect("valid script_content regex")
});
static SCRIPT_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<script id="script" type="text/plain">([\s\S]*?)</script>"#)
        .expect("valid script tag regex")
});

pub const DEFAULT_RATE: f64 = 1.0;
pub const DEFAULT_BURST: f64 = 3.0;

/// One row of the crawler's project table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRow {
    pub name: String,
    pub status: String,
    pub group: Option<String>,
    pub rate: f64,
    pub burst: f64,
    /// Seconds since the Unix epoch.
    pub updatetime: f64,
}

/// Parses the `window.projects = [...]` literal embedded in the index page.
pub fn projects_json(html: &str) -> Option<Value> {
    let literal = PROJECTS_JSON_RE.captures(html)?.get(1)?.as_str();
    serde_json::from_str::<Value>(literal)
        .ok()
        .filter(Value::is_array)
}

/// Reads `<tr data-name>` rows from the projects table body.
///
/// Cell text is taken from the document tree, so entities arrive decoded.
pub fn project_rows(html: &str, now_secs: f64) -> Vec<ProjectRow> {
    let document = Html::parse_document(html);
    document
        .select(&PROJECT_ROW)
        .filter_map(|row| {
            let name = row.value().attr("data-name")?.trim();
            if name.is_empty() {
                return None;
            }
            let group = span_text(row, &GROUP_SPAN);
            let (rate, burst) = parse_rate(&span_text(row, &RATE_SPAN));
            Some(ProjectRow {
                name: name.to_string(),
                status: span_text(row, &STATUS_SPAN),
                group: Some(group).filter(|value| !value.is_empty()),
                rate,
                burst,
                updatetime: now_secs,
            })
        })
        .collect()
}

/// Extracts the project script from the crawler's debug page.
///
/// Prefers the `script_content` JS string; falls back to the plain-text
/// script tag. Returns an empty string when neither is present.
pub fn debug_script(html: &str) -> String {
    if let Some(raw) = SCRIPT_CONTENT_RE
        .captures(html)
        .and_then(|captures| captures.get(1))
    {
        let raw = raw.as_str();
        return serde_json::from_str::<String>(&format!("\"{raw}\""))
            .unwrap_or_else(|_| simple_unescape(raw));
    }
    SCRIPT_TAG_RE
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|script| script.as_str().to_string())
        .unwrap_or_default()
}

fn simple_unescape(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
}

/// Concatenated text of every span under `row` matching `spans`.
fn span_text(row: ElementRef<'_>, spans: &Selector) -> String {
    let text: String = row.select(spans).flat_map(|span| span.text()).collect();
    text.trim().to_string()
}

/// `"rate/burst"` text; unparsable or zero parts fall back to the defaults.
fn parse_rate(text: &str) -> (f64, f64) {
    let mut parts = text.split('/');
    let parse = |part: Option<&str>, default: f64| {
        part.and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| *value != 0.0 && value.is_finite())
            .unwrap_or(default)
    };
    let rate = parse(parts.next(), DEFAULT_RATE);
    let burst = parse(parts.next(), DEFAULT_BURST);
    (rate, burst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const INDEX_HTML: &str = r#"
<html><body>
<table class="table projects">
  <thead><tr><th>name</th></tr></thead>
  <tbody>
    <tr data-name="news">
      <td class="project-group"><span>media</span></td>
      <td class="project-status"><span class="label">RUNNING</span></td>
      <td class="project-rate"><span>0.5/6</span></td>
    </tr>
    <tr data-name="shop">
      <td class="project-group"><span></span></td>
      <td class="project-status"><span>TODO</span></td>
      <td class="project-rate"><span>n/a</span></td>
    </tr>
  </tbody>
</table>
</body></html>"#;

    #[test]
    fn projects_literal_is_preferred() {
        let html = r#"<script>window.projects = [{"name": "news", "status": "RUNNING"}];</script>"#;
        assert_eq!(
            projects_json(html),
            Some(json!([{"name": "news", "status": "RUNNING"}]))
        );
        assert_eq!(projects_json("<script>window.projects = [oops];</script>"), None);
    }

    #[test]
    fn table_rows_fill_defaults() {
        let rows = project_rows(INDEX_HTML, 42.0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "news");
        assert_eq!(rows[0].status, "RUNNING");
        assert_eq!(rows[0].group.as_deref(), Some("media"));
        assert_eq!((rows[0].rate, rows[0].burst), (0.5, 6.0));
        assert_eq!(rows[1].group, None);
        assert_eq!((rows[1].rate, rows[1].burst), (DEFAULT_RATE, DEFAULT_BURST));
        assert_eq!(rows[1].updatetime, 42.0);
    }

    #[test]
    fn table_cells_decode_entities() {
        let html = r#"<table class="projects"><tbody>
            <tr data-name="q&amp;a">
              <td class="project-group"><span>news &amp; media</span></td>
              <td class="project-status"><span>RUNNING&nbsp;</span></td>
              <td class="project-rate"><span>2&#47;4</span></td>
            </tr>
        </tbody></table>"#;
        let rows = project_rows(html, 0.0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "q&a");
        assert_eq!(rows[0].group.as_deref(), Some("news & media"));
        assert_eq!((rows[0].rate, rows[0].burst), (2.0, 4.0));
    }

    #[test]
    fn script_content_is_json_unescaped() {
        let html = r#"<script>var script_content = "print(\"hi\")\nx = 1";</script>"#;
        assert_eq!(debug_script(html), "print(\"hi\")\nx = 1");
    }

    #[test]
    fn script_tag_is_the_fallback() {
        let html = "<script id=\"script\" type=\"text/plain\">def on_start(self):\n    pass</script>";
        assert_eq!(debug_script(html), "def on_start(self):\n    pass");
        assert_eq!(debug_script("<html></html>"), "");
    }
}
