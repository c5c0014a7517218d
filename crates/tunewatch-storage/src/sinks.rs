//! Destination stores for the finished report.
//!
//! Each sink maps a [`Report`] plus its [`DateRange`] onto the destination's
//! record schema and submits it through the tool proxy. Every call creates a
//! new record; nothing is updated in place.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::info;
use tunewatch_core::{DateRange, Report};

use crate::{execute_with_retry, json_str, BackoffPolicy, ProxyError, ToolExecutor, ToolRequest};

pub const NOTION_CREATE_PAGE: &str = "NOTION_CREATE_PAGE";
pub const SHEETS_VALUES_APPEND: &str = "GOOGLESHEETS_SPREADSHEETS_VALUES_APPEND";

pub const PROP_TITLE: &str = "Report Title";
pub const PROP_DATE: &str = "Report Date";
pub const PROP_WEEK: &str = "Week";
pub const PROP_TWITTER_MAX: &str = "Twitter Max Engagement";
pub const PROP_REDDIT_MAX: &str = "Reddit Max Engagement";
pub const PROP_STATUS: &str = "Status";
pub const STATUS_COMPLETED: &str = "Completed";

/// Notion rejects rich-text objects longer than this many characters.
const NOTION_TEXT_LIMIT: usize = 2000;

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRecord {
    pub destination: &'static str,
    pub record_id: Option<String>,
    pub response: JsonValue,
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    fn destination(&self) -> &'static str;

    async fn persist(
        &self,
        report: &Report,
        range: &DateRange,
    ) -> Result<PersistedRecord, ProxyError>;
}

pub fn notion_page_request(database_id: &str, report: &Report, range: &DateRange) -> ToolRequest {
    let body_segments: Vec<JsonValue> = chunk_chars(&report.text_content, NOTION_TEXT_LIMIT)
        .into_iter()
        .map(|chunk| json!({ "type": "text", "text": { "content": chunk } }))
        .collect();

    ToolRequest::new(
        NOTION_CREATE_PAGE,
        json!({
            "parent": { "database_id": database_id },
            "properties": {
                PROP_TITLE: {
                    "title": [{ "text": { "content": range.report_title() } }]
                },
                PROP_DATE: {
                    "date": { "start": range.run_date.format("%Y-%m-%d").to_string() }
                },
                PROP_WEEK: {
                    "rich_text": [{ "text": { "content": range.week_label() } }]
                },
                PROP_TWITTER_MAX: { "number": report.max_score_twitter },
                PROP_REDDIT_MAX: { "number": report.max_score_reddit },
                PROP_STATUS: { "select": { "name": STATUS_COMPLETED } }
            },
            "children": [{
                "object": "block",
                "type": "paragraph",
                "paragraph": { "rich_text": body_segments }
            }]
        }),
    )
}

pub fn sheets_append_request(
    spreadsheet_id: &str,
    sheet_range: &str,
    report: &Report,
    range: &DateRange,
) -> ToolRequest {
    ToolRequest::new(
        SHEETS_VALUES_APPEND,
        json!({
            "spreadsheetId": spreadsheet_id,
            "range": sheet_range,
            "valueInputOption": "USER_ENTERED",
            "values": [[
                range.report_title(),
                range.run_date.format("%Y-%m-%d").to_string(),
                range.week_label(),
                report.max_score_twitter,
                report.max_score_reddit,
                STATUS_COMPLETED,
                report.text_content,
            ]]
        }),
    )
}

fn chunk_chars(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

pub struct NotionSink {
    executor: Arc<dyn ToolExecutor>,
    database_id: String,
    backoff: BackoffPolicy,
}

impl NotionSink {
    pub fn new(executor: Arc<dyn ToolExecutor>, database_id: String, backoff: BackoffPolicy) -> Self {
        Self {
            executor,
            database_id,
            backoff,
        }
    }
}

#[async_trait]
impl ReportSink for NotionSink {
    fn destination(&self) -> &'static str {
        "notion"
    }

    async fn persist(
        &self,
        report: &Report,
        range: &DateRange,
    ) -> Result<PersistedRecord, ProxyError> {
        info!(database_id = %self.database_id, "saving report to Notion");
        let request = notion_page_request(&self.database_id, report, range);
        let response = execute_with_retry(self.executor.as_ref(), &request, &self.backoff).await?;
        let record_id = json_str(&response, &["id"])
            .or_else(|| json_str(&response, &["data", "id"]))
            .map(ToString::to_string);
        Ok(PersistedRecord {
            destination: self.destination(),
            record_id,
            response,
        })
    }
}

pub struct SheetsSink {
    executor: Arc<dyn ToolExecutor>,
    spreadsheet_id: String,
    sheet_range: String,
    backoff: BackoffPolicy,
}

impl SheetsSink {
    pub fn new(
        executor: Arc<dyn ToolExecutor>,
        spreadsheet_id: String,
        sheet_range: String,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            executor,
            spreadsheet_id,
            sheet_range,
            backoff,
        }
    }
}

#[async_trait]
impl ReportSink for SheetsSink {
    fn destination(&self) -> &'static str {
        "sheets"
    }

    async fn persist(
        &self,
        report: &Report,
        range: &DateRange,
    ) -> Result<PersistedRecord, ProxyError> {
        info!(spreadsheet_id = %self.spreadsheet_id, range = %self.sheet_range, "appending report row to Google Sheets");
        let request = sheets_append_request(&self.spreadsheet_id, &self.sheet_range, report, range);
        let response = execute_with_retry(self.executor.as_ref(), &request, &self.backoff).await?;
        let record_id = json_str(&response, &["updates", "updatedRange"])
            .or_else(|| json_str(&response, &["updatedRange"]))
            .map(ToString::to_string);
        Ok(PersistedRecord {
            destination: self.destination(),
            record_id,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use tunewatch_core::parse_timezone;

    #[derive(Default)]
    struct RecordingExecutor {
        requests: Mutex<Vec<ToolRequest>>,
        reply: JsonValue,
        fail_with: Option<u16>,
    }

    #[async_trait]
    impl ToolExecutor for RecordingExecutor {
        async fn execute(&self, request: &ToolRequest) -> Result<JsonValue, ProxyError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.fail_with {
                Some(status) => Err(ProxyError::Api {
                    tool_slug: request.tool_slug.clone(),
                    status,
                    message: "rejected".into(),
                }),
                None => Ok(self.reply.clone()),
            }
        }
    }

    fn sample_range() -> DateRange {
        let tz = parse_timezone("Asia/Shanghai").unwrap();
        DateRange::resolve(Utc.with_ymd_and_hms(2026, 10, 18, 1, 0, 0).unwrap(), tz)
    }

    fn sample_report() -> Report {
        Report {
            text_content: "# body".into(),
            max_score_twitter: 200,
            max_score_reddit: 50,
        }
    }

    #[test]
    fn notion_request_carries_full_property_set() {
        let request = notion_page_request("db-123", &sample_report(), &sample_range());
        assert_eq!(request.tool_slug, NOTION_CREATE_PAGE);
        let args = &request.arguments;
        assert_eq!(args["parent"]["database_id"], "db-123");
        let props = &args["properties"];
        assert_eq!(
            props[PROP_TITLE]["title"][0]["text"]["content"],
            "AI Music Trend Weekly - 2026 Week 42 (Oct 11 - Oct 17)"
        );
        assert_eq!(props[PROP_DATE]["date"]["start"], "2026-10-18");
        assert_eq!(props[PROP_WEEK]["rich_text"][0]["text"]["content"], "2026 Week 42");
        assert_eq!(props[PROP_TWITTER_MAX]["number"], 200);
        assert_eq!(props[PROP_REDDIT_MAX]["number"], 50);
        assert_eq!(props[PROP_STATUS]["select"]["name"], STATUS_COMPLETED);
        assert_eq!(
            args["children"][0]["paragraph"]["rich_text"][0]["text"]["content"],
            "# body"
        );
    }

    #[test]
    fn long_bodies_are_split_into_rich_text_segments() {
        let mut report = sample_report();
        report.text_content = "é".repeat(4500);
        let request = notion_page_request("db", &report, &sample_range());
        let segments = request.arguments["children"][0]["paragraph"]["rich_text"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(segments.len(), 3);
        let rejoined: String = segments
            .iter()
            .map(|s| s["text"]["content"].as_str().unwrap())
            .collect();
        assert_eq!(rejoined, report.text_content);
    }

    #[test]
    fn sheets_request_is_one_row() {
        let request = sheets_append_request("sheet-1", "Sheet1!A1", &sample_report(), &sample_range());
        assert_eq!(request.tool_slug, SHEETS_VALUES_APPEND);
        let row = request.arguments["values"][0].as_array().unwrap();
        assert_eq!(row.len(), 7);
        assert_eq!(row[3], 200);
        assert_eq!(row[4], 50);
        assert_eq!(row[6], "# body");
    }

    #[tokio::test]
    async fn notion_sink_returns_created_page_id() {
        let executor = Arc::new(RecordingExecutor {
            reply: json!({ "id": "page-42", "object": "page" }),
            ..Default::default()
        });
        let sink = NotionSink::new(executor.clone(), "db".into(), BackoffPolicy::none());
        let record = sink.persist(&sample_report(), &sample_range()).await.unwrap();
        assert_eq!(record.destination, "notion");
        assert_eq!(record.record_id.as_deref(), Some("page-42"));
        assert_eq!(executor.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sheets_sink_reports_updated_range() {
        let executor = Arc::new(RecordingExecutor {
            reply: json!({ "updates": { "updatedRange": "Sheet1!A7:G7" } }),
            ..Default::default()
        });
        let sink = SheetsSink::new(executor, "s".into(), "Sheet1!A1".into(), BackoffPolicy::none());
        let record = sink.persist(&sample_report(), &sample_range()).await.unwrap();
        assert_eq!(record.destination, "sheets");
        assert_eq!(record.record_id.as_deref(), Some("Sheet1!A7:G7"));
    }

    #[tokio::test]
    async fn retryable_failure_uses_configured_retries() {
        let executor = Arc::new(RecordingExecutor {
            fail_with: Some(503),
            ..Default::default()
        });
        let backoff = BackoffPolicy {
            max_retries: 2,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
        };
        let sink = NotionSink::new(executor.clone(), "db".into(), backoff);
        assert!(sink.persist(&sample_report(), &sample_range()).await.is_err());
        assert_eq!(executor.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sink_failure_propagates() {
        let executor = Arc::new(RecordingExecutor {
            fail_with: Some(400),
            ..Default::default()
        });
        let sink = SheetsSink::new(executor.clone(), "s".into(), "A1".into(), BackoffPolicy::none());
        let err = sink.persist(&sample_report(), &sample_range()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Api { status: 400, .. }));
        assert_eq!(executor.requests.lock().unwrap().len(), 1);
    }
}
