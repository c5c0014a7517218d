//! Source adapter contracts + the Twitter/X and Reddit search adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{info, warn};
use tunewatch_core::{rank_posts, EngagementMetrics, RawPost, ScoredPost, Source};
use tunewatch_storage::{ProxyError, ToolExecutor, ToolRequest};

pub const CRATE_NAME: &str = "tunewatch-adapters";

pub const DEFAULT_QUERY: &str =
    r#"AI music OR "AI generated music" OR "generative music" OR suno OR mureka"#;

pub const TWITTER_SEARCH_TWEETS: &str = "TWITTER_SEARCH_TWEETS";
pub const REDDIT_SEARCH_POSTS: &str = "REDDIT_SEARCH_POSTS";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error("unexpected {source_id} payload: {message}")]
    Payload {
        source_id: &'static str,
        message: String,
    },
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// The single proxy call that retrieves this source's candidates.
    fn request(&self) -> ToolRequest;

    /// Turn the tool's `data` payload into raw posts, in payload order.
    fn parse(&self, payload: JsonValue) -> Result<Vec<RawPost>, AdapterError>;

    async fn fetch(&self, executor: &dyn ToolExecutor) -> Result<Vec<RawPost>, AdapterError> {
        let payload = executor.execute(&self.request()).await?;
        self.parse(payload)
    }
}

/// Fetch one source and keep its `limit` most engaging posts.
///
/// Never fails: any error is logged and the source contributes nothing.
pub async fn fetch_top_posts(
    adapter: &dyn SourceAdapter,
    executor: &dyn ToolExecutor,
    limit: usize,
) -> Vec<ScoredPost> {
    let source = adapter.source();
    info!(source = source.id(), "fetching {} data", source.display_name());
    match adapter.fetch(executor).await {
        Ok(posts) => {
            let fetched = posts.len();
            let ranked = rank_posts(posts, limit);
            info!(source = source.id(), fetched, kept = ranked.len(), "ranked posts");
            ranked
        }
        Err(err) => {
            warn!(source = source.id(), error = %err, "fetch failed; continuing without this source");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone)]
pub struct TwitterSearchAdapter {
    query: String,
    max_results: u32,
    sort_order: String,
}

impl TwitterSearchAdapter {
    /// The recent-search endpoint accepts 10..=100 results per call.
    pub const MAX_RESULTS: u32 = 100;

    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: Self::MAX_RESULTS,
            sort_order: "relevancy".to_string(),
        }
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.clamp(10, Self::MAX_RESULTS);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RedditSearchAdapter {
    query: String,
    sort: String,
    time_filter: String,
    limit: u32,
}

impl RedditSearchAdapter {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sort: "top".to_string(),
            time_filter: "week".to_string(),
            limit: 50,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, Self::MAX_LIMIT);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicMetrics {
    #[serde(default, deserialize_with = "lenient_count")]
    pub like_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub retweet_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub reply_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub quote_count: Option<i64>,
}

/// One tweet as returned by the search tool.
///
/// Every field is read leniently: a value of the wrong type counts as missing.
#[derive(Debug, Clone, Deserialize)]
pub struct TweetRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub author_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_metrics")]
    pub public_metrics: Option<PublicMetrics>,
}

impl TweetRecord {
    pub fn into_raw_post(self) -> Option<RawPost> {
        let id = self.id?;
        let metrics = self.public_metrics.unwrap_or_default();
        Some(RawPost {
            source: Source::Twitter,
            id,
            author: self.author_id,
            text: self.text,
            created_at: self.created_at,
            permalink: None,
            metrics: EngagementMetrics::Tweet {
                like_count: metrics.like_count,
                retweet_count: metrics.retweet_count,
                reply_count: metrics.reply_count,
                quote_count: metrics.quote_count,
            },
        })
    }
}

/// One submission as returned by the search tool. Read as leniently as tweets.
#[derive(Debug, Clone, Deserialize)]
pub struct RedditRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub permalink: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_utc: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub score: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub num_comments: Option<i64>,
}

impl RedditRecord {
    pub fn into_raw_post(self) -> Option<RawPost> {
        let id = self.id?;
        Some(RawPost {
            source: Source::Reddit,
            id,
            author: self.author,
            text: self.title,
            created_at: self.created_utc,
            permalink: self.permalink,
            metrics: EngagementMetrics::Submission {
                score: self.score,
                num_comments: self.num_comments,
            },
        })
    }
}

fn epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if secs.is_finite() {
        DateTime::from_timestamp(secs as i64, 0)
    } else {
        None
    }
}

/// RFC 3339 text, or seconds since the epoch as a number or numeric string.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(s)) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|| s.parse::<f64>().ok().and_then(epoch_seconds))
        }
        Some(JsonValue::Number(n)) => n.as_f64().and_then(epoch_seconds),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_metrics<'de, D>(deserializer: D) -> Result<Option<PublicMetrics>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(value @ JsonValue::Object(_)) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(JsonValue::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Locate the record list inside a tool payload.
///
/// Accepts a bare array, the `{ "data": [...] }` envelope of the search APIs,
/// and Reddit's `{ "data": { "children": [{ "kind", "data" }] } }` listing.
/// A `null` payload means no results.
fn extract_records(source_id: &'static str, payload: JsonValue) -> Result<Vec<JsonValue>, AdapterError> {
    match payload {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::Array(items) => Ok(items),
        JsonValue::Object(mut map) => {
            if let Some(children) = map.remove("children") {
                let items = extract_records(source_id, children)?;
                return Ok(items
                    .into_iter()
                    .map(|child| match child {
                        JsonValue::Object(mut c) if c.contains_key("kind") => {
                            c.remove("data").unwrap_or(JsonValue::Null)
                        }
                        other => other,
                    })
                    .collect());
            }
            for key in ["data", "posts", "results", "tweets"] {
                if let Some(inner) = map.remove(key) {
                    return extract_records(source_id, inner);
                }
            }
            Err(AdapterError::Payload {
                source_id,
                message: "object without a record list".to_string(),
            })
        }
        other => Err(AdapterError::Payload {
            source_id,
            message: format!("expected a record list, got {other}"),
        }),
    }
}

fn parse_records<R, F>(
    source_id: &'static str,
    payload: JsonValue,
    into_post: F,
) -> Result<Vec<RawPost>, AdapterError>
where
    R: for<'de> Deserialize<'de>,
    F: Fn(R) -> Option<RawPost>,
{
    let mut posts = Vec::new();
    let mut undecodable = 0usize;
    let mut missing_id = 0usize;
    for item in extract_records(source_id, payload)? {
        let Ok(record) = serde_json::from_value::<R>(item) else {
            undecodable += 1;
            continue;
        };
        match into_post(record) {
            Some(post) => posts.push(post),
            None => missing_id += 1,
        }
    }
    if undecodable + missing_id > 0 {
        warn!(
            source = source_id,
            undecodable,
            missing_id,
            kept = posts.len(),
            "skipped unusable records"
        );
    }
    Ok(posts)
}

#[async_trait]
impl SourceAdapter for TwitterSearchAdapter {
    fn source(&self) -> Source {
        Source::Twitter
    }

    fn request(&self) -> ToolRequest {
        ToolRequest::new(
            TWITTER_SEARCH_TWEETS,
            json!({
                "query": self.query,
                "max_results": self.max_results,
                "tweet_fields": "public_metrics,created_at,author_id",
                "sort_order": self.sort_order,
            }),
        )
    }

    fn parse(&self, payload: JsonValue) -> Result<Vec<RawPost>, AdapterError> {
        parse_records(Source::Twitter.id(), payload, TweetRecord::into_raw_post)
    }
}

#[async_trait]
impl SourceAdapter for RedditSearchAdapter {
    fn source(&self) -> Source {
        Source::Reddit
    }

    fn request(&self) -> ToolRequest {
        ToolRequest::new(
            REDDIT_SEARCH_POSTS,
            json!({
                "query": self.query,
                "sort": self.sort,
                "time_filter": self.time_filter,
                "limit": self.limit,
            }),
        )
    }

    fn parse(&self, payload: JsonValue) -> Result<Vec<RawPost>, AdapterError> {
        parse_records(Source::Reddit.id(), payload, RedditRecord::into_raw_post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twitter_request_shape() {
        let request = TwitterSearchAdapter::new("suno").with_max_results(500).request();
        assert_eq!(request.tool_slug, TWITTER_SEARCH_TWEETS);
        assert_eq!(request.arguments["query"], "suno");
        assert_eq!(request.arguments["max_results"], 100);
        assert_eq!(request.arguments["sort_order"], "relevancy");
        assert_eq!(
            request.arguments["tweet_fields"],
            "public_metrics,created_at,author_id"
        );
    }

    #[test]
    fn reddit_request_shape() {
        let request = RedditSearchAdapter::new(DEFAULT_QUERY).request();
        assert_eq!(request.tool_slug, REDDIT_SEARCH_POSTS);
        assert_eq!(request.arguments["sort"], "top");
        assert_eq!(request.arguments["time_filter"], "week");
        assert_eq!(request.arguments["limit"], 50);

        let capped = RedditSearchAdapter::new("q").with_limit(1000).request();
        assert_eq!(capped.arguments["limit"], RedditSearchAdapter::MAX_LIMIT);
    }

    #[test]
    fn tweet_payload_parses_in_order_with_missing_metrics() {
        let payload = json!({
            "data": [
                {
                    "id": "111",
                    "text": "new suno model",
                    "author_id": "9",
                    "created_at": "2026-10-15T08:30:00.000Z",
                    "public_metrics": { "like_count": 10, "retweet_count": 2, "reply_count": 1, "quote_count": 0 }
                },
                { "id": 222, "text": "no metrics at all" },
                { "text": "no id, dropped" }
            ],
            "meta": { "result_count": 3 }
        });
        let posts = TwitterSearchAdapter::new("q").parse(payload).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "111");
        assert_eq!(posts[0].metrics.total(), 13);
        assert_eq!(
            posts[0].created_at.unwrap().to_rfc3339(),
            "2026-10-15T08:30:00+00:00"
        );
        assert_eq!(posts[1].id, "222");
        assert_eq!(posts[1].metrics.total(), 0);
    }

    #[test]
    fn reddit_listing_children_are_unwrapped() {
        let payload = json!({
            "data": {
                "children": [
                    { "kind": "t3", "data": {
                        "id": "abc", "title": "Udio vs Suno", "author": "u1",
                        "permalink": "/r/WeAreTheMusicMakers/comments/abc/udio_vs_suno/",
                        "created_utc": 1760000000.0, "score": 120, "num_comments": 30
                    }},
                    { "kind": "t3", "data": { "id": "def", "title": "downvoted", "score": -4 } }
                ]
            }
        });
        let posts = RedditSearchAdapter::new("q").parse(payload).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].text.as_deref(), Some("Udio vs Suno"));
        assert_eq!(posts[0].metrics.total(), 150);
        assert_eq!(posts[0].created_at.unwrap().timestamp(), 1_760_000_000);
        assert_eq!(posts[1].metrics.total(), 0);
    }

    #[test]
    fn null_payload_means_no_results() {
        let posts = RedditSearchAdapter::new("q").parse(JsonValue::Null).unwrap();
        assert!(posts.is_empty());
    }

    #[test]
    fn scalar_payload_is_rejected() {
        let err = TwitterSearchAdapter::new("q").parse(json!("rate limited")).unwrap_err();
        assert!(matches!(err, AdapterError::Payload { source_id: "twitter", .. }));
    }

    #[test]
    fn mistyped_fields_count_as_missing() {
        let payload = json!({ "data": [
            { "id": "1", "text": "fine", "created_at": "2026-10-15T08:30:00Z",
              "public_metrics": { "like_count": 500 } },
            { "id": "2", "text": 42, "created_at": 1760000000,
              "public_metrics": { "like_count": 300 } },
            { "id": "3", "created_at": true, "public_metrics": "oops" }
        ]});
        let posts = TwitterSearchAdapter::new("q").parse(payload).unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[1].text, None);
        assert_eq!(posts[1].created_at.unwrap().timestamp(), 1_760_000_000);
        assert_eq!(posts[1].metrics.total(), 300);
        assert_eq!(posts[2].created_at, None);
        assert_eq!(posts[2].metrics.total(), 0);
    }

    #[test]
    fn reddit_string_timestamp_and_odd_items() {
        let payload = json!([
            { "id": "a", "title": ["not", "text"], "created_utc": "1760000000.0", "score": "12" },
            "not a record",
            { "title": "no id" }
        ]);
        let posts = RedditSearchAdapter::new("q").parse(payload).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].text, None);
        assert_eq!(posts[0].created_at.unwrap().timestamp(), 1_760_000_000);
        assert_eq!(posts[0].metrics.total(), 12);
    }
}
