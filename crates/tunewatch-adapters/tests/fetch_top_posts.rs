use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tunewatch_adapters::{
    fetch_top_posts, RedditSearchAdapter, TwitterSearchAdapter, REDDIT_SEARCH_POSTS,
    TWITTER_SEARCH_TWEETS,
};
use tunewatch_core::TOP_N;
use tunewatch_storage::{ProxyError, ToolExecutor, ToolRequest};

/// Answers each tool slug with a canned payload, or an API error when absent.
struct CannedProxy {
    twitter: Option<JsonValue>,
    reddit: Option<JsonValue>,
}

#[async_trait]
impl ToolExecutor for CannedProxy {
    async fn execute(&self, request: &ToolRequest) -> Result<JsonValue, ProxyError> {
        let canned = match request.tool_slug.as_str() {
            TWITTER_SEARCH_TWEETS => self.twitter.clone(),
            REDDIT_SEARCH_POSTS => self.reddit.clone(),
            _ => None,
        };
        canned.ok_or_else(|| ProxyError::Api {
            tool_slug: request.tool_slug.clone(),
            status: 401,
            message: "invalid api key".into(),
        })
    }
}

fn tweets(likes: &[i64]) -> JsonValue {
    let items: Vec<JsonValue> = likes
        .iter()
        .enumerate()
        .map(|(i, l)| {
            json!({
                "id": format!("t{i}"),
                "text": format!("tweet {i}"),
                "public_metrics": { "like_count": l }
            })
        })
        .collect();
    json!({ "data": items })
}

#[tokio::test]
async fn keeps_top_five_by_descending_score_stable_on_ties() {
    let proxy = CannedProxy {
        twitter: Some(tweets(&[5, 40, 5, 90, 1, 5, 40, 0])),
        reddit: None,
    };
    let ranked = fetch_top_posts(&TwitterSearchAdapter::new("q"), &proxy, TOP_N).await;
    let ids: Vec<_> = ranked.iter().map(|p| p.post.id.as_str()).collect();
    assert_eq!(ids, vec!["t3", "t1", "t6", "t0", "t2"]);
    assert_eq!(ranked[0].engagement_score, 90);
}

#[tokio::test]
async fn fewer_than_five_results_are_all_kept() {
    let proxy = CannedProxy {
        twitter: Some(tweets(&[3, 7])),
        reddit: None,
    };
    let ranked = fetch_top_posts(&TwitterSearchAdapter::new("q"), &proxy, TOP_N).await;
    assert_eq!(ranked.len(), 2);
}

#[tokio::test]
async fn proxy_error_degrades_to_empty_list() {
    let proxy = CannedProxy {
        twitter: None,
        reddit: None,
    };
    let ranked = fetch_top_posts(&RedditSearchAdapter::new("q"), &proxy, TOP_N).await;
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn malformed_payload_degrades_to_empty_list() {
    let proxy = CannedProxy {
        twitter: None,
        reddit: Some(json!({ "error": "unexpected shape" })),
    };
    let ranked = fetch_top_posts(&RedditSearchAdapter::new("q"), &proxy, TOP_N).await;
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn empty_result_set_is_empty_list() {
    let proxy = CannedProxy {
        twitter: Some(json!({ "data": [] })),
        reddit: None,
    };
    let ranked = fetch_top_posts(&TwitterSearchAdapter::new("q"), &proxy, TOP_N).await;
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn one_mistyped_record_does_not_sink_the_source() {
    let proxy = CannedProxy {
        twitter: Some(json!({ "data": [
            { "id": "a", "text": "good", "public_metrics": { "like_count": 500 } },
            { "id": "b", "text": "also good", "public_metrics": { "like_count": 300 } },
            { "id": "c", "text": "numeric time", "created_at": 1760000000,
              "public_metrics": { "like_count": 400 } }
        ]})),
        reddit: None,
    };
    let ranked = fetch_top_posts(&TwitterSearchAdapter::new("q"), &proxy, TOP_N).await;
    let ids: Vec<_> = ranked.iter().map(|p| p.post.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c", "b"]);
}

#[tokio::test]
async fn records_without_id_are_skipped_but_the_rest_rank() {
    let proxy = CannedProxy {
        twitter: None,
        reddit: Some(json!({ "data": [
            { "title": "viral but no id", "score": 10000 },
            { "id": "r1", "title": "kept", "score": 5 }
        ]})),
    };
    let ranked = fetch_top_posts(&RedditSearchAdapter::new("q"), &proxy, TOP_N).await;
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].post.id, "r1");
}
