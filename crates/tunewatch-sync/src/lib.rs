//! Weekly report pipeline: resolve window, fetch both sources, assemble, persist.

pub mod config;
pub mod report;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, info_span, Instrument};
use tunewatch_adapters::{fetch_top_posts, RedditSearchAdapter, SourceAdapter, TwitterSearchAdapter};
use tunewatch_core::{DateRange, Report, ScoredPost, TOP_N};
use tunewatch_storage::{
    BackoffPolicy, NotionSink, ProxyClient, ProxyClientConfig, ReportSink, SheetsSink,
    ToolExecutor,
};
use uuid::Uuid;

pub use config::{ConfigError, Destination, Requirement, RunConfig};
pub use report::assemble_report;

pub const CRATE_NAME: &str = "tunewatch-sync";

/// Everything produced before the persistence step.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub range: DateRange,
    pub twitter: Vec<ScoredPost>,
    pub reddit: Vec<ScoredPost>,
    pub report: Report,
}

impl ReportDraft {
    pub fn content_sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.report.text_content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub week_label: String,
    pub window_label: String,
    pub generated_at: String,
    pub twitter_posts: usize,
    pub reddit_posts: usize,
    pub max_score_twitter: u64,
    pub max_score_reddit: u64,
    pub destination: String,
    pub record_id: Option<String>,
    pub report_sha256: String,
}

pub struct ReportPipeline {
    executor: Arc<dyn ToolExecutor>,
    twitter: Box<dyn SourceAdapter>,
    reddit: Box<dyn SourceAdapter>,
    sink: Option<Box<dyn ReportSink>>,
    config: RunConfig,
}

impl ReportPipeline {
    pub fn new(config: RunConfig) -> Result<Self> {
        let client = ProxyClient::new(ProxyClientConfig {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        Ok(Self::with_executor(config, Arc::new(client)))
    }

    /// Wire adapters and sink around an existing executor.
    pub fn with_executor(config: RunConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        let backoff = BackoffPolicy::with_max_retries(config.persist_retries);
        let sink: Option<Box<dyn ReportSink>> = match &config.destination {
            Some(Destination::Notion { database_id }) => Some(Box::new(NotionSink::new(
                executor.clone(),
                database_id.clone(),
                backoff,
            ))),
            Some(Destination::Sheets {
                spreadsheet_id,
                range,
            }) => Some(Box::new(SheetsSink::new(
                executor.clone(),
                spreadsheet_id.clone(),
                range.clone(),
                backoff,
            ))),
            None => None,
        };

        Self {
            twitter: Box::new(TwitterSearchAdapter::new(config.query.clone())),
            reddit: Box::new(RedditSearchAdapter::new(config.query.clone())),
            executor,
            sink,
            config,
        }
    }

    /// Replace the configured destination with any other sink.
    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn resolve_window(&self, now: DateTime<Utc>) -> DateRange {
        DateRange::resolve(now, self.config.timezone)
    }

    /// Fetch both sources concurrently and assemble the report. Never persists.
    pub async fn prepare(&self, now: DateTime<Utc>) -> ReportDraft {
        let range = self.resolve_window(now);
        info!(
            window = %range.display_label,
            week = %range.week_label(),
            "generating report"
        );

        let executor = self.executor.as_ref();
        let (twitter, reddit) = tokio::join!(
            fetch_top_posts(self.twitter.as_ref(), executor, TOP_N),
            fetch_top_posts(self.reddit.as_ref(), executor, TOP_N),
        );
        info!(
            twitter = twitter.len(),
            reddit = reddit.len(),
            "data collected"
        );

        let report = assemble_report(&twitter, &reddit, &range);
        ReportDraft {
            range,
            twitter,
            reddit,
            report,
        }
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        self.run_once_at(Utc::now()).await
    }

    /// Full run for the given instant. Persistence happens exactly once and
    /// its failure is returned to the caller.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id, now)
            .instrument(info_span!("report_run", %run_id))
            .await
    }

    async fn run_inner(&self, run_id: Uuid, now: DateTime<Utc>) -> Result<RunSummary> {
        let started_at = Utc::now();
        let sink = self
            .sink
            .as_deref()
            .ok_or_else(|| anyhow!("no destination store configured"))?;

        let draft = self.prepare(now).await;
        let record = sink
            .persist(&draft.report, &draft.range)
            .await
            .with_context(|| format!("saving report to {}", sink.destination()))?;
        info!(
            destination = record.destination,
            record_id = record.record_id.as_deref().unwrap_or("-"),
            "report saved"
        );

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            week_label: draft.range.week_label(),
            window_label: draft.range.display_label.clone(),
            generated_at: draft
                .range
                .resolved_at
                .format("%Y-%m-%d %H:%M:%S %Z")
                .to_string(),
            twitter_posts: draft.twitter.len(),
            reddit_posts: draft.reddit.len(),
            max_score_twitter: draft.report.max_score_twitter,
            max_score_reddit: draft.report.max_score_reddit,
            destination: record.destination.to_string(),
            record_id: record.record_id,
            report_sha256: draft.content_sha256(),
        })
    }
}

pub async fn run_report_once_from_env() -> Result<RunSummary> {
    let config = RunConfig::from_env(Requirement::Full)?;
    let pipeline = ReportPipeline::new(config)?;
    pipeline.run_once().await
}

pub async fn preview_report_from_env() -> Result<ReportDraft> {
    let config = RunConfig::from_env(Requirement::CredentialOnly)?;
    let pipeline = ReportPipeline::new(config)?;
    Ok(pipeline.prepare(Utc::now()).await)
}
