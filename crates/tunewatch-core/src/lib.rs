//! Core domain model, engagement ranking and reporting-window types for tunewatch.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "tunewatch-core";

/// Number of posts each source contributes to a report.
pub const TOP_N: usize = 5;

/// Days covered by one reporting window, both ends inclusive.
pub const WINDOW_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Twitter,
    Reddit,
}

impl Source {
    pub fn id(&self) -> &'static str {
        match self {
            Source::Twitter => "twitter",
            Source::Reddit => "reddit",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Twitter => "Twitter/X.com",
            Source::Reddit => "Reddit",
        }
    }
}

/// Interaction counters exactly as the platform reported them.
///
/// Every counter is optional: platforms omit fields for deleted, private or
/// freshly created posts, and a missing counter contributes nothing to the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngagementMetrics {
    Tweet {
        like_count: Option<i64>,
        retweet_count: Option<i64>,
        reply_count: Option<i64>,
        quote_count: Option<i64>,
    },
    Submission {
        score: Option<i64>,
        num_comments: Option<i64>,
    },
}

impl EngagementMetrics {
    /// Sum of all defined counters. Missing and negative counters count as zero.
    pub fn total(&self) -> u64 {
        match self {
            EngagementMetrics::Tweet {
                like_count,
                retweet_count,
                reply_count,
                quote_count,
            } => sum_counters(&[*like_count, *retweet_count, *reply_count, *quote_count]),
            EngagementMetrics::Submission {
                score,
                num_comments,
            } => sum_counters(&[*score, *num_comments]),
        }
    }
}

fn sum_counters(counters: &[Option<i64>]) -> u64 {
    counters
        .iter()
        .map(|c| c.unwrap_or(0).max(0) as u64)
        .fold(0u64, u64::saturating_add)
}

/// One tweet or submission as fetched. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    pub source: Source,
    pub id: String,
    pub author: Option<String>,
    pub text: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Platform-relative path (Reddit) or absolute URL, when the platform sends one.
    pub permalink: Option<String>,
    pub metrics: EngagementMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredPost {
    pub post: RawPost,
    pub engagement_score: u64,
}

impl ScoredPost {
    pub fn permalink(&self) -> String {
        let post = &self.post;
        match post.source {
            Source::Twitter => format!("https://twitter.com/i/status/{}", post.id),
            Source::Reddit => match post.permalink.as_deref().map(str::trim) {
                Some(link) if link.starts_with("http://") || link.starts_with("https://") => {
                    link.to_string()
                }
                Some(path) if !path.is_empty() => {
                    if path.starts_with('/') {
                        format!("https://reddit.com{path}")
                    } else {
                        format!("https://reddit.com/{path}")
                    }
                }
                _ => format!("https://reddit.com/comments/{}", post.id),
            },
        }
    }
}

pub fn score_post(post: RawPost) -> ScoredPost {
    let engagement_score = post.metrics.total();
    ScoredPost {
        post,
        engagement_score,
    }
}

/// Score every post, order by descending score and keep the first `limit`.
///
/// The sort is stable, so posts with equal scores keep their fetch order.
pub fn rank_posts(posts: Vec<RawPost>, limit: usize) -> Vec<ScoredPost> {
    let mut scored: Vec<ScoredPost> = posts.into_iter().map(score_post).collect();
    scored.sort_by(|a, b| b.engagement_score.cmp(&a.engagement_score));
    scored.truncate(limit);
    scored
}

pub fn max_score(posts: &[ScoredPost]) -> u64 {
    posts.iter().map(|p| p.engagement_score).max().unwrap_or(0)
}

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown timezone identifier `{0}`")]
pub struct InvalidTimezone(pub String);

pub fn parse_timezone(name: &str) -> Result<Tz, InvalidTimezone> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| InvalidTimezone(name.to_string()))
}

/// The seven days a run reports on, plus the labels derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// ISO week of the run date, not of the window.
    pub week_number: u32,
    /// ISO week-based year that `week_number` belongs to.
    pub year: i32,
    pub display_label: String,
    /// Local date of the run in the reporting timezone.
    pub run_date: NaiveDate,
    /// Instant the window was resolved, used as the "collected at" stamp.
    pub resolved_at: DateTime<Tz>,
}

impl DateRange {
    /// Window ending yesterday (in `tz`) and starting six days before that.
    pub fn resolve(now: DateTime<Utc>, tz: Tz) -> Self {
        let resolved_at = now.with_timezone(&tz);
        let run_date = resolved_at.date_naive();
        let end_date = run_date - Days::new(1);
        let start_date = end_date - Days::new(WINDOW_DAYS - 1);
        let display_label = format!(
            "{} - {}",
            start_date.format("%b %-d"),
            end_date.format("%b %-d")
        );

        let iso_week = run_date.iso_week();

        Self {
            start_date,
            end_date,
            week_number: iso_week.week(),
            year: iso_week.year(),
            display_label,
            run_date,
            resolved_at,
        }
    }

    pub fn week_label(&self) -> String {
        format!("{} Week {}", self.year, self.week_number)
    }

    pub fn report_title(&self) -> String {
        format!(
            "AI Music Trend Weekly - {} ({})",
            self.week_label(),
            self.display_label
        )
    }

    pub fn span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

/// The rendered report and the two headline metrics. Built once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub text_content: String,
    pub max_score_twitter: u64,
    pub max_score_reddit: u64,
}
