//! Weekly report assembly.
//!
//! Output depends only on the ranked posts and the [`DateRange`]; the same
//! inputs always render the same bytes.

use tunewatch_core::{group_thousands, max_score, DateRange, Report, ScoredPost, Source, TOP_N};

pub const PREVIEW_CHARS: usize = 100;
pub const NO_DATA_PLACEHOLDER: &str = "_No data available for this week._";
pub const FOOTER: &str = "*Generated automatically by the tunewatch AI music weekly report job*";

pub fn assemble_report(twitter: &[ScoredPost], reddit: &[ScoredPost], range: &DateRange) -> Report {
    let max_twitter = max_score(twitter);
    let max_reddit = max_score(reddit);

    let mut lines = vec![
        format!("# {}", range.report_title()),
        String::new(),
        "## Weekly Overview".to_string(),
        String::new(),
        format!(
            "- **{} top engagement**: {}",
            Source::Twitter.display_name(),
            group_thousands(max_twitter)
        ),
        format!(
            "- **{} top engagement**: {}",
            Source::Reddit.display_name(),
            group_thousands(max_reddit)
        ),
        format!(
            "- **Reporting window**: {} to {}",
            range.start_date.format("%Y-%m-%d"),
            range.end_date.format("%Y-%m-%d")
        ),
        format!(
            "- **Data collected**: {} ({})",
            range.resolved_at.format("%Y-%m-%d %H:%M:%S"),
            range.resolved_at.timezone().name()
        ),
        String::new(),
    ];

    for (source, posts) in [(Source::Twitter, twitter), (Source::Reddit, reddit)] {
        lines.extend(section_lines(source, posts, range));
    }

    lines.push("## Trend Analysis".to_string());
    lines.push(String::new());
    lines.push(trend_sentence(max_twitter, max_reddit));
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(FOOTER.to_string());

    let mut text_content = lines.join("\n");
    text_content.push('\n');

    Report {
        text_content,
        max_score_twitter: max_twitter,
        max_score_reddit: max_reddit,
    }
}

fn section_lines(source: Source, posts: &[ScoredPost], range: &DateRange) -> Vec<String> {
    let mut lines = vec![
        format!("## {} Top {}", source.display_name(), TOP_N),
        String::new(),
    ];
    if posts.is_empty() {
        lines.push(NO_DATA_PLACEHOLDER.to_string());
        lines.push(String::new());
        return lines;
    }

    let tz = range.resolved_at.timezone();
    let fallback = match source {
        Source::Twitter => "Tweet content",
        Source::Reddit => "Reddit post",
    };
    for (index, post) in posts.iter().enumerate() {
        let posted = post
            .post
            .created_at
            .map(|at| at.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        lines.push(format!(
            "### {}. {}",
            index + 1,
            text_preview(post.post.text.as_deref(), fallback)
        ));
        lines.push(format!("- **Engagement**: {}", group_thousands(post.engagement_score)));
        lines.push(format!("- **Posted**: {posted}"));
        lines.push(format!("- **Link**: {}", post.permalink()));
        lines.push(String::new());
    }
    lines
}

/// Single-line preview of at most [`PREVIEW_CHARS`] characters.
pub fn text_preview(text: Option<&str>, fallback: &str) -> String {
    let flat = text
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if flat.is_empty() {
        return fallback.to_string();
    }
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut preview: String = flat.chars().take(PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

/// Compare the two maxima. The ratio denominator is floored at 1 so an
/// empty source never divides by zero.
pub fn trend_sentence(max_twitter: u64, max_reddit: u64) -> String {
    let twitter = Source::Twitter.display_name();
    let reddit = Source::Reddit.display_name();
    if max_twitter > max_reddit {
        format!(
            "{twitter} engagement was clearly ahead of {reddit} this week, with a top-engagement ratio of {}:1.",
            engagement_ratio(max_twitter, max_reddit)
        )
    } else if max_reddit > max_twitter {
        format!(
            "{reddit} engagement was clearly ahead of {twitter} this week, with a top-engagement ratio of {}:1.",
            engagement_ratio(max_reddit, max_twitter)
        )
    } else {
        "Both platforms showed comparable engagement this week.".to_string()
    }
}

pub fn engagement_ratio(leader: u64, other: u64) -> String {
    format!("{:.1}", leader as f64 / other.max(1) as f64)
}
