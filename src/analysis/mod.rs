//! Corpus analysis: classify posts, resolve their timestamps, summarize.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::corpus::Corpus;
use crate::temporal::TimeNormalizer;

pub mod stats;
pub mod topics;

pub use stats::{summarize, AnalyzedRow, Summary, TopicTrend};
pub use topics::{Classification, TopicRule, TopicRules};

/// Note emitted when no post has a usable timestamp.
pub const NO_DATA_NOTE: &str = "no data (check published_at format)";

/// Summary and trend for one author.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub summary: Summary,
    pub topic_trend: TopicTrend,
}

/// Result of analyzing a corpus.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    /// No post had a resolvable timestamp.
    NoUsableData { total_posts: usize },
    Report(Box<Report>),
}

impl Analysis {
    /// Summary document as written to disk.
    #[must_use]
    pub fn summary_json(&self) -> Value {
        match self {
            Self::NoUsableData { .. } => json!({ "note": NO_DATA_NOTE }),
            Self::Report(report) => json!(report.summary),
        }
    }

    /// Topic trend document; empty when there is no usable data.
    #[must_use]
    pub fn trend_json(&self) -> Value {
        match self {
            Self::NoUsableData { .. } => json!({}),
            Self::Report(report) => json!(report.topic_trend),
        }
    }
}

/// Classify every post and keep those with a resolvable timestamp, oldest
/// first. Posts with equal timestamps keep corpus order.
#[must_use]
pub fn analyzed_rows(
    corpus: &Corpus,
    rules: &TopicRules,
    normalizer: &TimeNormalizer,
) -> Vec<AnalyzedRow> {
    let mut rows: Vec<AnalyzedRow> = corpus
        .posts
        .iter()
        .filter_map(|post| {
            let Some(instant) = normalizer.to_utc(&post.published_at) else {
                debug!(url = %post.url, published_at = %post.published_at, "Unresolvable timestamp");
                return None;
            };
            let class = rules.classify(&post.title, &post.text, &post.tags, &post.code_langs);
            Some(AnalyzedRow {
                url: post.url.clone(),
                title: post.title.clone(),
                instant,
                is_study: class.is_study,
                major_topic: class.major_topic,
                topics: class.topics,
            })
        })
        .collect();
    rows.sort_by_key(|r| r.instant);
    rows
}

/// Analyze `corpus` relative to the normalizer's reference time.
#[must_use]
pub fn analyze(corpus: &Corpus, rules: &TopicRules, normalizer: &TimeNormalizer) -> Analysis {
    let rows = analyzed_rows(corpus, rules, normalizer);
    let total_posts = corpus.posts.len();

    match summarize(&corpus.author, &rows, total_posts) {
        Some((summary, topic_trend)) => {
            info!(
                handle = %corpus.handle(),
                total = total_posts,
                dated = summary.dated_posts,
                study = summary.total_study_posts,
                "Corpus analyzed"
            );
            Analysis::Report(Box::new(Report {
                summary,
                topic_trend,
            }))
        }
        None => {
            info!(handle = %corpus.handle(), total = total_posts, "No post has a usable timestamp");
            Analysis::NoUsableData { total_posts }
        }
    }
}
