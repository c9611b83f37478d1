//! Activity statistics over classified, dated posts.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::corpus::Author;

/// Length of the recency window, in days, ending on the last active day.
pub const RECENT_WINDOW_DAYS: i64 = 90;

/// How many topics `top_topics` keeps.
const TOP_TOPICS: usize = 5;

/// topic → (`YYYY-MM` → count).
pub type TopicTrend = BTreeMap<String, BTreeMap<String, usize>>;

/// A post with a resolved timestamp and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedRow {
    pub url: String,
    pub title: String,
    pub instant: DateTime<Utc>,
    pub is_study: bool,
    pub major_topic: Option<String>,
    pub topics: Vec<String>,
}

impl AnalyzedRow {
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.instant.date_naive()
    }

    #[must_use]
    pub fn month(&self) -> String {
        self.instant.format("%Y-%m").to_string()
    }
}

/// Activity summary for one author.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub author: Author,
    pub active_start: NaiveDate,
    pub active_end: NaiveDate,
    pub active_days: i64,
    pub total_posts: usize,
    pub dated_posts: usize,
    pub undated_posts: usize,
    pub total_study_posts: usize,
    pub posts_per_month: BTreeMap<String, usize>,
    pub longest_streak_days: usize,
    pub max_gap_days: i64,
    pub interval_cv: f64,
    pub last_90d_posts: usize,
    pub last_90d_weeks_active: usize,
    pub consistency_score: f64,
    pub cadence_score: f64,
    pub top_topics: Vec<(String, usize)>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Whole days between consecutive instants. Input must be sorted.
#[must_use]
pub fn gaps_in_days(instants: &[DateTime<Utc>]) -> Vec<i64> {
    instants
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_days())
        .collect()
}

/// Population coefficient of variation; 0 when there are no gaps or the
/// mean is 0.
#[must_use]
pub fn coefficient_of_variation(gaps: &[i64]) -> f64 {
    if gaps.is_empty() {
        return 0.0;
    }
    let n = gaps.len() as f64;
    let mean = gaps.iter().sum::<i64>() as f64 / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = gaps
        .iter()
        .map(|&g| {
            let d = g as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt() / mean
}

/// Longest run of consecutive days in `active` between `start` and `end`.
#[must_use]
pub fn longest_streak(start: NaiveDate, end: NaiveDate, active: &BTreeSet<NaiveDate>) -> usize {
    let mut best = 0;
    let mut current = 0;
    let mut day = start;
    while day <= end {
        if active.contains(&day) {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    best
}

#[must_use]
pub fn consistency_score(cv: f64, max_gap_days: i64) -> f64 {
    let penalty = (cv * 25.0 + max_gap_days as f64 * 0.5).clamp(0.0, 100.0);
    100.0 - penalty
}

#[must_use]
pub fn cadence_score(consistency: f64, recent_posts: usize) -> f64 {
    let recency = (recent_posts as f64 * 3.0).min(30.0);
    (consistency * 0.7 + recency * 0.3).clamp(0.0, 100.0)
}

/// The most frequent major topics, ties broken by first appearance.
#[must_use]
pub fn top_topics(rows: &[&AnalyzedRow]) -> Vec<(String, usize)> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for topic in rows.iter().filter_map(|r| r.major_topic.as_deref()) {
        let count = counts.entry(topic).or_insert(0);
        if *count == 0 {
            order.push(topic);
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|t| (t.to_string(), counts[t]))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(TOP_TOPICS);
    ranked
}

/// Per-topic monthly counts. Rows without ranked topics fall back to their
/// major topic.
#[must_use]
pub fn topic_trend(rows: &[&AnalyzedRow]) -> TopicTrend {
    let mut trend = TopicTrend::new();
    for row in rows {
        let topics: Vec<&str> = if row.topics.is_empty() {
            row.major_topic.as_deref().into_iter().collect()
        } else {
            row.topics.iter().map(String::as_str).collect()
        };
        let month = row.month();
        for topic in topics {
            *trend
                .entry(topic.to_string())
                .or_default()
                .entry(month.clone())
                .or_insert(0) += 1;
        }
    }
    trend
}

/// Summarize `rows`, which must be sorted by instant. `total_posts` counts
/// the whole corpus including undated posts.
///
/// Returns `None` when `rows` is empty.
#[must_use]
pub fn summarize(
    author: &Author,
    rows: &[AnalyzedRow],
    total_posts: usize,
) -> Option<(Summary, TopicTrend)> {
    let mut study: Vec<&AnalyzedRow> = rows.iter().filter(|r| r.is_study).collect();
    if study.is_empty() {
        study = rows.iter().collect();
    }
    let first = study.first()?;
    let last = study.last()?;

    let active_start = first.date();
    let active_end = last.date();
    let active_days = (active_end - active_start).num_days() + 1;

    let instants: Vec<DateTime<Utc>> = study.iter().map(|r| r.instant).collect();
    let gaps = gaps_in_days(&instants);
    let max_gap_days = gaps.iter().copied().max().unwrap_or(0);
    let cv = coefficient_of_variation(&gaps);

    let active: BTreeSet<NaiveDate> = study.iter().map(|r| r.date()).collect();
    let longest_streak_days = longest_streak(active_start, active_end, &active);

    let window_start = active_end - Duration::days(RECENT_WINDOW_DAYS - 1);
    let recent: Vec<&&AnalyzedRow> = study
        .iter()
        .filter(|r| (window_start..=active_end).contains(&r.date()))
        .collect();
    let last_90d_posts = recent.len();
    let last_90d_weeks_active = recent
        .iter()
        .map(|r| {
            let week = r.date().iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        })
        .collect::<BTreeSet<_>>()
        .len();

    let mut posts_per_month = BTreeMap::new();
    for row in &study {
        *posts_per_month.entry(row.month()).or_insert(0) += 1;
    }

    let consistency = consistency_score(cv, max_gap_days);
    let cadence = cadence_score(consistency, last_90d_posts);

    let summary = Summary {
        author: author.clone(),
        active_start,
        active_end,
        active_days,
        total_posts,
        dated_posts: rows.len(),
        undated_posts: total_posts.saturating_sub(rows.len()),
        total_study_posts: study.len(),
        posts_per_month,
        longest_streak_days,
        max_gap_days,
        interval_cv: round_to(cv, 3),
        last_90d_posts,
        last_90d_weeks_active,
        consistency_score: round_to(consistency, 1),
        cadence_score: round_to(cadence, 1),
        top_topics: top_topics(&study),
    };

    Some((summary, topic_trend(&study)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn row(instant: DateTime<Utc>, is_study: bool, topics: &[&str]) -> AnalyzedRow {
        AnalyzedRow {
            url: format!("https://velog.io/@alice/{}", instant.timestamp()),
            title: String::new(),
            instant,
            is_study,
            major_topic: topics.first().map(|t| (*t).to_string()),
            topics: topics.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    fn author() -> Author {
        Author {
            handle: "alice".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_longest_streak() {
        let active: BTreeSet<NaiveDate> = [
            date(2025, 1, 1),
            date(2025, 1, 2),
            date(2025, 1, 3),
            date(2025, 1, 5),
        ]
        .into_iter()
        .collect();
        assert_eq!(longest_streak(date(2025, 1, 1), date(2025, 1, 5), &active), 3);
    }

    #[test]
    fn test_cv_zero_for_equal_and_no_gaps() {
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        assert_eq!(coefficient_of_variation(&[7, 7, 7]), 0.0);
        assert_eq!(coefficient_of_variation(&[0, 0]), 0.0);
    }

    #[test]
    fn test_cv_uneven_gaps() {
        // mean 2, population std-dev 1
        let cv = coefficient_of_variation(&[1, 3]);
        assert!((cv - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_gaps_floor_partial_days() {
        let a = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 1, 2, 23, 0, 0).unwrap();
        assert_eq!(gaps_in_days(&[a, b]), vec![1]);
    }

    #[test]
    fn test_scores() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(consistency_score(0.0, 0), 100.0));
        assert!(close(consistency_score(2.0, 10), 45.0));
        assert!(close(consistency_score(10.0, 0), 0.0));
        assert!(close(cadence_score(100.0, 20), 79.0));
        assert!(close(cadence_score(50.0, 2), 36.8));
    }

    #[test]
    fn test_top_topics_ties_by_first_appearance() {
        let rows = [
            row(at(2025, 1, 1), true, &["Web/FE"]),
            row(at(2025, 1, 2), true, &["DB/SQL"]),
            row(at(2025, 1, 3), true, &["DB/SQL"]),
            row(at(2025, 1, 4), true, &["Web/FE"]),
            row(at(2025, 1, 5), true, &["Java/JSP/Servlet"]),
            row(at(2025, 1, 6), true, &[]),
        ];
        let refs: Vec<&AnalyzedRow> = rows.iter().collect();
        assert_eq!(
            top_topics(&refs),
            vec![
                ("Web/FE".to_string(), 2),
                ("DB/SQL".to_string(), 2),
                ("Java/JSP/Servlet".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_topic_trend_counts_every_ranked_topic() {
        let rows = [
            row(at(2025, 1, 1), true, &["DB/SQL", "Web/FE"]),
            row(at(2025, 2, 1), true, &["DB/SQL"]),
        ];
        let refs: Vec<&AnalyzedRow> = rows.iter().collect();
        let trend = topic_trend(&refs);
        assert_eq!(trend["DB/SQL"]["2025-01"], 1);
        assert_eq!(trend["DB/SQL"]["2025-02"], 1);
        assert_eq!(trend["Web/FE"].len(), 1);
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(&author(), &[], 4).is_none());
    }

    #[test]
    fn test_summarize_uses_study_rows_only() {
        let rows = vec![
            row(at(2025, 1, 1), false, &[]),
            row(at(2025, 3, 1), true, &["DB/SQL"]),
            row(at(2025, 3, 2), true, &["DB/SQL"]),
            row(at(2025, 3, 3), true, &["Web/FE"]),
        ];
        let (summary, trend) = summarize(&author(), &rows, 6).unwrap();

        assert_eq!(summary.active_start, date(2025, 3, 1));
        assert_eq!(summary.active_end, date(2025, 3, 3));
        assert_eq!(summary.active_days, 3);
        assert_eq!(summary.total_posts, 6);
        assert_eq!(summary.dated_posts, 4);
        assert_eq!(summary.undated_posts, 2);
        assert_eq!(summary.total_study_posts, 3);
        assert_eq!(summary.longest_streak_days, 3);
        assert_eq!(summary.max_gap_days, 1);
        assert_eq!(summary.interval_cv, 0.0);
        assert_eq!(summary.last_90d_posts, 3);
        assert_eq!(summary.posts_per_month["2025-03"], 3);
        assert_eq!(summary.consistency_score, 99.5);
        assert_eq!(summary.top_topics[0], ("DB/SQL".to_string(), 2));
        assert_eq!(trend.len(), 2);
    }

    #[test]
    fn test_summarize_falls_back_to_all_rows() {
        let rows = vec![row(at(2025, 1, 1), false, &[]), row(at(2025, 1, 8), false, &[])];
        let (summary, trend) = summarize(&author(), &rows, 2).unwrap();
        assert_eq!(summary.total_study_posts, 2);
        assert_eq!(summary.max_gap_days, 7);
        assert!(summary.top_topics.is_empty());
        assert!(trend.is_empty());
    }

    #[test]
    fn test_recent_window_and_weeks() {
        let rows = vec![
            row(at(2024, 6, 1), true, &[]),
            // 2025-01-06 and 2025-01-07 share ISO week 2025-W02
            row(at(2025, 1, 6), true, &[]),
            row(at(2025, 1, 7), true, &[]),
            row(at(2025, 3, 1), true, &[]),
        ];
        let (summary, _) = summarize(&author(), &rows, 4).unwrap();
        assert_eq!(summary.last_90d_posts, 3);
        assert_eq!(summary.last_90d_weeks_active, 2);
    }
}
