//! Single-post metadata extraction.
//!
//! Each field is extracted independently and defaults to empty on failure, so
//! a page whose layout changed still yields whatever is recognizable. All work
//! for one post shares a hard time budget.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;
use tracing::debug;

use crate::renderer::{PageRenderer, RenderError, RenderResult, RenderedPage};

/// Containers tried for the body text, most specific first.
const BODY_SELECTORS: &[&str] = &["article", "main", "div#root", "body"];

/// Elements scanned for the publish time, in priority order.
const PUBLISHED_SELECTORS: &[&str] = &["time", "span", "div"];

/// Relative-time markers ("minutes/hours/days ago").
const RELATIVE_MARKERS: &[&str] = &["분 전", "시간 전", "일 전"];

/// Longer candidates are whole containers, not a date label.
const MAX_PUBLISHED_CHARS: usize = 80;

const TAG_SELECTOR: &str = "a[href*='/tag/']";
const CODE_SELECTOR: &str = "pre code";

static LANGUAGE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"language-([\w+-]+)").expect("Invalid language class regex"));
static ABSOLUTE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}\.\s*\d{1,2}\.\s*\d{1,2}").expect("Invalid date regex"));

/// Timeouts for one post.
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    /// Page timeout; also feeds the hard limit.
    pub timeout: Duration,
    /// Settle wait right after the page loads.
    pub initial_settle: Duration,
    /// Settle wait of the single scroll-and-retry cycle.
    pub retry_settle: Duration,
    pub hard_limit_floor: Duration,
    pub hard_limit_slack: Duration,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            initial_settle: Duration::from_secs(5),
            retry_settle: Duration::from_secs(2),
            hard_limit_floor: Duration::from_secs(8),
            hard_limit_slack: Duration::from_secs(4),
        }
    }
}

impl ExtractSettings {
    /// Total time one post may take: `max(floor, timeout + slack)`.
    #[must_use]
    pub fn hard_limit(&self) -> Duration {
        self.hard_limit_floor
            .max(self.timeout.saturating_add(self.hard_limit_slack))
    }
}

/// Raw fields read from a post page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPost {
    pub title: String,
    pub body_text: String,
    /// Lowercase, sorted, deduplicated.
    pub code_languages: Vec<String>,
    pub tags: Vec<String>,
    /// Publish time exactly as displayed; parsing happens later.
    pub published_raw: Option<String>,
}

impl ExtractedPost {
    /// Neither a title nor a body could be found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.body_text.is_empty()
    }
}

/// Deadline shared by every step of one extraction.
struct Budget {
    deadline: Instant,
}

impl Budget {
    fn new(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Run one renderer call within the remaining budget. Failures and
    /// timeouts both yield `None`.
    async fn run<T>(&self, step: &str, fut: impl Future<Output = RenderResult<T>>) -> Option<T> {
        if self.exhausted() {
            debug!(step, "Post budget exhausted, skipping");
            return None;
        }
        match tokio::time::timeout(self.remaining(), fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                debug!(step, "Extraction step failed: {e}");
                None
            }
            Err(_) => {
                debug!(step, "Extraction step hit the post budget");
                None
            }
        }
    }

    async fn settle(&self, page: &dyn RenderedPage, wait: Duration) {
        let wait = wait.min(self.remaining());
        if !wait.is_zero() {
            page.wait_for_network_idle(wait).await;
        }
    }
}

/// Render `url` and read its metadata.
///
/// # Errors
///
/// Returns an error only if the page cannot be opened at all; every field
/// failure after that is absorbed.
pub async fn extract_post(
    renderer: &dyn PageRenderer,
    url: &str,
    settings: &ExtractSettings,
) -> RenderResult<ExtractedPost> {
    let budget = Budget::new(settings.hard_limit());

    let page = match tokio::time::timeout(budget.remaining(), renderer.open(url)).await {
        Ok(page) => page?,
        Err(_) => {
            return Err(RenderError::Load {
                url: url.to_string(),
                message: "timed out opening page".to_string(),
            })
        }
    };

    let post = extract_from_page(page.as_ref(), &budget, settings).await;
    page.close().await;

    debug!(
        url = %url,
        title = %post.title,
        body_chars = post.body_text.chars().count(),
        tags = post.tags.len(),
        published = ?post.published_raw,
        "Extracted post"
    );
    Ok(post)
}

async fn extract_from_page(
    page: &dyn RenderedPage,
    budget: &Budget,
    settings: &ExtractSettings,
) -> ExtractedPost {
    budget.settle(page, settings.initial_settle).await;

    let title = budget
        .run("title", page.extract_text("h1"))
        .await
        .and_then(|texts| texts.into_iter().next())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let tags = budget
        .run("tags", page.extract_text(TAG_SELECTOR))
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let classes = budget
        .run("code classes", page.extract_attribute(CODE_SELECTOR, "class"))
        .await
        .unwrap_or_default();
    let declared = budget
        .run(
            "code languages",
            page.extract_attribute(CODE_SELECTOR, "data-language"),
        )
        .await
        .unwrap_or_default();
    let code_languages = code_languages(&classes, &declared);

    let body_text = extract_body(page, budget, settings).await;
    let published_raw = extract_published(page, budget).await;

    ExtractedPost {
        title,
        body_text,
        code_languages,
        tags,
        published_raw,
    }
}

async fn extract_body(
    page: &dyn RenderedPage,
    budget: &Budget,
    settings: &ExtractSettings,
) -> String {
    for selector in BODY_SELECTORS {
        if budget.exhausted() {
            return String::new();
        }
        if let Some(text) = first_non_empty(budget.run(selector, page.extract_text(selector)).await)
        {
            return text;
        }
    }

    if budget.exhausted() {
        return String::new();
    }

    // Lazily rendered bodies sometimes appear only after a scroll.
    debug!("Body empty, retrying once after scroll");
    budget.run("retry scroll", page.scroll_to_bottom()).await;
    budget.settle(page, settings.retry_settle).await;
    first_non_empty(budget.run("article retry", page.extract_text("article")).await)
        .unwrap_or_default()
}

async fn extract_published(page: &dyn RenderedPage, budget: &Budget) -> Option<String> {
    for selector in PUBLISHED_SELECTORS {
        let Some(texts) = budget.run(selector, page.extract_text(selector)).await else {
            continue;
        };
        if let Some(found) = texts
            .iter()
            .map(|t| t.trim())
            .find(|t| looks_like_published_time(t))
        {
            return Some(found.to_string());
        }
    }
    None
}

fn first_non_empty(texts: Option<Vec<String>>) -> Option<String> {
    texts?
        .into_iter()
        .next()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Whether `text` reads as a publish-time label.
#[must_use]
pub fn looks_like_published_time(text: &str) -> bool {
    if text.is_empty() || text.chars().count() > MAX_PUBLISHED_CHARS {
        return false;
    }
    ABSOLUTE_DATE.is_match(text) || RELATIVE_MARKERS.iter().any(|m| text.contains(m))
}

/// Merge per-element class and `data-language` values into a language set.
///
/// An explicit `data-language` wins over the class-derived token of the same
/// element.
#[must_use]
pub fn code_languages(classes: &[Option<String>], declared: &[Option<String>]) -> Vec<String> {
    let count = classes.len().max(declared.len());
    let mut languages = BTreeSet::new();

    for i in 0..count {
        let explicit = declared
            .get(i)
            .and_then(Option::as_deref)
            .map(str::trim)
            .filter(|l| !l.is_empty() && *l != "null");
        let from_class = || {
            classes
                .get(i)
                .and_then(Option::as_deref)
                .and_then(|c| LANGUAGE_CLASS.captures(c))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str())
        };

        if let Some(lang) = explicit.or_else(from_class) {
            languages.insert(lang.to_lowercase());
        }
    }

    languages.into_iter().collect()
}
