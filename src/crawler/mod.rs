//! Crawl orchestration: profile links, then one post at a time.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::corpus::{merge_posts, Corpus, PostRecord};
use crate::renderer::PageRenderer;

pub mod links;
pub mod listing;
pub mod post;

pub use links::{collect_post_links, CollectSettings};
pub use listing::{list_posts, post_detail, PostDetail, PostListItem};
pub use post::{extract_post, ExtractSettings, ExtractedPost};

/// Navigation and login prompts that leak into the body text.
static BOILERPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(로그인|팔로우|목록 보기)\s*").expect("Invalid boilerplate regex"));
static REPEATED_WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}").expect("Invalid whitespace regex"));

/// How often progress is logged, in posts.
const PROGRESS_EVERY: usize = 10;

/// Settings for a full crawl.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub collect: CollectSettings,
    pub extract: ExtractSettings,
    /// Courtesy delay between posts.
    pub per_post_delay: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            collect: CollectSettings::default(),
            extract: ExtractSettings::default(),
            per_post_delay: Duration::from_secs(1),
        }
    }
}

/// Result of one crawl pass.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub corpus: Corpus,
    /// Links found on the profile.
    pub discovered: usize,
    /// Posts extracted in this pass.
    pub extracted: usize,
    /// Posts skipped because a prior run already has them.
    pub skipped: usize,
    /// Posts whose extraction failed.
    pub failed: usize,
    /// The pass stopped early on an interrupt.
    pub interrupted: bool,
}

/// Remove navigation boilerplate and collapse whitespace.
#[must_use]
pub fn clean_body_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let stripped = BOILERPLATE.replace_all(text, " ");
    REPEATED_WHITESPACE
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

/// Drives the link collector and post extractor for one author.
#[derive(Clone)]
pub struct Crawler {
    renderer: Arc<dyn PageRenderer>,
    settings: CrawlSettings,
}

impl Crawler {
    #[must_use]
    pub fn new(renderer: Arc<dyn PageRenderer>, settings: CrawlSettings) -> Self {
        Self { renderer, settings }
    }

    #[must_use]
    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Collect every post URL for `handle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile page cannot be opened.
    pub async fn collect_links(
        &self,
        handle: &str,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<String>> {
        collect_post_links(self.renderer.as_ref(), handle, &self.settings.collect, cancel)
            .await
            .with_context(|| format!("Failed to collect post links for @{handle}"))
    }

    /// Extract the raw fields of one post.
    ///
    /// # Errors
    ///
    /// Returns an error if the post page cannot be opened.
    pub async fn extract(&self, url: &str) -> Result<ExtractedPost> {
        extract_post(self.renderer.as_ref(), url, &self.settings.extract)
            .await
            .with_context(|| format!("Failed to extract {url}"))
    }

    /// Extract one post into a record with a cleaned body.
    ///
    /// # Errors
    ///
    /// Returns an error if the post page cannot be opened.
    pub async fn extract_record(&self, url: &str) -> Result<PostRecord> {
        let post = self.extract(url).await?;

        Ok(PostRecord::new(
            url,
            post.title,
            clean_body_text(&post.body_text),
            post.tags,
            post.code_languages,
            post.published_raw.unwrap_or_default(),
        ))
    }

    /// Crawl every post of `handle` not listed in `skip`.
    ///
    /// Individual post failures are logged and skipped. Cancelling `cancel`
    /// stops at the next post boundary and returns what was gathered.
    ///
    /// # Errors
    ///
    /// Returns an error only if link collection cannot start.
    pub async fn crawl_all(
        &self,
        handle: &str,
        skip: &HashSet<String>,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome> {
        let links = self.collect_links(handle, cancel).await?;
        info!(handle = %handle, count = links.len(), "Post links collected");

        let mut outcome = CrawlOutcome {
            corpus: Corpus::empty(handle),
            discovered: links.len(),
            extracted: 0,
            skipped: 0,
            failed: 0,
            interrupted: false,
        };

        let pending: Vec<&String> = links.iter().filter(|url| !skip.contains(*url)).collect();
        outcome.skipped = links.len() - pending.len();
        if outcome.skipped > 0 {
            info!(skipped = outcome.skipped, "Skipping posts already in prior corpus");
        }

        for (i, url) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(done = i, total = pending.len(), "Interrupted, keeping posts gathered so far");
                outcome.interrupted = true;
                break;
            }

            match self.extract_record(url).await {
                Ok(record) => {
                    outcome.corpus.posts.push(record);
                    outcome.extracted += 1;
                }
                Err(e) => {
                    warn!(url = %url, "Skipping post: {e:#}");
                    outcome.failed += 1;
                }
            }

            let done = i + 1;
            if done % PROGRESS_EVERY == 0 {
                info!(done, total = pending.len(), "Crawl progress");
            }

            if done < pending.len() {
                tokio::select! {
                    () = tokio::time::sleep(self.settings.per_post_delay) => {}
                    () = cancel.cancelled() => {
                        debug!("Courtesy delay cut short by interrupt");
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            outcome.interrupted = true;
        }

        info!(
            handle = %handle,
            extracted = outcome.extracted,
            failed = outcome.failed,
            interrupted = outcome.interrupted,
            "Crawl pass finished"
        );
        Ok(outcome)
    }

    /// Crawl `handle`, resuming from `prior` when it belongs to the same
    /// author. The returned corpus holds prior and new posts, deduplicated by
    /// URL with newly extracted records winning.
    ///
    /// # Errors
    ///
    /// Returns an error only if link collection cannot start.
    pub async fn crawl_resuming(
        &self,
        handle: &str,
        prior: Option<Corpus>,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome> {
        let prior = prior.filter(|corpus| {
            let same_author = corpus.handle() == handle;
            if !same_author {
                warn!(
                    existing_handle = %corpus.handle(),
                    handle = %handle,
                    "Discarding prior corpus of another author"
                );
            }
            same_author
        });

        let skip = prior.as_ref().map(Corpus::urls).unwrap_or_default();
        let mut outcome = self.crawl_all(handle, &skip, cancel).await?;

        if let Some(prior) = prior {
            let fresh = std::mem::take(&mut outcome.corpus.posts);
            outcome.corpus.schema_version = prior.schema_version;
            outcome.corpus.posts = merge_posts(prior.posts, fresh);
        }
        Ok(outcome)
    }
}
