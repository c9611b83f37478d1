//! Lightweight list/detail views used by the HTTP API.

use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{clean_body_text, Crawler};
use crate::temporal::TimeNormalizer;

/// One entry of a paginated post list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostListItem {
    pub title: String,
    pub url: String,
    /// Publish date (`YYYY-MM-DD`, platform-local), if it could be resolved.
    pub date: Option<String>,
    pub tags: Vec<String>,
}

/// A single post's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostDetail {
    pub title: String,
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
    pub content: String,
}

fn local_date(normalizer: &TimeNormalizer, raw: Option<&str>) -> Option<String> {
    raw.and_then(|r| normalizer.to_local_date(r))
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// List page `page` (1-based) of `handle`'s posts, `limit` per page.
///
/// Returns `None` when the profile has no posts at all. A page past the end
/// is an empty list.
///
/// # Errors
///
/// Returns an error if the profile or any post on the page cannot be opened.
pub async fn list_posts(
    crawler: &Crawler,
    normalizer: &TimeNormalizer,
    handle: &str,
    page: usize,
    limit: usize,
) -> Result<Option<Vec<PostListItem>>> {
    let links = crawler
        .collect_links(handle, &CancellationToken::new())
        .await?;
    if links.is_empty() {
        return Ok(None);
    }

    let start = page.saturating_sub(1).saturating_mul(limit);
    let mut items = Vec::new();
    for url in links.iter().skip(start).take(limit) {
        let post = crawler.extract(url).await?;
        items.push(PostListItem {
            date: local_date(normalizer, post.published_raw.as_deref()),
            title: post.title,
            url: url.clone(),
            tags: post.tags,
        });
    }

    Ok(Some(items))
}

/// Fetch one post's title, date and body.
///
/// Returns `None` when the page has neither a title nor a body.
///
/// # Errors
///
/// Returns an error if the page cannot be opened.
pub async fn post_detail(
    crawler: &Crawler,
    normalizer: &TimeNormalizer,
    url: &str,
) -> Result<Option<PostDetail>> {
    let post = crawler.extract(url).await?;
    if post.is_empty() {
        return Ok(None);
    }

    Ok(Some(PostDetail {
        created_at: local_date(normalizer, post.published_raw.as_deref()),
        title: post.title,
        content: clean_body_text(&post.body_text),
    }))
}
