//! Post-link collection from an author's profile page.
//!
//! The profile lists posts in a virtualized, infinitely scrolling list. Links
//! are gathered by alternating "read anchors" and "scroll + settle" until the
//! accumulated set stops growing.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::DEFAULT_BASE_URL;
use crate::renderer::{PageRenderer, RenderError, RenderResult};

/// Profile sub-paths that are not posts.
const EXCLUDED_SEGMENTS: &[&str] = &["/series/", "/tag/", "/followers", "/following"];

/// Tuning for the scroll loop.
#[derive(Debug, Clone)]
pub struct CollectSettings {
    /// Base URL of the platform, e.g. `https://velog.io`.
    pub base_url: String,
    pub max_scroll_iterations: usize,
    /// Fixed wait after each scroll.
    pub pause: Duration,
    /// Consecutive no-growth iterations after which the list is considered
    /// exhausted.
    pub stagnation_threshold: u32,
    /// Settle wait right after the profile loads.
    pub initial_settle: Duration,
    /// Settle wait after each scroll.
    pub scroll_settle: Duration,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_scroll_iterations: 200,
            pause: Duration::from_secs(1),
            stagnation_threshold: 3,
            initial_settle: Duration::from_secs(6),
            scroll_settle: Duration::from_secs(3),
        }
    }
}

/// Profile page URL for `handle`.
#[must_use]
pub fn profile_url(base_url: &str, handle: &str) -> String {
    format!("{}/@{handle}", base_url.trim_end_matches('/'))
}

/// Keep hrefs that point at one of `handle`'s posts, resolved against `base`.
pub fn filter_post_links<'a>(
    hrefs: impl IntoIterator<Item = &'a str>,
    handle: &str,
    base: &Url,
) -> BTreeSet<String> {
    let marker = format!("/@{handle}/");
    let mut out = BTreeSet::new();

    for href in hrefs {
        let href = href.trim();
        // Skip empty hrefs, anchors, and javascript
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
        {
            continue;
        }
        if !href.contains(&marker) || EXCLUDED_SEGMENTS.iter().any(|s| href.contains(s)) {
            continue;
        }

        match base.join(href) {
            Ok(resolved) if resolved.as_str().contains(&marker) => {
                out.insert(resolved.to_string());
            }
            Ok(_) => {}
            Err(e) => debug!(href = %href, "Skipping unresolvable link: {e}"),
        }
    }

    out
}

/// Scroll `handle`'s profile until no new post links appear.
///
/// An empty set means the profile has no posts (or does not exist); it is
/// not a transient failure.
///
/// # Errors
///
/// Returns an error only if the profile page cannot be opened.
pub async fn collect_post_links(
    renderer: &dyn PageRenderer,
    handle: &str,
    settings: &CollectSettings,
    cancel: &CancellationToken,
) -> RenderResult<BTreeSet<String>> {
    let base = Url::parse(&settings.base_url).map_err(|e| RenderError::Load {
        url: settings.base_url.clone(),
        message: e.to_string(),
    })?;
    let url = profile_url(&settings.base_url, handle);

    info!(handle = %handle, url = %url, "Collecting post links");
    let page = renderer.open(&url).await?;
    page.wait_for_network_idle(settings.initial_settle).await;

    let mut links = BTreeSet::new();
    let mut last_count: Option<usize> = None;
    let mut stagnant = 0u32;

    for iteration in 1..=settings.max_scroll_iterations {
        if cancel.is_cancelled() {
            info!(handle = %handle, "Link collection interrupted");
            break;
        }

        match page.extract_attribute("a", "href").await {
            Ok(hrefs) => {
                let found = filter_post_links(
                    hrefs.iter().flatten().map(String::as_str),
                    handle,
                    &base,
                );
                links.extend(found);
            }
            Err(e) => warn!(iteration, "Failed to read anchors: {e}"),
        }

        if last_count == Some(links.len()) {
            stagnant += 1;
        } else {
            stagnant = 0;
        }
        last_count = Some(links.len());

        debug!(iteration, links = links.len(), stagnant, "Scroll iteration");
        if stagnant >= settings.stagnation_threshold {
            debug!(iteration, "Link count stagnated, stopping");
            break;
        }

        if let Err(e) = page.scroll_to_bottom().await {
            warn!(iteration, "Failed to scroll: {e}");
        }
        tokio::select! {
            () = tokio::time::sleep(settings.pause) => {}
            () = cancel.cancelled() => {}
        }
        page.wait_for_network_idle(settings.scroll_settle).await;
    }

    page.close().await;

    info!(handle = %handle, count = links.len(), "Link collection finished");
    Ok(links)
}
