//! Shared fixtures: an in-memory site served through the static HTML page.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use velog_activity::crawler::{CollectSettings, CrawlSettings, Crawler, ExtractSettings};
use velog_activity::renderer::{
    HtmlPage, PageRenderer, RenderError, RenderResult, RenderedPage,
};

pub const BASE_URL: &str = "https://velog.io";

/// Call counters shared by every page a [`FakeRenderer`] opens.
#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub scrolls: AtomicUsize,
    pub anchor_reads: AtomicUsize,
}

/// Serves canned HTML per URL.
#[derive(Default)]
pub struct FakeRenderer {
    pages: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    /// Selector whose text extraction never completes.
    hang_selector: Option<String>,
    /// Cancel the token when this URL is opened.
    cancel_on_open: Mutex<Option<(String, CancellationToken)>>,
    pub counters: Arc<Counters>,
    pub opened: Mutex<Vec<String>>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page that always shows `html`.
    pub fn with_page(mut self, url: &str, html: String) -> Self {
        self.pages.insert(url.to_string(), vec![html]);
        self
    }

    /// A page that shows the next snapshot after each scroll.
    pub fn with_snapshots(mut self, url: &str, snapshots: Vec<String>) -> Self {
        self.pages.insert(url.to_string(), snapshots);
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn with_hang(mut self, selector: &str) -> Self {
        self.hang_selector = Some(selector.to_string());
        self
    }

    pub fn cancel_when_opening(self, url: &str, token: CancellationToken) -> Self {
        *self.cancel_on_open.lock().unwrap() = Some((url.to_string(), token));
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn open(&self, url: &str) -> RenderResult<Box<dyn RenderedPage>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().unwrap().push(url.to_string());

        if let Some((target, token)) = self.cancel_on_open.lock().unwrap().as_ref() {
            if target == url {
                token.cancel();
            }
        }

        if self.failing.contains(url) {
            return Err(RenderError::Load {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }

        let snapshots = self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| vec!["<html><body></body></html>".to_string()]);

        Ok(Box::new(CountingPage {
            inner: HtmlPage::from_snapshots(url, snapshots),
            counters: Arc::clone(&self.counters),
            hang_selector: self.hang_selector.clone(),
        }))
    }
}

struct CountingPage {
    inner: HtmlPage,
    counters: Arc<Counters>,
    hang_selector: Option<String>,
}

#[async_trait]
impl RenderedPage for CountingPage {
    async fn extract_text(&self, selector: &str) -> RenderResult<Vec<String>> {
        if self.hang_selector.as_deref() == Some(selector) {
            std::future::pending::<()>().await;
        }
        self.inner.extract_text(selector).await
    }

    async fn extract_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> RenderResult<Vec<Option<String>>> {
        if selector == "a" && attribute == "href" {
            self.counters.anchor_reads.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.extract_attribute(selector, attribute).await
    }

    async fn scroll_to_bottom(&self) -> RenderResult<()> {
        self.counters.scrolls.fetch_add(1, Ordering::SeqCst);
        self.inner.scroll_to_bottom().await
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> bool {
        self.inner.wait_for_network_idle(timeout).await
    }

    async fn close(self: Box<Self>) {}
}

/// Profile page listing `slugs` as posts of `handle`, plus a few non-post links.
pub fn profile_html(handle: &str, slugs: &[&str]) -> String {
    let mut anchors = String::new();
    for slug in slugs {
        anchors.push_str(&format!(r#"<a href="/@{handle}/{slug}">{slug}</a>"#));
    }
    format!(
        r#"<html><body>
        <a href="/@{handle}/series/java">series</a>
        <a href="/@{handle}/followers">followers</a>
        <a href="/@someone-else/post">other</a>
        {anchors}
        </body></html>"#
    )
}

/// A post page in the platform's layout.
pub fn post_html(title: &str, body: &str, tags: &[&str], published: &str, code: &[&str]) -> String {
    let tag_links: String = tags
        .iter()
        .map(|t| format!(r#"<a href="/tag/{t}">{t}</a>"#))
        .collect();
    let code_blocks: String = code
        .iter()
        .map(|lang| format!(r#"<pre><code class="language-{lang}">x</code></pre>"#))
        .collect();
    format!(
        r#"<html><body>
        <div class="head"><h1>{title}</h1><span class="date">{published}</span>{tag_links}</div>
        <article><p>{body}</p>{code_blocks}</article>
        </body></html>"#
    )
}

pub fn post_url(handle: &str, slug: &str) -> String {
    format!("{BASE_URL}/@{handle}/{slug}")
}

pub fn profile(handle: &str) -> String {
    format!("{BASE_URL}/@{handle}")
}

/// Settings with every wait set to zero.
pub fn instant_settings() -> CrawlSettings {
    CrawlSettings {
        collect: CollectSettings {
            base_url: BASE_URL.to_string(),
            max_scroll_iterations: 50,
            pause: Duration::ZERO,
            stagnation_threshold: 3,
            initial_settle: Duration::ZERO,
            scroll_settle: Duration::ZERO,
        },
        extract: ExtractSettings {
            timeout: Duration::from_secs(5),
            initial_settle: Duration::ZERO,
            retry_settle: Duration::ZERO,
            hard_limit_floor: Duration::from_secs(8),
            hard_limit_slack: Duration::from_secs(4),
        },
        per_post_delay: Duration::ZERO,
    }
}

pub fn crawler(renderer: Arc<FakeRenderer>) -> Crawler {
    Crawler::new(renderer, instant_settings())
}
