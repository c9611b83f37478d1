//! Static HTML backend.
//!
//! Fetches a page once over plain HTTP and answers selector queries against
//! the parsed document. No JavaScript runs, so infinite-scroll lists only show
//! their server-rendered first screen; scrolling advances through any further
//! snapshots the page was built with.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{PageRenderer, RenderError, RenderResult, RenderedPage, RendererConfig};

/// Elements whose text never reaches the reader.
const HIDDEN_TEXT_PARENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Renderer that downloads pages with `reqwest`.
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    /// Build a renderer with the configured user agent and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &RendererConfig) -> RenderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.page_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn open(&self, url: &str) -> RenderResult<Box<dyn RenderedPage>> {
        debug!(url = %url, "Fetching page");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Load {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }

        let body = response.text().await?;
        Ok(Box::new(HtmlPage::new(url, body)))
    }
}

/// A parsed HTML document, optionally with later "scrolled" snapshots.
#[derive(Debug)]
pub struct HtmlPage {
    url: String,
    snapshots: Vec<String>,
    position: AtomicUsize,
}

impl HtmlPage {
    #[must_use]
    pub fn new(url: &str, html: String) -> Self {
        Self::from_snapshots(url, vec![html])
    }

    /// Build a page whose document is replaced by the next snapshot on every
    /// scroll; the last snapshot stays once reached.
    #[must_use]
    pub fn from_snapshots(url: &str, snapshots: Vec<String>) -> Self {
        Self {
            url: url.to_string(),
            snapshots,
            position: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn current(&self) -> Html {
        let idx = self.position.load(Ordering::SeqCst);
        let html = self
            .snapshots
            .get(idx)
            .or_else(|| self.snapshots.last())
            .map_or("", String::as_str);
        Html::parse_document(html)
    }
}

fn parse_selector(selector: &str) -> RenderResult<Selector> {
    Selector::parse(selector).map_err(|e| RenderError::Selector {
        selector: selector.to_string(),
        message: format!("{e:?}"),
    })
}

/// Approximate `innerText`: visible text nodes, whitespace-joined.
fn element_text(element: &ElementRef) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| HIDDEN_TEXT_PARENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    parts.join(" ")
}

#[async_trait]
impl RenderedPage for HtmlPage {
    async fn extract_text(&self, selector: &str) -> RenderResult<Vec<String>> {
        let selector = parse_selector(selector)?;
        let document = self.current();
        Ok(document
            .select(&selector)
            .map(|element| element_text(&element))
            .collect())
    }

    async fn extract_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> RenderResult<Vec<Option<String>>> {
        let selector = parse_selector(selector)?;
        let document = self.current();
        Ok(document
            .select(&selector)
            .map(|element| element.value().attr(attribute).map(ToString::to_string))
            .collect())
    }

    async fn scroll_to_bottom(&self) -> RenderResult<()> {
        let last = self.snapshots.len().saturating_sub(1);
        let _ = self
            .position
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| Some((p + 1).min(last)));
        Ok(())
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> bool {
        true
    }

    async fn close(self: Box<Self>) {}
}
