//! Rendered-page access.
//!
//! The collector and extractor only talk to a page through [`RenderedPage`],
//! so the same algorithms run against headless Chromium in production and
//! against static HTML in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod chromium;
pub mod html;

pub use chromium::ChromiumRenderer;
pub use html::{HtmlPage, HttpRenderer};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch renderer: {0}")]
    Launch(String),
    #[error("failed to load {url}: {message}")]
    Load { url: String, message: String },
    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
    #[error("page script failed: {0}")]
    Script(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Resource types a renderer can refuse to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    Font,
    Stylesheet,
    Media,
}

impl ResourceType {
    /// Parse a resource type name as used in configuration.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "image" | "images" => Some(Self::Image),
            "font" | "fonts" => Some(Self::Font),
            "stylesheet" | "css" => Some(Self::Stylesheet),
            "media" => Some(Self::Media),
            _ => None,
        }
    }

    /// URL patterns (in the `Network.setBlockedURLs` wildcard syntax) that
    /// cover this resource type.
    #[must_use]
    pub fn url_patterns(self) -> &'static [&'static str] {
        match self {
            Self::Image => &[
                "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.avif",
            ],
            Self::Font => &["*.woff", "*.woff2", "*.ttf", "*.otf", "*.eot"],
            Self::Stylesheet => &["*.css"],
            Self::Media => &["*.mp4", "*.webm", "*.mp3", "*.ogg"],
        }
    }
}

/// Renderer configuration shared by all backends.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Viewport width in pixels.
    pub viewport_width: u32,
    /// Viewport height in pixels.
    pub viewport_height: u32,
    /// Navigation timeout.
    pub page_timeout: Duration,
    /// Path to Chrome/Chromium executable (None for auto-detection).
    pub chrome_path: Option<String>,
    /// Resource types that are never fetched.
    pub blocked_resources: Vec<ResourceType>,
    pub user_agent: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 900,
            page_timeout: Duration::from_secs(20),
            chrome_path: None,
            blocked_resources: vec![ResourceType::Image, ResourceType::Font],
            user_agent: crate::constants::CRAWLER_USER_AGENT.to_string(),
        }
    }
}

impl RendererConfig {
    /// All blocked URL patterns, in configuration order.
    #[must_use]
    pub fn blocked_url_patterns(&self) -> Vec<String> {
        self.blocked_resources
            .iter()
            .flat_map(|r| r.url_patterns().iter().map(|p| (*p).to_string()))
            .collect()
    }
}

/// Something that can load a URL into a [`RenderedPage`].
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `url` and return a handle to the rendered document.
    async fn open(&self, url: &str) -> RenderResult<Box<dyn RenderedPage>>;
}

/// Query and control operations over one loaded document.
#[async_trait]
pub trait RenderedPage: Send + Sync {
    /// Text of every element matching `selector`, in document order.
    async fn extract_text(&self, selector: &str) -> RenderResult<Vec<String>>;

    /// Value of `attribute` for every element matching `selector`, in document
    /// order. Elements without the attribute yield `None` so results stay
    /// aligned with [`RenderedPage::extract_text`].
    async fn extract_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> RenderResult<Vec<Option<String>>>;

    async fn scroll_to_bottom(&self) -> RenderResult<()>;

    /// Wait until network activity settles. Returns `false` if `timeout`
    /// elapsed first; that is not an error.
    async fn wait_for_network_idle(&self, timeout: Duration) -> bool;

    /// Release the page. Errors are logged, never returned.
    async fn close(self: Box<Self>);
}
