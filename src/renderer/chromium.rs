//! Headless Chrome/Chromium backend.
//!
//! Pages are rendered with JavaScript enabled, which the profile list needs:
//! posts are appended to a virtualized list as the viewport scrolls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, SetBlockedUrLsParams, SetUserAgentOverrideParams,
};
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{PageRenderer, RenderError, RenderResult, RenderedPage, RendererConfig};

/// Interval between readiness probes while waiting for the network to settle.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Number of consecutive identical probes that count as "settled".
const SETTLE_QUIET_PROBES: u32 = 2;

/// Renderer backed by a lazily launched headless browser.
///
/// One browser process is shared by every page opened through this renderer.
pub struct ChromiumRenderer {
    config: RendererConfig,
    browser: Arc<Mutex<Option<Browser>>>,
}

impl ChromiumRenderer {
    #[must_use]
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            browser: Arc::new(Mutex::new(None)),
        }
    }

    /// Launch the browser if not already running.
    async fn ensure_browser(&self) -> RenderResult<()> {
        let mut browser_guard = self.browser.lock().await;
        if browser_guard.is_some() {
            return Ok(());
        }

        info!("Launching headless browser");

        let mut config_builder = BrowserConfig::builder()
            .window_size(self.config.viewport_width, self.config.viewport_height)
            .request_timeout(self.config.page_timeout)
            .no_sandbox()
            .disable_default_args()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-extensions")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--mute-audio")
            .arg("--hide-scrollbars")
            .arg("--lang=ko-KR,ko");

        if let Some(ref chrome_path) = self.config.chrome_path {
            config_builder = config_builder.chrome_executable(chrome_path);
        }

        let browser_config = config_builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        // Spawn handler in background
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        *browser_guard = Some(browser);
        info!("Headless browser launched");

        Ok(())
    }

    async fn prepare_page(&self, page: &Page) -> RenderResult<()> {
        page.set_user_agent(SetUserAgentOverrideParams::new(
            self.config.user_agent.clone(),
        ))
        .await
        .map_err(|e| RenderError::Script(e.to_string()))?;

        let patterns = self.config.blocked_url_patterns();
        if !patterns.is_empty() {
            // Blocking is an optimisation; a page that refuses it still renders.
            if let Err(e) = page.execute(NetworkEnableParams::default()).await {
                warn!("Failed to enable network domain: {e}");
            } else if let Err(e) = page.execute(SetBlockedUrLsParams::new(patterns)).await {
                warn!("Failed to install resource blocking: {e}");
            }
        }
        Ok(())
    }

    /// Shutdown the browser gracefully.
    pub async fn shutdown(&self) {
        let mut browser_guard = self.browser.lock().await;
        if let Some(mut browser) = browser_guard.take() {
            if let Err(e) = browser.close().await {
                error!("Failed to close browser: {e}");
            } else {
                info!("Browser shutdown complete");
            }
        }
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn open(&self, url: &str) -> RenderResult<Box<dyn RenderedPage>> {
        self.ensure_browser().await?;

        let browser_guard = self.browser.lock().await;
        let browser = browser_guard
            .as_ref()
            .ok_or_else(|| RenderError::Launch("browser not initialized".to_string()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Load {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        drop(browser_guard);

        if let Err(e) = self.prepare_page(&page).await {
            let _ = page.close().await;
            return Err(e);
        }

        debug!(url = %url, "Loading page");
        let navigation = tokio::time::timeout(self.config.page_timeout, page.goto(url))
            .await
            .map(|loaded| loaded.map(|_| ()));
        match navigation {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = page.close().await;
                return Err(RenderError::Load {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                // Proceed with whatever DOM has loaded.
                warn!(url = %url, "Navigation did not finish within timeout, continuing");
            }
        }

        Ok(Box::new(ChromiumPage { page }))
    }
}

/// A page open in the shared browser.
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> RenderResult<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| RenderError::Script(e.to_string()))?;
        result
            .into_value::<T>()
            .map_err(|e| RenderError::Script(e.to_string()))
    }
}

/// JSON-quote a value for safe interpolation into a page script.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl RenderedPage for ChromiumPage {
    async fn extract_text(&self, selector: &str) -> RenderResult<Vec<String>> {
        let script = format!(
            "(() => Array.from(document.querySelectorAll({})).map(e => (e.innerText || e.textContent || '').toString()))()",
            js_string(selector)
        );
        self.eval(script).await
    }

    async fn extract_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> RenderResult<Vec<Option<String>>> {
        let script = format!(
            "(() => Array.from(document.querySelectorAll({})).map(e => e.getAttribute({})))()",
            js_string(selector),
            js_string(attribute)
        );
        self.eval(script).await
    }

    async fn scroll_to_bottom(&self) -> RenderResult<()> {
        let _: bool = self
            .eval(
                "(() => { window.scrollTo(0, document.body.scrollHeight); return true; })()"
                    .to_string(),
            )
            .await?;
        Ok(())
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> bool {
        let probe = "(() => [document.readyState, performance.getEntriesByType('resource').length])()";

        let settle = async {
            let mut last_count: Option<u64> = None;
            let mut quiet = 0u32;
            loop {
                match self.eval::<(String, u64)>(probe.to_string()).await {
                    Ok((state, count)) => {
                        if state == "complete" && last_count == Some(count) {
                            quiet += 1;
                            if quiet >= SETTLE_QUIET_PROBES {
                                return;
                            }
                        } else {
                            quiet = 0;
                        }
                        last_count = Some(count);
                    }
                    Err(e) => {
                        debug!("Readiness probe failed: {e}");
                        quiet = 0;
                    }
                }
                tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, settle).await.is_ok()
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.page.close().await {
            warn!("Failed to close page: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string("a[href*='/tag/']"), "\"a[href*='/tag/']\"");
        assert_eq!(js_string("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_renderer_starts_without_browser() {
        let renderer = ChromiumRenderer::new(RendererConfig::default());
        assert!(renderer.browser.try_lock().is_ok_and(|guard| guard.is_none()));
    }
}
