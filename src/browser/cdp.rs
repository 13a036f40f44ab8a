//! chromiumoxide-backed implementation of [`BrowserPort`].

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, CloseParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::{AgentError, AgentResult};

use super::ports::{BrowserPort, NavWait};

/// Launch-time options for the managed Chromium instance.
#[derive(Clone, Debug)]
pub struct LaunchOptions {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub viewport: (u32, u32),
    pub default_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            viewport: (1280, 900),
            default_timeout: Duration::from_millis(7_000),
        }
    }
}

pub struct CdpBrowser {
    browser: Browser,
    page: RwLock<Page>,
    default_timeout: Duration,
    _handler_task: tokio::task::JoinHandle<()>,
}

impl CdpBrowser {
    pub async fn launch(options: LaunchOptions) -> AgentResult<Self> {
        let mut builder = BrowserConfig::builder();
        if !options.headless {
            builder = builder.with_head();
        }
        builder = builder
            .no_sandbox()
            .window_size(options.viewport.0, options.viewport.1)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio");
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| AgentError::unhealthy(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AgentError::unhealthy(format!("browser launch: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(?err, "cdp handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AgentError::unhealthy(format!("initial page: {e}")))?;

        Ok(Self {
            browser,
            page: RwLock::new(page),
            default_timeout: options.default_timeout,
            _handler_task: handler_task,
        })
    }

    async fn page(&self) -> Page {
        self.page.read().await.clone()
    }
}

async fn bounded<T, F>(operation: &str, timeout: Duration, fut: F) -> AgentResult<T>
where
    F: std::future::Future<Output = AgentResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::timeout(operation, timeout.as_millis() as u64)),
    }
}

#[async_trait]
impl BrowserPort for CdpBrowser {
    async fn navigate(&self, url: &str, wait: NavWait, timeout: Duration) -> AgentResult<()> {
        let page = self.page().await;
        bounded("navigate", timeout, async {
            page.goto(url)
                .await
                .map_err(|e| AgentError::navigation(e.to_string()))?;
            match wait {
                NavWait::Load => {
                    if let Err(err) = page.wait_for_navigation().await {
                        debug!(?err, "load barrier returned early");
                    }
                }
                NavWait::DomContentLoaded => {
                    let js = r#"/*pp:domready*/ new Promise(resolve => {
                        if (document.readyState !== 'loading') { resolve(true); return; }
                        document.addEventListener('DOMContentLoaded', () => resolve(true), { once: true });
                    })"#;
                    page.evaluate(js)
                        .await
                        .map_err(|e| AgentError::navigation(e.to_string()))?;
                }
                NavWait::NetworkIdle => {
                    let js = r#"/*pp:netidle*/ new Promise(resolve => {
                        let last = performance.getEntriesByType('resource').length;
                        let quiet = 0;
                        const tick = setInterval(() => {
                            const now = performance.getEntriesByType('resource').length;
                            quiet = now === last ? quiet + 1 : 0;
                            last = now;
                            if (quiet >= 5) { clearInterval(tick); resolve(true); }
                        }, 100);
                        setTimeout(() => { clearInterval(tick); resolve(false); }, 5000);
                    })"#;
                    page.evaluate(js)
                        .await
                        .map_err(|e| AgentError::navigation(e.to_string()))?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn back(&self) -> AgentResult<()> {
        let page = self.page().await;
        page.evaluate("/*pp:history*/ window.history.back()")
            .await
            .map_err(|e| AgentError::navigation(e.to_string()))?;
        Ok(())
    }

    async fn forward(&self) -> AgentResult<()> {
        let page = self.page().await;
        page.evaluate("/*pp:history*/ window.history.forward()")
            .await
            .map_err(|e| AgentError::navigation(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&self) -> AgentResult<String> {
        let page = self.page().await;
        let url = page
            .url()
            .await
            .map_err(|e| AgentError::unhealthy(e.to_string()))?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn title(&self) -> AgentResult<String> {
        let page = self.page().await;
        let result = page
            .evaluate("/*pp:title*/ document.title")
            .await
            .map_err(|e| AgentError::eval(e.to_string()))?;
        Ok(result.into_value::<String>().unwrap_or_default())
    }

    async fn html(&self) -> AgentResult<String> {
        let page = self.page().await;
        bounded("html", self.default_timeout, async {
            page.content()
                .await
                .map_err(|e| AgentError::unhealthy(e.to_string()))
        })
        .await
    }

    async fn screenshot_png(&self) -> AgentResult<Vec<u8>> {
        let page = self.page().await;
        let params = CaptureScreenshotParams {
            format: Some(CaptureScreenshotFormat::Png),
            ..Default::default()
        };
        page.screenshot(params)
            .await
            .map_err(|e| AgentError::unhealthy(format!("screenshot: {e}")))
    }

    async fn eval(&self, script: &str) -> AgentResult<Value> {
        let page = self.page().await;
        bounded("eval", self.default_timeout, async {
            let result = page
                .evaluate(script)
                .await
                .map_err(|e| AgentError::eval(e.to_string()))?;
            Ok(result.value().cloned().unwrap_or(Value::Null))
        })
        .await
    }

    async fn click_css(&self, css: &str) -> AgentResult<()> {
        let page = self.page().await;
        let element = page
            .find_element(css)
            .await
            .map_err(|e| AgentError::element_not_found(e.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| AgentError::not_interactable(e.to_string()))?;
        Ok(())
    }

    async fn focus_css(&self, css: &str) -> AgentResult<()> {
        let page = self.page().await;
        let element = page
            .find_element(css)
            .await
            .map_err(|e| AgentError::element_not_found(e.to_string()))?;
        element
            .focus()
            .await
            .map_err(|e| AgentError::not_interactable(e.to_string()))?;
        Ok(())
    }

    async fn type_chars(&self, css: &str, text: &str, per_key_delay: Duration) -> AgentResult<()> {
        let page = self.page().await;
        let element = page
            .find_element(css)
            .await
            .map_err(|e| AgentError::element_not_found(e.to_string()))?;
        for ch in text.chars() {
            element
                .type_str(ch.to_string())
                .await
                .map_err(|e| AgentError::not_interactable(e.to_string()))?;
            if !per_key_delay.is_zero() {
                tokio::time::sleep(per_key_delay).await;
            }
        }
        Ok(())
    }

    async fn press_key(&self, css: Option<&str>, key: &str) -> AgentResult<()> {
        let page = self.page().await;
        let selector = css.unwrap_or("body");
        let element = page
            .find_element(selector)
            .await
            .map_err(|e| AgentError::element_not_found(e.to_string()))?;
        element
            .press_key(key)
            .await
            .map_err(|e| AgentError::not_interactable(e.to_string()))?;
        Ok(())
    }

    async fn hover_css(&self, css: &str) -> AgentResult<()> {
        let page = self.page().await;
        let element = page
            .find_element(css)
            .await
            .map_err(|e| AgentError::element_not_found(e.to_string()))?;
        element
            .hover()
            .await
            .map_err(|e| AgentError::not_interactable(e.to_string()))?;
        Ok(())
    }

    async fn tab_count(&self) -> AgentResult<usize> {
        let pages = self
            .browser
            .pages()
            .await
            .map_err(|e| AgentError::unhealthy(e.to_string()))?;
        Ok(pages.len())
    }

    async fn switch_tab(&self, index: usize) -> AgentResult<()> {
        let pages = self
            .browser
            .pages()
            .await
            .map_err(|e| AgentError::unhealthy(e.to_string()))?;
        let target = pages
            .into_iter()
            .nth(index)
            .ok_or_else(|| AgentError::element_not_found(format!("no tab at index {index}")))?;
        *self.page.write().await = target;
        Ok(())
    }

    async fn recreate(&self) -> AgentResult<()> {
        let fresh = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AgentError::unhealthy(format!("recreate: {e}")))?;
        let old = {
            let mut guard = self.page.write().await;
            std::mem::replace(&mut *guard, fresh)
        };
        let _ = old.evaluate("/*pp:stop*/ window.stop()").await;
        if let Err(err) = old.execute(CloseParams {}).await {
            warn!(?err, "failed to close stale page");
        }
        Ok(())
    }
}
