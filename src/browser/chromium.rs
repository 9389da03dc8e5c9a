//! Chromium backend for [`BrowserAutomation`] using the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{BrowserAutomation, FieldHandle};
use crate::error::{BotError, BotResult};
use crate::session::{OriginStorage, SessionState, StoredCookie};

/// How the browser is launched.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Run without a window
    pub headless: bool,
    /// User agent reported to the site
    pub user_agent: String,
    /// Directory for diagnostic screenshots
    pub screenshot_dir: PathBuf,
    /// Pause between two lookups while waiting for an element
    pub poll_interval: Duration,
    /// Upper bound for a page navigation
    pub navigation_timeout: Duration,
}

/// A live Chromium process with a single page.
///
/// The browser is the scarce resource of a bot cycle: it is launched once,
/// shared by reference with the login flow and the posting operations, and
/// released with [`BrowserAutomation::close`].
pub struct ChromiumBrowser {
    browser: Mutex<Browser>,
    page: Page,
    handler: Mutex<Option<JoinHandle<()>>>,
    options: BrowserOptions,
}

impl ChromiumBrowser {
    /// Launches Chromium and opens a blank page.
    pub async fn launch(options: BrowserOptions) -> BotResult<Self> {
        info!("Setting up browser (headless: {})", options.headless);

        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox") // Required for containerized environments
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage") // Avoid /dev/shm size issues in containers
            .arg(format!("--user-agent={}", options.user_agent));
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| BotError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config).await?;

        // Spawn handler task
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        info!("Browser page created");
        debug!("User agent: {}", options.user_agent);

        Ok(ChromiumBrowser {
            browser: Mutex::new(browser),
            page,
            handler: Mutex::new(Some(handle)),
            options,
        })
    }

    async fn evaluate_json<T>(&self, script: &str) -> BotResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|e| BotError::Browser(format!("Unexpected script result: {}", e)))
    }
}

#[async_trait]
impl BrowserAutomation for ChromiumBrowser {
    async fn navigate(&self, url: &str) -> BotResult<()> {
        debug!("Navigating to {}", url);
        match tokio::time::timeout(self.options.navigation_timeout, self.page.goto(url)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(BotError::ui(
                "navigate",
                url,
                format!("page did not load within {:?}", self.options.navigation_timeout),
            )),
        }
    }

    async fn wait_for_field(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> BotResult<Option<FieldHandle>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(Some(FieldHandle::new(selector)));
            }
            let now = Instant::now();
            if now >= deadline {
                debug!("Selector {} not found within {:?}", selector, timeout);
                return Ok(None);
            }
            tokio::time::sleep(self.options.poll_interval.min(deadline - now)).await;
        }
    }

    async fn query_selector(&self, selector: &str) -> BotResult<Option<FieldHandle>> {
        match self.page.find_element(selector).await {
            Ok(_) => Ok(Some(FieldHandle::new(selector))),
            Err(e) => {
                debug!("Selector {} not present: {}", selector, e);
                Ok(None)
            }
        }
    }

    async fn fill(&self, handle: &FieldHandle, text: &str) -> BotResult<()> {
        let element = self.page.find_element(handle.selector()).await?;
        element.click().await?;
        element
            .call_js_fn(
                "function() { if (this.value !== undefined) { this.value = ''; } }",
                false,
            )
            .await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn click(&self, handle: &FieldHandle) -> BotResult<()> {
        self.page
            .find_element(handle.selector())
            .await?
            .click()
            .await?;
        Ok(())
    }

    async fn click_button_with_text(&self, labels: &[&str]) -> BotResult<bool> {
        let labels_json = serde_json::to_string(labels)?;
        let script = format!(
            r#"(() => {{
                const labels = {};
                const buttons = Array.from(document.querySelectorAll('[role="button"]'));
                const button = buttons.find(btn => labels.some(label => btn.textContent.includes(label)));
                if (button) {{
                    button.click();
                    return true;
                }}
                return false;
            }})()"#,
            labels_json
        );
        let clicked: bool = self.evaluate_json(&script).await?;
        debug!("Button with text {:?} clicked: {}", labels, clicked);
        Ok(clicked)
    }

    async fn current_url(&self) -> BotResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn page_text(&self) -> BotResult<String> {
        Ok(self.page.content().await?)
    }

    async fn attribute(&self, handle: &FieldHandle, name: &str) -> BotResult<Option<String>> {
        let element = self.page.find_element(handle.selector()).await?;
        Ok(element.attribute(name).await?)
    }

    async fn inner_text(&self, handle: &FieldHandle) -> BotResult<String> {
        let element = self.page.find_element(handle.selector()).await?;
        Ok(element.inner_text().await?.unwrap_or_default())
    }

    async fn screenshot(&self, name: &str) -> BotResult<()> {
        std::fs::create_dir_all(&self.options.screenshot_dir)?;
        let path = self.options.screenshot_dir.join(format!("{}.png", name));
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), &path)
            .await?;
        debug!("Saved screenshot {}", path.display());
        Ok(())
    }

    async fn export_storage(&self) -> BotResult<SessionState> {
        let cookies: Vec<StoredCookie> = self
            .page
            .get_cookies()
            .await?
            .into_iter()
            .map(|cookie| StoredCookie {
                name: cookie.name,
                value: cookie.value,
                domain: cookie.domain,
                path: cookie.path,
                expires: cookie.expires,
                secure: cookie.secure,
                http_only: cookie.http_only,
            })
            .collect();

        let mut origins = Vec::new();
        let origin = url::Url::parse(&self.current_url().await?)
            .ok()
            .map(|u| u.origin().ascii_serialization())
            .filter(|o| o.starts_with("http"));
        if let Some(origin) = origin {
            let raw: String = self
                .evaluate_json("JSON.stringify(Object.assign({}, window.localStorage))")
                .await?;
            let local_storage: BTreeMap<String, String> = serde_json::from_str(&raw)?;
            origins.push(OriginStorage {
                origin,
                local_storage,
            });
        }

        debug!(
            "Exported {} cookies and {} origins",
            cookies.len(),
            origins.len()
        );
        Ok(SessionState::new(cookies, origins))
    }

    async fn import_storage(&self, state: &SessionState) -> BotResult<()> {
        // Cookies are restored without their expiry; the next export records a
        // fresh jar anyway.
        let params = state
            .cookies
            .iter()
            .map(|cookie| {
                CookieParam::builder()
                    .name(cookie.name.clone())
                    .value(cookie.value.clone())
                    .domain(cookie.domain.clone())
                    .path(cookie.path.clone())
                    .secure(cookie.secure)
                    .http_only(cookie.http_only)
                    .build()
                    .map_err(|e| {
                        BotError::Browser(format!("Failed to build cookie {}: {}", cookie.name, e))
                    })
            })
            .collect::<BotResult<Vec<CookieParam>>>()?;
        self.page.set_cookies(params).await?;

        for origin in &state.origins {
            if origin.local_storage.is_empty() {
                continue;
            }
            self.navigate(&origin.origin).await?;
            let items = serde_json::to_string(&origin.local_storage)?;
            let script = format!(
                r#"(() => {{
                    const items = {};
                    for (const [key, value] of Object.entries(items)) {{
                        window.localStorage.setItem(key, value);
                    }}
                    return true;
                }})()"#,
                items
            );
            let _: bool = self.evaluate_json(&script).await?;
        }

        info!(
            "Restored {} cookies and {} local storage origins",
            state.cookies.len(),
            state.origins.len()
        );
        Ok(())
    }

    async fn close(&self) -> BotResult<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await?;
        if let Err(e) = browser.wait().await {
            warn!("Browser process did not exit cleanly: {}", e);
        }
        if let Some(handle) = self.handler.lock().await.take() {
            let _ = handle.await;
        }
        info!("Browser closed");
        Ok(())
    }
}
