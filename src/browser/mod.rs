//! Browser automation capability.
//!
//! The login flow and the posting operations never talk to a browser
//! directly; they go through the [`BrowserAutomation`] trait. Production code
//! uses [`ChromiumBrowser`], tests use a scripted fake.
//!
//! Every lookup is bounded by a timeout. Pages on the target platform change
//! often, so most steps try an ordered list of candidate selectors through
//! [`locate_any`] and take the first one that matches.

mod chromium;
pub mod selectors;

pub use chromium::{BrowserOptions, ChromiumBrowser};

use async_trait::async_trait;
use log::{debug, info};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::BotResult;
use crate::session::SessionState;

/// Reference to an element located on the current page.
///
/// Handles are resolved lazily: the element is looked up again by its
/// selector when it is used, so a handle never dangles across navigations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHandle {
    selector: String,
}

impl FieldHandle {
    pub fn new(selector: impl Into<String>) -> Self {
        FieldHandle {
            selector: selector.into(),
        }
    }

    /// The CSS selector that located this element.
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Handle for the first `child` element inside this one.
    pub fn descendant(&self, child: &str) -> FieldHandle {
        FieldHandle::new(format!("{} {}", self.selector, child))
    }
}

/// Primitive page operations the bot needs.
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Loads `url` in the page.
    async fn navigate(&self, url: &str) -> BotResult<()>;

    /// Waits until `selector` matches an element, or `timeout` elapses.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(FieldHandle))`: The element appeared in time
    /// - `Ok(None)`: The timeout elapsed
    async fn wait_for_field(&self, selector: &str, timeout: Duration)
        -> BotResult<Option<FieldHandle>>;

    /// Checks once, without waiting, whether `selector` matches an element.
    async fn query_selector(&self, selector: &str) -> BotResult<Option<FieldHandle>>;

    /// Replaces the content of an input or editable element with `text`.
    async fn fill(&self, handle: &FieldHandle, text: &str) -> BotResult<()>;

    /// Clicks an element.
    async fn click(&self, handle: &FieldHandle) -> BotResult<()>;

    /// Clicks the first `[role="button"]` whose text contains one of `labels`.
    ///
    /// Returns `false` when no such button exists.
    async fn click_button_with_text(&self, labels: &[&str]) -> BotResult<bool>;

    /// URL of the current page.
    async fn current_url(&self) -> BotResult<String>;

    /// Full markup of the current page.
    async fn page_text(&self) -> BotResult<String>;

    /// Reads attribute `name` of an element.
    async fn attribute(&self, handle: &FieldHandle, name: &str) -> BotResult<Option<String>>;

    /// Rendered text of an element.
    async fn inner_text(&self, handle: &FieldHandle) -> BotResult<String>;

    /// Saves a diagnostic screenshot under `name`.
    async fn screenshot(&self, name: &str) -> BotResult<()>;

    /// Captures cookies and local storage of the current browser context.
    async fn export_storage(&self) -> BotResult<SessionState>;

    /// Loads cookies and local storage into the current browser context.
    async fn import_storage(&self, state: &SessionState) -> BotResult<()>;

    /// Shuts the browser down.
    async fn close(&self) -> BotResult<()>;
}

/// Finds the first of `candidates` present on the page within `timeout`.
///
/// All candidates are polled together until the deadline, and within one
/// round the earlier candidate wins. This is the single lookup primitive every
/// login and posting step is built on.
///
/// # Parameters
///
/// - `browser`: The page to search
/// - `candidates`: Selectors in order of preference
/// - `timeout`: Total time to wait
/// - `poll_interval`: Pause between rounds
///
/// # Returns
///
/// - `Ok(Some(FieldHandle))`: The first candidate that matched
/// - `Ok(None)`: Nothing matched before the deadline
pub async fn locate_any<B>(
    browser: &B,
    candidates: &[&str],
    timeout: Duration,
    poll_interval: Duration,
) -> BotResult<Option<FieldHandle>>
where
    B: BrowserAutomation + ?Sized,
{
    if let [only] = candidates {
        return browser.wait_for_field(only, timeout).await;
    }

    let deadline = Instant::now() + timeout;
    loop {
        for selector in candidates {
            if let Some(handle) = browser.query_selector(selector).await? {
                info!("Found element with selector: {}", selector);
                return Ok(Some(handle));
            }
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(
                "None of {} candidate selectors matched within {:?}",
                candidates.len(),
                timeout
            );
            return Ok(None);
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}
