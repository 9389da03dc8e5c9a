//! Publishing posts, threads and replies.
//!
//! [`PostingOrchestrator`] owns the browser and the [`AuthSession`] of a bot
//! cycle. Each public operation logs in first if needed, then walks the X web
//! client step by step; a control that cannot be found ends the operation
//! with [`BotError::TransientUi`] and a diagnostic screenshot.

use log::{debug, error, info, warn};

use crate::auth::{is_home_url, AuthSession};
use crate::browser::{locate_any, selectors, BrowserAutomation, FieldHandle};
use crate::catalog::LatestPost;
use crate::error::{BotError, BotResult};
use crate::pacing::PacingPolicy;
use crate::segmenter::{segment, Chunk, PLATFORM_POST_LIMIT};

/// Normalizes a reply target into a status URL.
///
/// # Parameters
///
/// - `target_id`: A full post URL, a site-relative `/user/status/<id>` path, or a numeric status id
///
/// # Example
///
/// ```rust
/// use autoposter::posting::status_url;
///
/// assert_eq!(status_url("1790000000000000000").unwrap(), "https://x.com/i/status/1790000000000000000");
/// assert_eq!(status_url("/jessepollak/status/42").unwrap(), "https://x.com/jessepollak/status/42");
/// ```
pub fn status_url(target_id: &str) -> BotResult<String> {
    let target = target_id.trim();
    if target.starts_with("http://") || target.starts_with("https://") {
        Ok(target.to_string())
    } else if target.starts_with('/') {
        Ok(format!("{}{}", selectors::BASE_URL, target))
    } else if !target.is_empty() && target.chars().all(|c| c.is_ascii_digit()) {
        Ok(format!("{}/i/status/{}", selectors::BASE_URL, target))
    } else {
        Err(BotError::ui(
            "publish_reply",
            target_id,
            "not a post URL or numeric status id",
        ))
    }
}

/// Publishes content through one logged-in browser.
pub struct PostingOrchestrator<B: BrowserAutomation> {
    browser: B,
    auth: AuthSession,
    pacing: PacingPolicy,
}

impl<B: BrowserAutomation> PostingOrchestrator<B> {
    pub fn new(browser: B, auth: AuthSession, pacing: PacingPolicy) -> Self {
        PostingOrchestrator {
            browser,
            auth,
            pacing,
        }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    /// Runs the login flow unless the session is already logged in.
    pub async fn ensure_logged_in(&mut self) -> BotResult<()> {
        if self.auth.is_logged_in() {
            return Ok(());
        }
        self.auth.login(&self.browser).await
    }

    /// Publishes `text` as a single post, or as a thread if it is longer than
    /// one post allows.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The post (or the whole thread) was submitted
    /// - `Err(BotError::LoginFailed)`: If logging in failed
    /// - `Err(BotError::TransientUi)`: If a control could not be found; nothing was submitted
    pub async fn publish_post(&mut self, text: &str) -> BotResult<()> {
        self.ensure_logged_in().await?;

        let length = text.trim().chars().count();
        if length == 0 {
            return Err(BotError::ui("publish_post", "post", "content is empty"));
        }
        if length > PLATFORM_POST_LIMIT {
            info!(
                "Content exceeds the post limit ({} chars), creating thread",
                length
            );
            let chunks = segment(text, PLATFORM_POST_LIMIT);
            return self.publish_thread(&chunks).await;
        }
        self.publish_single(text.trim()).await
    }

    /// Publishes `chunks` as one thread.
    ///
    /// All parts are entered in the standalone composer and submitted
    /// together. If any part cannot be attached the thread is abandoned
    /// before submission.
    pub async fn publish_thread(&mut self, chunks: &[Chunk]) -> BotResult<()> {
        self.ensure_logged_in().await?;
        let Some(first) = chunks.first() else {
            return Err(BotError::ui("publish_thread", "thread", "no parts to publish"));
        };

        let total = chunks.len();
        info!("Posting a thread with {} parts", total);
        let timeouts = *self.auth.timeouts();

        self.browser.navigate(selectors::COMPOSE_URL).await?;
        self.pacing.settle().await;

        info!("Entering content for part 1/{}", total);
        let first_area = selectors::thread_textarea(0);
        let Some(area) = locate_any(
            &self.browser,
            &[first_area.as_str()],
            timeouts.field,
            timeouts.poll_interval,
        )
        .await?
        else {
            return Err(self.fail("publish_thread", "part 1", "text area not found").await);
        };
        self.browser.fill(&area, &first.text).await?;
        self.pacing.between_steps().await;

        for (i, chunk) in chunks.iter().enumerate().skip(1) {
            let part = format!("part {}", i + 1);
            info!("Adding part {}/{} to thread", i + 1, total);

            let add_button = locate_any(
                &self.browser,
                selectors::ADD_POST_BUTTONS,
                timeouts.probe,
                timeouts.poll_interval,
            )
            .await?;
            let Some(add_button) = add_button else {
                return Err(self.fail("publish_thread", &part, "add post control not found").await);
            };
            self.browser.click(&add_button).await?;
            self.pacing.between_steps().await;

            let next_area = selectors::thread_textarea(i);
            let area = locate_any(
                &self.browser,
                &[next_area.as_str()],
                timeouts.probe,
                timeouts.poll_interval,
            )
            .await?;
            let Some(area) = area else {
                return Err(self.fail("publish_thread", &part, "text area not found").await);
            };
            self.browser.fill(&area, &chunk.text).await?;
            debug!("Entered content for {}", part);
            self.pacing.between_steps().await;
        }

        info!("Posting the complete thread");
        let submit = locate_any(
            &self.browser,
            selectors::THREAD_SUBMIT,
            timeouts.probe,
            timeouts.poll_interval,
        )
        .await?;
        let Some(submit) = submit else {
            return Err(self.fail("publish_thread", "thread", "post button not found").await);
        };
        self.browser.click(&submit).await?;
        self.pacing.after_navigation().await;

        info!("Thread with {} parts posted", total);
        Ok(())
    }

    async fn publish_single(&mut self, text: &str) -> BotResult<()> {
        info!("Posting single post");
        let timeouts = *self.auth.timeouts();

        let url = self.browser.current_url().await?;
        if !is_home_url(&url) {
            info!("Navigating to home from {}", url);
            self.browser.navigate(selectors::HOME_URL).await?;
            self.pacing.pause(2.0, 4.0).await;
        }

        let compose = locate_any(
            &self.browser,
            selectors::COMPOSE_BUTTONS,
            timeouts.field,
            timeouts.poll_interval,
        )
        .await?;
        let compose_clicked = match compose {
            Some(button) => {
                self.browser.click(&button).await?;
                true
            }
            None => {
                info!("Compose button selectors missed, trying button text");
                self.browser
                    .click_button_with_text(selectors::COMPOSE_LABELS)
                    .await?
            }
        };
        if !compose_clicked {
            return Err(self.fail("publish_post", "compose", "compose button not found").await);
        }
        self.pacing.pause(2.0, 4.0).await;

        self.enter_text("publish_post", text, timeouts.field).await?;
        self.pacing.pause(2.0, 4.0).await;

        if !self
            .submit("publish_post", selectors::SUBMIT_LABELS, timeouts.probe)
            .await?
        {
            return Err(self.fail("publish_post", "submit", "post button not found").await);
        }

        info!("Waiting for post to be published");
        self.pacing.pause(4.0, 8.0).await;
        if let Err(e) = self.browser.screenshot("after_posting").await {
            debug!("Failed to save after_posting screenshot: {}", e);
        }
        info!("Post published successfully");
        Ok(())
    }

    /// Replies to a post. Reply text is never split into a thread.
    ///
    /// # Parameters
    ///
    /// - `target_id`: Post URL or numeric status id (see [`status_url`])
    /// - `text`: Reply text
    pub async fn publish_reply(&mut self, target_id: &str, text: &str) -> BotResult<()> {
        let url = status_url(target_id)?;
        self.ensure_logged_in().await?;
        let timeouts = *self.auth.timeouts();

        info!("Navigating to post: {}", url);
        self.browser.navigate(&url).await?;
        self.pacing.settle().await;

        let reply = locate_any(
            &self.browser,
            selectors::REPLY_BUTTONS,
            timeouts.field,
            timeouts.poll_interval,
        )
        .await?;
        let Some(reply) = reply else {
            return Err(self.fail("publish_reply", &url, "reply button not found").await);
        };
        self.browser.click(&reply).await?;
        self.pacing.between_steps().await;

        self.enter_text("publish_reply", text, timeouts.field).await?;
        self.pacing.between_steps().await;

        if !self
            .submit("publish_reply", selectors::REPLY_SUBMIT_LABELS, timeouts.probe)
            .await?
        {
            return Err(self.fail("publish_reply", &url, "reply button not found").await);
        }
        self.pacing.settle().await;

        info!("Replied to {}", url);
        Ok(())
    }

    /// Finds the most recent post on `username`'s profile.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(LatestPost))`: The first post on the profile page
    /// - `Ok(None)`: If no post or no status link was found
    pub async fn latest_post(&mut self, username: &str) -> BotResult<Option<LatestPost>> {
        self.ensure_logged_in().await?;
        let timeouts = *self.auth.timeouts();
        let username = username.trim().trim_start_matches('@');

        let profile_url = format!("{}/{}", selectors::BASE_URL, username);
        info!("Getting latest post from {}", profile_url);
        self.browser.navigate(&profile_url).await?;
        self.pacing.settle().await;

        let article = locate_any(
            &self.browser,
            selectors::POST_ARTICLES,
            timeouts.field,
            timeouts.poll_interval,
        )
        .await?;
        let Some(article) = article else {
            warn!("Could not find latest post for @{}", username);
            return Ok(None);
        };

        let link = article.descendant(selectors::STATUS_LINK);
        if self.browser.query_selector(link.selector()).await?.is_none() {
            warn!("Could not find post URL for @{}", username);
            return Ok(None);
        }
        let Some(href) = self.browser.attribute(&link, "href").await? else {
            warn!("Post link for @{} has no href", username);
            return Ok(None);
        };
        let url = if href.starts_with("http") {
            href
        } else {
            format!("{}{}", selectors::BASE_URL, href)
        };
        let text = self.browser.inner_text(&article).await?;

        debug!("Latest post of @{}: {}", username, url);
        Ok(Some(LatestPost {
            url,
            text,
            username: username.to_string(),
        }))
    }

    /// Persists the session and closes the browser.
    ///
    /// The browser is closed even if saving the session fails; the first
    /// error is returned.
    pub async fn shutdown(&mut self) -> BotResult<()> {
        let persisted = self.auth.shutdown(&self.browser).await;
        if let Err(e) = &persisted {
            error!("Failed to save session on shutdown: {}", e);
        }
        let closed = self.browser.close().await;
        if let Err(e) = &closed {
            error!("Error closing browser: {}", e);
        }
        persisted.and(closed)
    }

    async fn enter_text(
        &self,
        operation: &'static str,
        text: &str,
        timeout: std::time::Duration,
    ) -> BotResult<()> {
        let poll = self.auth.timeouts().poll_interval;
        let surface = locate_any(&self.browser, selectors::TEXT_SURFACES, timeout, poll).await?;
        let Some(surface) = surface else {
            return Err(self.fail(operation, "text", "text box not found").await);
        };
        self.browser.fill(&surface, text).await?;
        info!("Entered text using selector: {}", surface.selector());
        Ok(())
    }

    async fn submit(
        &self,
        operation: &'static str,
        labels: &[&str],
        timeout: std::time::Duration,
    ) -> BotResult<bool> {
        let poll = self.auth.timeouts().poll_interval;
        let button: Option<FieldHandle> =
            locate_any(&self.browser, selectors::SUBMIT_BUTTONS, timeout, poll).await?;
        match button {
            Some(button) => {
                self.browser.click(&button).await?;
                info!("{}: clicked {}", operation, button.selector());
                Ok(true)
            }
            None => {
                info!("{}: submit selectors missed, trying button text", operation);
                self.browser.click_button_with_text(labels).await
            }
        }
    }

    async fn fail(&self, operation: &'static str, target: &str, reason: &str) -> BotError {
        error!("{} failed at {}: {}", operation, target, reason);
        let name = format!("{}_error", operation);
        if let Err(e) = self.browser.screenshot(&name).await {
            warn!("Failed to save {} screenshot: {}", name, e);
        }
        BotError::ui(operation, target, reason)
    }
}
