//! Login state machine.
//!
//! [`AuthSession`] drives the X login flow through an injected
//! [`BrowserAutomation`] and an injected [`CodeLookup`]. Every step is an
//! explicit transition between [`AuthState`] values; a step that cannot find
//! what it needs within its timeout ends the flow in [`AuthState::Failed`].
//!
//! ```text
//! LoggedOut ──(valid session restored)──────────────────────────► LoggedIn
//!     │
//!     ▼
//! AwaitingUsername ──► AwaitingPassword ──(no prompt)──► success check ──► LoggedIn
//!                             │                                  │
//!                             ▼                                  ▼
//!                     AwaitingVerification ──► success check   Failed
//! ```

use log::{debug, error, info, warn};
use std::fmt;

use crate::browser::{locate_any, selectors, BrowserAutomation, FieldHandle};
use crate::config::{Credentials, UiTimeouts};
use crate::error::{BotError, BotResult};
use crate::mailbox::CodeLookup;
use crate::pacing::PacingPolicy;
use crate::session::{SessionState, SessionStore};

/// Where the login flow currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    AwaitingUsername,
    AwaitingPassword,
    AwaitingVerification,
    LoggedIn,
    Failed { reason: String },
}

impl AuthState {
    fn failed(reason: impl Into<String>) -> Self {
        AuthState::Failed {
            reason: reason.into(),
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, AuthState::LoggedIn | AuthState::Failed { .. })
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::LoggedOut => write!(f, "logged out"),
            AuthState::AwaitingUsername => write!(f, "awaiting username"),
            AuthState::AwaitingPassword => write!(f, "awaiting password"),
            AuthState::AwaitingVerification => write!(f, "awaiting verification"),
            AuthState::LoggedIn => write!(f, "logged in"),
            AuthState::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// Owns the login state of one bot cycle.
pub struct AuthSession {
    credentials: Credentials,
    store: SessionStore,
    code_lookup: Box<dyn CodeLookup>,
    timeouts: UiTimeouts,
    pacing: PacingPolicy,
    state: AuthState,
    restorable: Option<SessionState>,
}

impl AuthSession {
    /// Creates a logged-out session, reading any saved browser session from `store`.
    ///
    /// A saved session is only kept for restoring if it parses and carries at
    /// least one cookie; anything else is treated as absent.
    pub fn new(
        credentials: Credentials,
        store: SessionStore,
        code_lookup: Box<dyn CodeLookup>,
        timeouts: UiTimeouts,
        pacing: PacingPolicy,
    ) -> Self {
        let restorable = match store.load() {
            Some(state) if state.is_restorable() => Some(state),
            Some(_) => {
                warn!("Session file holds no cookies, ignoring it");
                None
            }
            None => None,
        };

        AuthSession {
            credentials,
            store,
            code_lookup,
            timeouts,
            pacing,
            state: AuthState::LoggedOut,
            restorable,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state == AuthState::LoggedIn
    }

    /// Whether a saved session is waiting to be restored on the next login.
    pub fn has_restorable_session(&self) -> bool {
        self.restorable.is_some()
    }

    pub fn timeouts(&self) -> &UiTimeouts {
        &self.timeouts
    }

    /// Runs the login flow until it succeeds or fails.
    ///
    /// Does nothing if already logged in. A previous failure is forgotten and
    /// the flow starts over.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The session is `LoggedIn` and has been persisted
    /// - `Err(BotError::LoginFailed)`: The flow ended in `Failed`
    pub async fn login<B>(&mut self, browser: &B) -> BotResult<()>
    where
        B: BrowserAutomation + ?Sized,
    {
        if self.is_logged_in() {
            debug!("Already logged in, skipping login flow");
            return Ok(());
        }

        info!("===== STARTING X LOGIN PROCESS =====");
        self.state = AuthState::LoggedOut;

        while !self.state.is_terminal() {
            let step = match self.state.clone() {
                AuthState::LoggedOut => self.start(browser).await,
                AuthState::AwaitingUsername => self.submit_username(browser).await,
                AuthState::AwaitingPassword => self.submit_password(browser).await,
                AuthState::AwaitingVerification => self.submit_verification_code(browser).await,
                AuthState::LoggedIn | AuthState::Failed { .. } => break,
            };
            let next = step.unwrap_or_else(|e| {
                error!("Login step '{}' failed: {}", self.state, e);
                AuthState::failed(e.to_string())
            });
            debug!("Login state: {} -> {}", self.state, next);
            self.state = next;
        }

        match &self.state {
            AuthState::LoggedIn => {
                info!("===== LOGIN SUCCESSFUL =====");
                if let Err(e) = self.persist(browser).await {
                    warn!("Logged in, but failed to save session: {}", e);
                }
                Ok(())
            }
            AuthState::Failed { reason } => {
                let reason = reason.clone();
                error!("Login failed: {}", reason);
                self.capture(browser, "login_error").await;
                Err(BotError::LoginFailed(reason))
            }
            other => Err(BotError::LoginFailed(format!(
                "login flow stopped in state {}",
                other
            ))),
        }
    }

    /// Writes the browser's current cookies and local storage to the session file.
    pub async fn persist<B>(&self, browser: &B) -> BotResult<()>
    where
        B: BrowserAutomation + ?Sized,
    {
        let state = browser.export_storage().await?;
        self.store.save(&state)
    }

    /// Persists the session if logged in. The browser itself is left open.
    pub async fn shutdown<B>(&mut self, browser: &B) -> BotResult<()>
    where
        B: BrowserAutomation + ?Sized,
    {
        if self.is_logged_in() {
            info!("Saving session before shutdown");
            self.persist(browser).await?;
        } else {
            debug!("Not logged in ({}), nothing to save", self.state);
        }
        Ok(())
    }

    async fn start<B>(&mut self, browser: &B) -> BotResult<AuthState>
    where
        B: BrowserAutomation + ?Sized,
    {
        if let Some(saved) = self.restorable.take() {
            info!(
                "Restoring saved session from {} ({} cookies)",
                self.store.path().display(),
                saved.cookies.len()
            );
            match self.restore(browser, &saved).await {
                Ok(true) => {
                    info!("Saved session accepted, skipping login form");
                    return Ok(AuthState::LoggedIn);
                }
                Ok(false) => warn!("Saved session was rejected, logging in with credentials"),
                Err(e) => warn!("Could not restore saved session: {}", e),
            }
        }

        info!("Navigating to X login page");
        browser.navigate(selectors::LOGIN_URL).await?;
        self.pacing.settle().await;
        self.capture(browser, "1_login_page").await;
        Ok(AuthState::AwaitingUsername)
    }

    async fn restore<B>(&self, browser: &B, saved: &SessionState) -> BotResult<bool>
    where
        B: BrowserAutomation + ?Sized,
    {
        browser.import_storage(saved).await?;
        browser.navigate(selectors::HOME_URL).await?;
        self.pacing.settle().await;
        self.login_succeeded(browser).await
    }

    async fn submit_username<B>(&mut self, browser: &B) -> BotResult<AuthState>
    where
        B: BrowserAutomation + ?Sized,
    {
        info!("STEP 1: Entering username");
        let field = locate_any(
            browser,
            selectors::USERNAME_FIELDS,
            self.timeouts.field,
            self.timeouts.poll_interval,
        )
        .await?;
        let Some(field) = field else {
            return Ok(AuthState::failed(format!(
                "username field not found within {:?}",
                self.timeouts.field
            )));
        };

        browser.fill(&field, &self.credentials.username).await?;
        info!("Entered username: {}", self.credentials.username);
        self.pacing.between_steps().await;

        let clicked = browser.click_button_with_text(selectors::NEXT_LABELS).await?;
        info!("Next button clicked: {}", clicked);
        self.pacing.after_navigation().await;

        Ok(AuthState::AwaitingPassword)
    }

    async fn submit_password<B>(&mut self, browser: &B) -> BotResult<AuthState>
    where
        B: BrowserAutomation + ?Sized,
    {
        info!("STEP 2: Entering password");
        let Some(field) = self.find_password_field(browser).await? else {
            return Ok(AuthState::failed("password field not found"));
        };

        browser.fill(&field, &self.credentials.password).await?;
        info!("Password entered");
        self.pacing.between_steps().await;

        let clicked = browser
            .click_button_with_text(selectors::LOGIN_LABELS)
            .await?;
        info!("Login button clicked: {}", clicked);
        self.pacing.pause(8.0, 12.0).await;

        info!("STEP 3: Checking if verification is needed");
        self.capture(browser, "3_after_login").await;

        if self.verification_needed(browser).await? {
            info!("Verification appears to be needed");
            return Ok(AuthState::AwaitingVerification);
        }

        self.success_transition(browser).await
    }

    async fn find_password_field<B>(&self, browser: &B) -> BotResult<Option<FieldHandle>>
    where
        B: BrowserAutomation + ?Sized,
    {
        let primary = locate_any(
            browser,
            &[selectors::PASSWORD_FIELD],
            self.timeouts.password,
            self.timeouts.poll_interval,
        )
        .await?;
        if primary.is_some() {
            info!("Password field found");
            return Ok(primary);
        }

        warn!("Standard password field not found, trying alternative selectors");
        for selector in selectors::PASSWORD_ALTERNATIVES {
            debug!("Trying selector: {}", selector);
            let found = locate_any(
                browser,
                &[*selector],
                self.timeouts.probe,
                self.timeouts.poll_interval,
            )
            .await?;
            if found.is_some() {
                info!("Found password field with alternative selector: {}", selector);
                return Ok(found);
            }
        }
        Ok(None)
    }

    async fn submit_verification_code<B>(&mut self, browser: &B) -> BotResult<AuthState>
    where
        B: BrowserAutomation + ?Sized,
    {
        info!("STEP 4: Getting verification code from mailbox");
        let Some(code) = self.code_lookup.fetch_verification_code().await else {
            return Ok(AuthState::failed("verification code not found in mailbox"));
        };
        debug!("Retrieved verification code: {}", code);

        let field = locate_any(
            browser,
            selectors::VERIFICATION_FIELDS,
            self.timeouts.field,
            self.timeouts.poll_interval,
        )
        .await?;
        let Some(field) = field else {
            return Ok(AuthState::failed("verification code input not found"));
        };

        browser.fill(&field, &code).await?;
        self.pacing.between_steps().await;
        self.capture(browser, "4_verification_code_entered").await;

        let clicked = browser
            .click_button_with_text(selectors::VERIFY_LABELS)
            .await?;
        info!("Verify button clicked: {}", clicked);
        self.pacing.after_navigation().await;

        self.success_transition(browser).await
    }

    async fn success_transition<B>(&self, browser: &B) -> BotResult<AuthState>
    where
        B: BrowserAutomation + ?Sized,
    {
        info!("Checking if login was successful");
        self.pacing.after_navigation().await;
        self.capture(browser, "5_final_state").await;

        if self.login_succeeded(browser).await? {
            Ok(AuthState::LoggedIn)
        } else {
            let url = browser.current_url().await.unwrap_or_default();
            Ok(AuthState::failed(format!(
                "no logged-in indicator found (url: {})",
                url
            )))
        }
    }

    /// Verification is needed only while still inside the login flow and the
    /// page mentions a code.
    async fn verification_needed<B>(&self, browser: &B) -> BotResult<bool>
    where
        B: BrowserAutomation + ?Sized,
    {
        let url = browser.current_url().await?;
        info!("Current URL after login: {}", url);
        if !in_login_flow(&url) {
            return Ok(false);
        }
        let content = browser.page_text().await?;
        Ok(mentions_verification(&content))
    }

    async fn login_succeeded<B>(&self, browser: &B) -> BotResult<bool>
    where
        B: BrowserAutomation + ?Sized,
    {
        let url = browser.current_url().await?;
        info!("Final URL: {}", url);
        if is_home_url(&url) {
            return Ok(true);
        }

        let marker = locate_any(
            browser,
            selectors::LOGGED_IN_MARKERS,
            self.timeouts.probe,
            self.timeouts.poll_interval,
        )
        .await?;
        match marker {
            Some(marker) => {
                info!("Logged-in marker present: {}", marker.selector());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn capture<B>(&self, browser: &B, name: &str)
    where
        B: BrowserAutomation + ?Sized,
    {
        match browser.screenshot(name).await {
            Ok(()) => debug!("Saved {} screenshot", name),
            Err(e) => warn!("Failed to save {} screenshot: {}", name, e),
        }
    }
}

/// Path of `url`, lowercased. Query strings are ignored because the login
/// redirect carries `redirect_after_login=%2Fhome`.
fn url_path(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_lowercase(),
        Err(_) => url.split('?').next().unwrap_or_default().to_lowercase(),
    }
}

pub(crate) fn is_home_url(url: &str) -> bool {
    url_path(url).contains(selectors::HOME_PATH)
}

fn in_login_flow(url: &str) -> bool {
    let path = url_path(url);
    selectors::LOGIN_FLOW_PATHS
        .iter()
        .any(|fragment| path.contains(fragment))
        && !path.contains(selectors::HOME_PATH)
}

fn mentions_verification(content: &str) -> bool {
    let content = content.to_lowercase();
    selectors::VERIFICATION_KEYWORDS
        .iter()
        .any(|keyword| content.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_login_flow() {
        assert!(in_login_flow("https://x.com/i/flow/login"));
        assert!(in_login_flow("https://x.com/login?redirect=1"));
        assert!(!in_login_flow("https://x.com/home"));
        assert!(in_login_flow(
            "https://x.com/i/flow/login?redirect_after_login=%2Fhome"
        ));
        assert!(!in_login_flow("https://x.com/explore"));
    }

    #[test]
    fn test_mentions_verification_is_case_insensitive() {
        assert!(mentions_verification("<h1>Enter your Verification Code</h1>"));
        assert!(mentions_verification("Please CONFIRM it's you"));
        assert!(!mentions_verification("<h1>Enter your password</h1>"));
    }

    #[test]
    fn test_is_home_url() {
        assert!(is_home_url("https://x.com/home"));
        assert!(is_home_url("https://X.com/HOME?lang=en"));
        assert!(!is_home_url("https://x.com/i/flow/login"));
        assert!(!is_home_url(
            "https://x.com/i/flow/login?redirect_after_login=%2Fhome"
        ));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(AuthState::AwaitingPassword.to_string(), "awaiting password");
        assert_eq!(
            AuthState::failed("timeout").to_string(),
            "failed (timeout)"
        );
        assert!(AuthState::LoggedIn.is_terminal());
        assert!(!AuthState::AwaitingVerification.is_terminal());
    }
}
