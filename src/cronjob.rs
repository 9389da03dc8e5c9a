//! Cronjob module for scheduled bot cycles.
//!
//! One bot cycle launches a browser, logs in, posts about a few catalog
//! projects, comments on the latest posts of a few accounts, and always shuts
//! the browser down again. The cycle runs once at startup and then on a cron
//! schedule; a firing is skipped while the previous cycle is still running.

use log::{error, info, warn};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::auth::AuthSession;
use crate::browser::{BrowserAutomation, BrowserOptions, ChromiumBrowser};
use crate::catalog::{Catalog, ACCOUNTS_PER_CYCLE, PROJECTS_PER_CYCLE};
use crate::config::BotConfig;
use crate::crypto::SessionCipher;
use crate::error::{BotError, BotResult};
use crate::generator::{ContentWriter, GeminiClient};
use crate::mailbox::ImapCodeLookup;
use crate::pacing::{handle_rate_limiting, random_user_agent, PacingPolicy};
use crate::posting::PostingOrchestrator;
use crate::session::SessionStore;

/// Chance that a cycle posts about projects.
pub const PROJECT_POST_PROBABILITY: f64 = 0.85;

/// Chance that a cycle comments on other accounts.
pub const COMMENT_PROBABILITY: f64 = 0.7;

/// What one cycle will do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CyclePlan {
    pub post_projects: bool,
    pub comment_on_accounts: bool,
    /// Fixed sleep after a rate-limit error
    pub rate_limit_sleep: Duration,
    pub pacing: PacingPolicy,
}

impl CyclePlan {
    /// Decides at random which tasks run this cycle.
    pub fn roll(rate_limit_sleep: Duration) -> Self {
        let mut rng = rand::thread_rng();
        CyclePlan {
            post_projects: rng.gen_bool(PROJECT_POST_PROBABILITY),
            comment_on_accounts: rng.gen_bool(COMMENT_PROBABILITY),
            rate_limit_sleep,
            pacing: PacingPolicy::human(),
        }
    }
}

/// Outcome counts of one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub posts_published: usize,
    pub comments_published: usize,
    pub failures: usize,
}

/// Runs the tasks of one cycle on an already constructed orchestrator.
///
/// Login failure aborts the cycle. After that, errors are logged per item and
/// the cycle moves on; an error mentioning a rate limit triggers the fixed
/// sleep first. The orchestrator is not shut down here.
pub async fn run_cycle_tasks<B: BrowserAutomation>(
    orchestrator: &mut PostingOrchestrator<B>,
    catalog: &Catalog,
    writer: &ContentWriter,
    plan: CyclePlan,
) -> BotResult<CycleReport> {
    orchestrator.ensure_logged_in().await?;
    let mut report = CycleReport::default();

    if plan.post_projects {
        let projects = catalog.pick_projects(PROJECTS_PER_CYCLE);
        info!("Posting about {} projects", projects.len());
        for project in projects {
            let text = writer.project_post(&project).await;
            match orchestrator.publish_post(&text).await {
                Ok(()) => {
                    info!("Posted about {}", project.name);
                    report.posts_published += 1;
                    plan.pacing.pause(5.0, 10.0).await;
                }
                Err(e) => {
                    error!("Error posting about {}: {}", project.name, e);
                    report.failures += 1;
                    handle_rate_limiting(&e, plan.rate_limit_sleep).await;
                }
            }
        }
    } else {
        info!("Skipping project posts this cycle");
    }

    if plan.comment_on_accounts {
        let accounts = catalog.pick_accounts(ACCOUNTS_PER_CYCLE);
        info!("Commenting on up to {} accounts", accounts.len());
        for username in accounts {
            match comment_on_latest(orchestrator, writer, &username).await {
                Ok(true) => {
                    info!("Commented on post by @{}", username);
                    report.comments_published += 1;
                    plan.pacing.pause(3.0, 7.0).await;
                }
                Ok(false) => info!("No post to comment on for @{}", username),
                Err(e) => {
                    error!("Error commenting on @{}'s post: {}", username, e);
                    report.failures += 1;
                    handle_rate_limiting(&e, plan.rate_limit_sleep).await;
                }
            }
        }
    } else {
        info!("Skipping comments this cycle");
    }

    Ok(report)
}

async fn comment_on_latest<B: BrowserAutomation>(
    orchestrator: &mut PostingOrchestrator<B>,
    writer: &ContentWriter,
    username: &str,
) -> BotResult<bool> {
    let Some(post) = orchestrator.latest_post(username).await? else {
        return Ok(false);
    };
    let comment = writer.comment(&post).await;
    orchestrator.publish_reply(&post.url, &comment).await?;
    Ok(true)
}

/// Runs one full bot cycle with a real browser.
///
/// The browser is shut down (session persisted, process closed) on every
/// exit path once it has been launched.
///
/// # Returns
///
/// - `Ok(CycleReport)`: If the cycle ran, even if individual items failed
/// - `Err(BotError)`: If setup or login failed
pub async fn run_bot_cycle(config: &BotConfig) -> BotResult<CycleReport> {
    info!("Starting bot run");

    let cipher = config
        .session_encryption_key
        .as_deref()
        .map(SessionCipher::from_hex)
        .transpose()?;
    let store = SessionStore::new(&config.session_file, cipher);
    let lookup = ImapCodeLookup::new(&config.imap_host, &config.credentials);
    let pacing = PacingPolicy::human();
    let auth = AuthSession::new(
        config.credentials.clone(),
        store,
        Box::new(lookup),
        config.timeouts,
        pacing,
    );

    let catalog = Catalog::load(config.catalog_path.as_deref());
    let writer = ContentWriter::new(Box::new(GeminiClient::new(
        &config.gemini_api_key,
        &config.gemini_model,
    )));

    let browser = ChromiumBrowser::launch(BrowserOptions {
        headless: config.headless,
        user_agent: random_user_agent(),
        screenshot_dir: config.screenshot_dir.clone(),
        poll_interval: config.timeouts.poll_interval,
        navigation_timeout: Duration::from_secs(60),
    })
    .await?;

    let mut orchestrator = PostingOrchestrator::new(browser, auth, pacing);
    let plan = CyclePlan::roll(config.rate_limit_sleep);
    let result = run_cycle_tasks(&mut orchestrator, &catalog, &writer, plan).await;

    if let Err(e) = orchestrator.shutdown().await {
        warn!("Shutdown after bot run was not clean: {}", e);
    }

    match &result {
        Ok(report) => info!(
            "Bot run completed: {} posts, {} comments, {} failures",
            report.posts_published, report.comments_published, report.failures
        ),
        Err(e) => error!("Bot run failed with error: {}", e),
    }
    result
}

/// Marks a cycle as running until dropped.
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Runs bot cycles one at a time.
#[derive(Clone)]
pub struct BotRunner {
    config: Arc<BotConfig>,
    running: Arc<AtomicBool>,
}

impl BotRunner {
    pub fn new(config: BotConfig) -> Self {
        BotRunner {
            config: Arc::new(config),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claims the runner, or returns `None` if a cycle is already running.
    pub fn try_begin(&self) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                running: self.running.clone(),
            })
    }

    /// Runs one cycle unless another is in progress.
    ///
    /// # Returns
    ///
    /// `false` if the run was skipped.
    pub async fn run_once(&self) -> bool {
        let Some(_guard) = self.try_begin() else {
            warn!("Previous bot run still in progress, skipping this one");
            return false;
        };
        // Errors are logged inside the cycle.
        let _ = run_bot_cycle(&self.config).await;
        true
    }
}

/// Registers the bot cycle on the configured cron schedule.
///
/// # Returns
///
/// - `Ok(JobScheduler)`: The configured (not yet started) scheduler
/// - `Err(BotError::Scheduler)`: If the scheduler cannot be created or the cron expression is invalid
pub async fn start_bot_cronjob(runner: BotRunner) -> BotResult<JobScheduler> {
    let sched = JobScheduler::new().await?;
    let schedule = runner.config().schedule.clone();

    sched
        .add(Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let runner = runner.clone();
            Box::pin(async move {
                info!("Starting scheduled bot run");
                runner.run_once().await;
            })
        })?)
        .await?;

    info!("Cronjob scheduler configured with schedule '{}'", schedule);
    Ok(sched)
}

/// Runs one cycle now, then keeps running cycles on schedule until Ctrl+C.
///
/// # Example
///
/// ```rust,no_run
/// use autoposter::{run_bot_cronjob, BotConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = BotConfig::from_env().expect("configuration");
///     if let Err(e) = run_bot_cronjob(config).await {
///         eprintln!("Cronjob failed: {}", e);
///     }
/// }
/// ```
pub async fn run_bot_cronjob(config: BotConfig) -> BotResult<()> {
    let runner = BotRunner::new(config);
    info!(
        "Bot started, scheduling runs with '{}'",
        runner.config().schedule
    );

    // Run once immediately
    runner.run_once().await;

    let mut sched = start_bot_cronjob(runner).await?;
    sched.start().await?;
    info!("Cronjob scheduler started successfully");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| BotError::Scheduler(format!("failed to listen for Ctrl+C: {}", e)))?;
    info!("Received shutdown signal, stopping cronjob scheduler");

    sched.shutdown().await?;
    info!("Cronjob scheduler stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_runner(schedule: &str) -> BotRunner {
        let vars: HashMap<&str, String> = HashMap::from([
            ("TWITTER_USERNAME", "poster".to_string()),
            ("TWITTER_PASSWORD", "password".to_string()),
            ("EMAIL_ADDRESS", "bot@example.com".to_string()),
            ("GMAIL_APP_PASSWORD", "app-password".to_string()),
            ("GEMINI_API_KEY", "key".to_string()),
            ("BOT_SCHEDULE", schedule.to_string()),
        ]);
        BotRunner::new(BotConfig::from_lookup(|name| vars.get(name).cloned()).unwrap())
    }

    #[test]
    fn test_run_guard_is_exclusive() {
        let runner = test_runner("0 0 */2 * * *");
        let guard = runner.try_begin().unwrap();
        assert!(runner.is_running());
        assert!(runner.clone().try_begin().is_none());

        drop(guard);
        assert!(!runner.is_running());
        assert!(runner.try_begin().is_some());
    }

    #[tokio::test]
    async fn test_run_is_skipped_while_running() {
        let runner = test_runner("0 0 */2 * * *");
        let _guard = runner.try_begin().unwrap();
        assert!(!runner.run_once().await);
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_cycle_futures_can_be_spawned() {
        let runner = test_runner("0 0 */2 * * *");
        let config = runner.config().clone();
        assert_send(async move { runner.run_once().await });
        assert_send(async move { run_bot_cycle(&config).await });
        assert_send(async {
            let error = BotError::ui("publish_post", "post", "429 Too Many Requests");
            handle_rate_limiting(&error, Duration::from_secs(1)).await
        });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_accepts_default_schedule() {
        assert!(start_bot_cronjob(test_runner("0 0 */2 * * *")).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_rejects_invalid_schedule() {
        assert!(matches!(
            start_bot_cronjob(test_runner("every two hours")).await,
            Err(BotError::Scheduler(_))
        ));
    }

    #[test]
    fn test_roll_uses_human_pacing() {
        let plan = CyclePlan::roll(Duration::from_secs(60));
        assert!(plan.pacing.is_enabled());
        assert_eq!(plan.rate_limit_sleep, Duration::from_secs(60));
    }
}
