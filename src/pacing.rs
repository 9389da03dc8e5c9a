//! Human-like pacing.
//!
//! Randomized pauses between UI interactions, user-agent rotation, and the
//! fixed back-off applied when the platform reports a rate limit.

use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

/// Desktop and mobile user agents; one is picked per browser launch.
const USER_AGENTS: &[&str] = &[
    // Windows Chrome
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/97.0.4692.71 Safari/537.36",
    // Windows Firefox
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:96.0) Gecko/20100101 Firefox/96.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:97.0) Gecko/20100101 Firefox/97.0",
    // Mac Chrome
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 12_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 12_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/97.0.4692.71 Safari/537.36",
    // Mac Firefox
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 12.1; rv:96.0) Gecko/20100101 Firefox/96.0",
    // Linux Chrome
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36",
    // iPad
    "Mozilla/5.0 (iPad; CPU OS 15_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/96.0.4664.116 Mobile/15E148 Safari/604.1",
    // iPhone
    "Mozilla/5.0 (iPhone; CPU iPhone OS 15_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/96.0.4664.116 Mobile/15E148 Safari/604.1",
];

/// Phrases in an error message that mean the platform is throttling us.
const RATE_LIMIT_PHRASES: &[&str] = &["rate limit", "too many requests"];

/// Returns a random user agent string.
pub fn random_user_agent() -> String {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string()
}

/// Returns `true` if `message` reports a rate limit.
///
/// # Example
///
/// ```rust
/// use autoposter::pacing::is_rate_limited;
///
/// assert!(is_rate_limited("429 Too Many Requests"));
/// assert!(!is_rate_limited("element not found"));
/// ```
pub fn is_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Sleeps for `wait` if `error` reports a rate limit.
///
/// # Returns
///
/// `true` if the error was a rate limit and the sleep was taken.
pub async fn handle_rate_limiting(
    error: &(dyn std::fmt::Display + Sync),
    wait: Duration,
) -> bool {
    if !is_rate_limited(&error.to_string()) {
        return false;
    }
    warn!(
        "Rate limit detected, waiting for {} seconds",
        wait.as_secs()
    );
    tokio::time::sleep(wait).await;
    true
}

/// Randomized delays between UI interactions.
///
/// Production code uses [`PacingPolicy::human`]; tests use
/// [`PacingPolicy::disabled`] so flows run without wall-clock waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    enabled: bool,
}

impl PacingPolicy {
    pub fn human() -> Self {
        PacingPolicy { enabled: true }
    }

    pub fn disabled() -> Self {
        PacingPolicy { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Waits a uniformly random time between `min_secs` and `max_secs`.
    pub async fn pause(&self, min_secs: f64, max_secs: f64) {
        if !self.enabled {
            return;
        }
        let delay = random_delay(min_secs, max_secs);
        info!("Waiting for {:.2} seconds", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }

    /// Short pause after typing or clicking.
    pub async fn between_steps(&self) {
        self.pause(2.0, 3.0).await;
    }

    /// Pause for a page or dialog to settle.
    pub async fn settle(&self) {
        self.pause(3.0, 5.0).await;
    }

    /// Pause after a navigation or a submit.
    pub async fn after_navigation(&self) {
        self.pause(5.0, 8.0).await;
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        PacingPolicy::human()
    }
}

/// Picks a uniformly random duration in `[min_secs, max_secs]`.
///
/// Bounds are swapped if given in the wrong order; negative bounds count as zero.
pub fn random_delay(min_secs: f64, max_secs: f64) -> Duration {
    let (low, high) = if min_secs <= max_secs {
        (min_secs.max(0.0), max_secs.max(0.0))
    } else {
        (max_secs.max(0.0), min_secs.max(0.0))
    };
    if high <= low {
        return Duration::from_secs_f64(low);
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high))
}
