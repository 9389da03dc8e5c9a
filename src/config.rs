//! Configuration module for the autoposter bot.
//!
//! This module contains configuration structures and environment variable handling
//! for the X account, the verification mailbox, the text-generation API and the
//! run loop. Everything is read once at startup and never mutated afterwards.

use log::{debug, error, info, warn};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BotError, BotResult};

/// Default location of the persisted browser session.
pub const DEFAULT_SESSION_FILE: &str = "twitter_session.json";

/// Default cron expression: at minute zero of every second hour.
pub const DEFAULT_SCHEDULE: &str = "0 0 */2 * * *";

/// Default text-generation model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Default IMAP server for the verification mailbox.
pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";

/// Default sleep after a rate-limit error (one hour).
pub const DEFAULT_RATE_LIMIT_SLEEP_SECS: u64 = 3600;

/// Masks a secret for logging, keeping at most eight characters at each end.
///
/// # Example
///
/// ```rust
/// use autoposter::config::mask_secret;
///
/// assert_eq!(mask_secret("abcdefgh12345678zz"), "abcdefgh...345678zz");
/// assert_eq!(mask_secret("short"), "short...");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    let len = chars.len();

    let prefix: String = chars.iter().take(8).collect();
    if len > 16 {
        let suffix: String = chars[len - 8..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        format!("{}...", prefix)
    }
}

/// Login credentials for the X account and its verification mailbox.
#[derive(Clone)]
pub struct Credentials {
    /// X username (handle or email accepted by the login form)
    pub username: String,
    /// X password
    pub password: String,
    /// Address of the mailbox that receives confirmation codes
    pub email_address: String,
    /// App password for the mailbox
    pub email_password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("email_address", &self.email_address)
            .field("email_password", &"[REDACTED]")
            .finish()
    }
}

/// Upper bounds for every UI lookup. No browser step waits longer than these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiTimeouts {
    /// Default wait for a field or control to appear
    pub field: Duration,
    /// Wait for the password field, which appears after a slow transition
    pub password: Duration,
    /// Wait for each alternative selector once the primary one missed
    pub probe: Duration,
    /// Delay between two lookups while waiting
    pub poll_interval: Duration,
}

impl Default for UiTimeouts {
    fn default() -> Self {
        UiTimeouts {
            field: Duration::from_secs(10),
            password: Duration::from_secs(30),
            probe: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Complete runtime configuration of the bot.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// X account and mailbox credentials
    pub credentials: Credentials,
    /// API key for the text-generation service
    pub gemini_api_key: String,
    /// Text-generation model name
    pub gemini_model: String,
    /// IMAP host of the verification mailbox
    pub imap_host: String,
    /// Path of the persisted session file
    pub session_file: PathBuf,
    /// Hex-encoded key for encrypting the session file, if any
    pub session_encryption_key: Option<String>,
    /// Run the browser without a window
    pub headless: bool,
    /// Directory for diagnostic screenshots
    pub screenshot_dir: PathBuf,
    /// Cron expression for the run loop
    pub schedule: String,
    /// Optional JSON file overriding the built-in catalog
    pub catalog_path: Option<PathBuf>,
    /// Fixed sleep after a rate-limit error
    pub rate_limit_sleep: Duration,
    /// UI lookup timeouts
    pub timeouts: UiTimeouts,
}

impl BotConfig {
    /// Creates a new `BotConfig` by loading settings from environment variables.
    ///
    /// # Required Environment Variables
    ///
    /// - `TWITTER_USERNAME`, `TWITTER_PASSWORD`: X account credentials
    /// - `EMAIL_ADDRESS`, `GMAIL_APP_PASSWORD`: mailbox receiving confirmation codes
    /// - `GEMINI_API_KEY`: text-generation API key
    ///
    /// # Optional Environment Variables
    ///
    /// - `GEMINI_MODEL` (default `gemini-1.5-flash`)
    /// - `IMAP_HOST` (default `imap.gmail.com`)
    /// - `SESSION_FILE` (default `twitter_session.json`)
    /// - `SESSION_ENCRYPTION_KEY`: 64 hex characters; enables session encryption
    /// - `HEADLESS` (default `true`)
    /// - `SCREENSHOT_DIR` (default `screenshots`)
    /// - `BOT_SCHEDULE` (default every two hours)
    /// - `BOT_CATALOG_PATH`: JSON catalog override
    /// - `RATE_LIMIT_SLEEP_SECS` (default 3600)
    ///
    /// # Returns
    ///
    /// - `Ok(BotConfig)`: If all required variables are present
    /// - `Err(BotError::Configuration)`: If a required variable is missing or a value is malformed
    pub fn from_env() -> BotResult<Self> {
        info!("Loading bot configuration from environment variables");
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> BotResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = required(&lookup, "TWITTER_USERNAME", false)?;
        let password = required(&lookup, "TWITTER_PASSWORD", true)?;
        let email_address = required(&lookup, "EMAIL_ADDRESS", false)?;
        let email_password = required(&lookup, "GMAIL_APP_PASSWORD", true)?;
        let gemini_api_key = required(&lookup, "GEMINI_API_KEY", true)?;

        let gemini_model = optional(&lookup, "GEMINI_MODEL")
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let imap_host =
            optional(&lookup, "IMAP_HOST").unwrap_or_else(|| DEFAULT_IMAP_HOST.to_string());
        let session_file = PathBuf::from(
            optional(&lookup, "SESSION_FILE").unwrap_or_else(|| DEFAULT_SESSION_FILE.to_string()),
        );

        let session_encryption_key = optional(&lookup, "SESSION_ENCRYPTION_KEY");
        if let Some(key) = &session_encryption_key {
            debug!("Session encryption key (masked): {}", mask_secret(key));
        } else {
            info!("No SESSION_ENCRYPTION_KEY set - session file will be stored unencrypted");
        }

        let headless = match optional(&lookup, "HEADLESS") {
            Some(value) => parse_bool("HEADLESS", &value)?,
            None => true,
        };

        let screenshot_dir = PathBuf::from(
            optional(&lookup, "SCREENSHOT_DIR").unwrap_or_else(|| "screenshots".to_string()),
        );
        let schedule =
            optional(&lookup, "BOT_SCHEDULE").unwrap_or_else(|| DEFAULT_SCHEDULE.to_string());
        let catalog_path = optional(&lookup, "BOT_CATALOG_PATH").map(PathBuf::from);

        let rate_limit_sleep = match optional(&lookup, "RATE_LIMIT_SLEEP_SECS") {
            Some(value) => Duration::from_secs(value.parse().map_err(|e| {
                BotError::Configuration(format!(
                    "RATE_LIMIT_SLEEP_SECS must be a whole number of seconds, got '{}': {}",
                    value, e
                ))
            })?),
            None => Duration::from_secs(DEFAULT_RATE_LIMIT_SLEEP_SECS),
        };

        let config = BotConfig {
            credentials: Credentials {
                username,
                password,
                email_address,
                email_password,
            },
            gemini_api_key,
            gemini_model,
            imap_host,
            session_file,
            session_encryption_key,
            headless,
            screenshot_dir,
            schedule,
            catalog_path,
            rate_limit_sleep,
            timeouts: UiTimeouts::default(),
        };

        info!(
            "Bot configuration loaded for @{} (session file: {}, headless: {}, schedule: '{}')",
            config.credentials.username,
            config.session_file.display(),
            config.headless,
            config.schedule
        );

        Ok(config)
    }
}

fn required<F>(lookup: &F, name: &str, secret: bool) -> BotResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => {
            info!(
                "Found {} environment variable with length: {}",
                name,
                value.len()
            );
            if secret {
                debug!("{} (masked): {}", name, mask_secret(&value));
            } else {
                debug!("{}: {}", name, value);
            }
            Ok(value)
        }
        Some(_) => {
            error!("{} is set but empty", name);
            Err(BotError::Configuration(format!("{} cannot be empty", name)))
        }
        None => {
            error!("Failed to load {} from environment", name);
            error!("Make sure {} environment variable is set", name);
            Err(BotError::Configuration(format!(
                "Missing {} environment variable",
                name
            )))
        }
    }
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Some(value),
        Some(_) => {
            warn!("{} is set but empty, using default", name);
            None
        }
        None => None,
    }
}

fn parse_bool(name: &str, value: &str) -> BotResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BotError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, String> {
        HashMap::from([
            ("TWITTER_USERNAME", "alloraposter".to_string()),
            ("TWITTER_PASSWORD", "hunter2hunter2".to_string()),
            ("EMAIL_ADDRESS", "bot@example.com".to_string()),
            ("GMAIL_APP_PASSWORD", "abcd efgh ijkl mnop".to_string()),
            ("GEMINI_API_KEY", "AIzaSyExampleExampleExample".to_string()),
        ])
    }

    fn load(vars: &HashMap<&'static str, String>) -> BotResult<BotConfig> {
        BotConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base_vars()).unwrap();

        assert_eq!(config.credentials.username, "alloraposter");
        assert_eq!(config.session_file, PathBuf::from(DEFAULT_SESSION_FILE));
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.imap_host, DEFAULT_IMAP_HOST);
        assert_eq!(config.schedule, DEFAULT_SCHEDULE);
        assert!(config.headless);
        assert!(config.session_encryption_key.is_none());
        assert!(config.catalog_path.is_none());
        assert_eq!(config.rate_limit_sleep, Duration::from_secs(3600));
        assert_eq!(config.timeouts, UiTimeouts::default());
    }

    #[test]
    fn test_missing_credential_is_configuration_error() {
        for name in [
            "TWITTER_USERNAME",
            "TWITTER_PASSWORD",
            "EMAIL_ADDRESS",
            "GMAIL_APP_PASSWORD",
            "GEMINI_API_KEY",
        ] {
            let mut vars = base_vars();
            vars.remove(name);
            match load(&vars) {
                Err(BotError::Configuration(message)) => assert!(message.contains(name)),
                other => panic!("expected configuration error for {}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_empty_credential_is_rejected() {
        let mut vars = base_vars();
        vars.insert("TWITTER_PASSWORD", "   ".to_string());
        assert!(matches!(load(&vars), Err(BotError::Configuration(_))));
    }

    #[test]
    fn test_optional_overrides() {
        let mut vars = base_vars();
        vars.insert("SESSION_FILE", "/var/lib/bot/session.json".to_string());
        vars.insert("HEADLESS", "false".to_string());
        vars.insert("BOT_SCHEDULE", "0 30 * * * *".to_string());
        vars.insert("RATE_LIMIT_SLEEP_SECS", "60".to_string());
        vars.insert("BOT_CATALOG_PATH", "catalog.json".to_string());

        let config = load(&vars).unwrap();
        assert_eq!(config.session_file, PathBuf::from("/var/lib/bot/session.json"));
        assert!(!config.headless);
        assert_eq!(config.schedule, "0 30 * * * *");
        assert_eq!(config.rate_limit_sleep, Duration::from_secs(60));
        assert_eq!(config.catalog_path, Some(PathBuf::from("catalog.json")));
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let mut vars = base_vars();
        vars.insert("HEADLESS", "sometimes".to_string());
        assert!(matches!(load(&vars), Err(BotError::Configuration(_))));

        let mut vars = base_vars();
        vars.insert("RATE_LIMIT_SLEEP_SECS", "an hour".to_string());
        assert!(matches!(load(&vars), Err(BotError::Configuration(_))));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let config = load(&base_vars()).unwrap();
        let printed = format!("{:?}", config.credentials);
        assert!(!printed.contains("hunter2hunter2"));
        assert!(!printed.contains("abcd efgh"));
        assert!(printed.contains("alloraposter"));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("0123456789abcdefXYZ"), "01234567...bcdefXYZ");
        assert_eq!(mask_secret("0123456789"), "01234567...");
        assert_eq!(mask_secret("abc"), "abc...");
        assert_eq!(mask_secret(""), "...");
    }
}
