//! Error types for the autoposter bot.
//!
//! Every fallible operation in the crate returns [`BotResult`]. The variants
//! mirror how the run loop reacts to a failure: configuration errors stop the
//! process, UI and service errors fail the current operation only, and a
//! corrupt session file is downgraded to "no session".

use thiserror::Error;

/// Errors produced by the bot.
#[derive(Debug, Error)]
pub enum BotError {
    /// A required setting is missing or malformed. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A UI element could not be located or interacted with in time.
    #[error("{operation} failed for {target}: {reason}")]
    TransientUi {
        /// Name of the operation that was running (e.g. `publish_post`)
        operation: &'static str,
        /// Identifier of the thing being acted on (post, user, chunk)
        target: String,
        /// What went wrong
        reason: String,
    },

    /// An external service (text generation, mailbox) failed.
    #[error("{service} service error: {message}")]
    Service {
        /// Which service failed
        service: &'static str,
        /// Error details
        message: String,
    },

    /// The session file exists but is not usable.
    #[error("session file {path} is unusable: {reason}")]
    SessionCorruption {
        /// Path of the session file
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// The login flow ended in the `Failed` state.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// The browser automation backend reported an error.
    #[error("browser error: {0}")]
    Browser(String),

    /// The cron scheduler could not be created or started.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BotError {
    /// Shorthand for a [`BotError::TransientUi`] error.
    pub fn ui(operation: &'static str, target: impl Into<String>, reason: impl Into<String>) -> Self {
        BotError::TransientUi {
            operation,
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`BotError::Service`] error.
    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        BotError::Service {
            service,
            message: message.into(),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for BotError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BotError::Browser(err.to_string())
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for BotError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        BotError::Scheduler(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type BotResult<T> = Result<T, BotError>;
