//! # Autoposter Library
//!
//! A bot that publishes AI-written posts, threads and replies on X (Twitter)
//! by driving a real Chromium browser, logging in with email-based
//! verification when the platform asks for it.
//!
//! ## Features
//!
//! - Thread segmentation of long text at sentence, then word boundaries
//! - Login state machine with session restore and mailbox verification codes
//! - Single posts, threads and replies through browser automation
//! - Text generation via Gemini with templated fallbacks
//! - Scheduled bot cycles with randomized, human-like pacing
//! - Structured logging
//!
//! ## Configuration
//!
//! The following environment variables are required:
//! - `TWITTER_USERNAME`, `TWITTER_PASSWORD`: X account credentials
//! - `EMAIL_ADDRESS`, `GMAIL_APP_PASSWORD`: mailbox receiving confirmation codes
//! - `GEMINI_API_KEY`: text-generation API key
//!
//! See [`BotConfig::from_env`] for the optional ones.

pub mod auth;
pub mod browser;
pub mod catalog;
pub mod config;
pub mod cronjob;
pub mod crypto;
pub mod error;
pub mod generator;
pub mod mailbox;
pub mod pacing;
pub mod posting;
pub mod segmenter;
pub mod session;

// Re-export commonly used types and functions
pub use auth::{AuthSession, AuthState};
pub use browser::{BrowserAutomation, ChromiumBrowser};
pub use config::BotConfig;
pub use cronjob::{run_bot_cronjob, run_bot_cycle, start_bot_cronjob, BotRunner};
pub use error::{BotError, BotResult};
pub use posting::PostingOrchestrator;
pub use segmenter::{segment, Chunk};
