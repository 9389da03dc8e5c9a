//! # Autoposter
//!
//! Runs the X posting bot: one bot cycle immediately, then one on every
//! firing of the cron schedule (every two hours by default) until Ctrl+C.
//!
//! ## Environment Variables
//!
//! Variables are read from the process environment, and from a `.env` file in
//! the working directory if present. See `BotConfig::from_env` for the list.
//!
//! ## Example Usage
//!
//! ```bash
//! # Run with the defaults
//! cargo run
//!
//! # Watch the browser and log every step
//! HEADLESS=false RUST_LOG=debug cargo run
//! ```

use autoposter::{run_bot_cronjob, BotConfig};
use log::{error, info};

#[tokio::main]
async fn main() {
    // Load .env before the logger so RUST_LOG from the file applies
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting autoposter for @{}", config.credentials.username);
    if let Err(e) = run_bot_cronjob(config).await {
        error!("Bot stopped with error: {}", e);
        std::process::exit(1);
    }
}
