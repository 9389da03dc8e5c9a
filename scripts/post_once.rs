//! One-off Posting Script
//!
//! Logs in with the configured account and publishes the text read from
//! stdin, as a single post or as a thread if it is too long for one post.
//!
//! ```bash
//! echo "gm" | cargo run --bin post_once
//! cargo run --bin post_once < thread.txt
//! ```

use std::io::{self, Read};
use std::time::Duration;

use autoposter::auth::AuthSession;
use autoposter::browser::{BrowserOptions, ChromiumBrowser};
use autoposter::crypto::SessionCipher;
use autoposter::mailbox::ImapCodeLookup;
use autoposter::pacing::{random_user_agent, PacingPolicy};
use autoposter::segmenter::{segment, PLATFORM_POST_LIMIT};
use autoposter::session::SessionStore;
use autoposter::{BotConfig, PostingOrchestrator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    println!("🐦 X One-off Posting Tool");
    println!("=========================");

    let config = BotConfig::from_env()?;

    println!("📝 Reading post text from stdin (end with Ctrl+D)...");
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    let text = text.trim();

    if text.is_empty() {
        println!("❌ Post text cannot be empty!");
        return Err("Post text is required".into());
    }

    let length = text.chars().count();
    if length > PLATFORM_POST_LIMIT {
        let parts = segment(text, PLATFORM_POST_LIMIT).len();
        println!("🧵 {} characters, will be posted as a thread of {} parts", length, parts);
    } else {
        println!("📏 Post length: {} characters", length);
    }

    let cipher = config
        .session_encryption_key
        .as_deref()
        .map(SessionCipher::from_hex)
        .transpose()?;
    let pacing = PacingPolicy::human();
    let auth = AuthSession::new(
        config.credentials.clone(),
        SessionStore::new(&config.session_file, cipher),
        Box::new(ImapCodeLookup::new(&config.imap_host, &config.credentials)),
        config.timeouts,
        pacing,
    );
    let browser = ChromiumBrowser::launch(BrowserOptions {
        headless: config.headless,
        user_agent: random_user_agent(),
        screenshot_dir: config.screenshot_dir.clone(),
        poll_interval: config.timeouts.poll_interval,
        navigation_timeout: Duration::from_secs(60),
    })
    .await?;
    let mut orchestrator = PostingOrchestrator::new(browser, auth, pacing);

    println!("\n🚀 Posting...");
    let result = orchestrator.publish_post(text).await;
    if let Err(e) = orchestrator.shutdown().await {
        println!("⚠️  Shutdown was not clean: {}", e);
    }

    match result {
        Ok(()) => {
            println!("\n🎉 Success! Your post has been published.");
            Ok(())
        }
        Err(e) => {
            println!("\n💥 Failed to publish: {}", e);
            Err(e.into())
        }
    }
}
