//! Session Encryption Utility
//!
//! Rewrites the saved browser session file encrypted with AES-256-GCM.
//! Requires SESSION_ENCRYPTION_KEY; SESSION_FILE defaults to
//! `twitter_session.json`.

use autoposter::config::DEFAULT_SESSION_FILE;
use autoposter::crypto::SessionCipher;
use autoposter::session::SessionStore;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    println!("🔐 Session Encryption Utility");
    println!("=============================");
    println!();

    let key = match std::env::var("SESSION_ENCRYPTION_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("❌ Error: SESSION_ENCRYPTION_KEY environment variable is not set.");
            eprintln!();
            eprintln!("Generate a key with:");
            eprintln!("  openssl rand -hex 32");
            eprintln!();
            eprintln!("Then set it:");
            eprintln!("  export SESSION_ENCRYPTION_KEY=\"your_64_char_hex_key\"");
            std::process::exit(1);
        }
    };
    let cipher = SessionCipher::from_hex(&key)?;

    let path = std::env::var("SESSION_FILE").unwrap_or_else(|_| DEFAULT_SESSION_FILE.to_string());
    let store = SessionStore::new(&path, Some(cipher));

    // Reads plaintext files as well as files already encrypted with this key
    let state = match store.try_load()? {
        Some(state) => state,
        None => {
            eprintln!("❌ Error: no session file at {}", path);
            std::process::exit(1);
        }
    };

    store.save(&state)?;
    println!("✅ Session file encrypted successfully!");
    println!("📁 {} ({} cookies)", path, state.cookies.len());
    println!();
    println!("📝 Keep SESSION_ENCRYPTION_KEY set when running the bot.");

    Ok(())
}
