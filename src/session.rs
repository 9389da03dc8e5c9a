//! Persisted browser session.
//!
//! A logged-in browser is described by its cookie jar and local storage. This
//! module serializes that snapshot to a single JSON file so the next process
//! can skip the login flow, and reads it back defensively: a file that does
//! not parse (or cannot be decrypted) is reported as absent, never as fatal.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::crypto::{SessionCipher, CIPHER_NAME};
use crate::error::{BotError, BotResult};

/// One browser cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Expiry as seconds since the epoch; negative for session cookies
    #[serde(default = "session_cookie_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn session_cookie_expiry() -> f64 {
    -1.0
}

/// Local storage of one origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginStorage {
    /// Origin such as `https://x.com`
    pub origin: String,
    /// Key/value pairs of `window.localStorage`
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
}

/// Snapshot of an authenticated browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
    pub saved_at: DateTime<Utc>,
}

impl SessionState {
    /// Creates a snapshot stamped with the current time.
    pub fn new(cookies: Vec<StoredCookie>, origins: Vec<OriginStorage>) -> Self {
        SessionState {
            cookies,
            origins,
            saved_at: Utc::now(),
        }
    }

    /// A snapshot is only worth restoring if it carries cookies.
    pub fn is_restorable(&self) -> bool {
        !self.cookies.is_empty()
    }
}

/// On-disk envelope for an encrypted snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct EncryptedEnvelope {
    cipher: String,
    payload: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredFile {
    Encrypted(EncryptedEnvelope),
    Plain(SessionState),
}

/// Reads and writes the single session file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    cipher: Option<SessionCipher>,
}

impl SessionStore {
    /// Creates a store for `path`, encrypting with `cipher` when given.
    pub fn new(path: impl Into<PathBuf>, cipher: Option<SessionCipher>) -> Self {
        SessionStore {
            path: path.into(),
            cipher,
        }
    }

    /// Path of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the session, treating every kind of unusable file as absent.
    ///
    /// # Returns
    ///
    /// - `Some(SessionState)`: If the file exists and is well-formed
    /// - `None`: If the file is missing, unparsable or cannot be decrypted
    pub fn load(&self) -> Option<SessionState> {
        match self.try_load() {
            Ok(state) => state,
            Err(e) => {
                warn!("Invalid session file, will create new session: {}", e);
                None
            }
        }
    }

    /// Loads the session, reporting why an existing file was rejected.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(SessionState))`: If the file exists and is well-formed
    /// - `Ok(None)`: If no session file exists
    /// - `Err(BotError::SessionCorruption)`: If the file exists but is unusable
    /// - `Err(BotError::Io)`: If the file exists but cannot be read
    pub fn try_load(&self) -> BotResult<Option<SessionState>> {
        if !self.path.exists() {
            info!("No session file found at {}", self.path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        let stored: StoredFile =
            serde_json::from_str(&content).map_err(|e| self.corrupt(e.to_string()))?;

        let state = match stored {
            StoredFile::Plain(state) => {
                if self.cipher.is_some() {
                    warn!("Session file is not encrypted; it will be encrypted on next save");
                }
                state
            }
            StoredFile::Encrypted(envelope) => {
                if envelope.cipher != CIPHER_NAME {
                    return Err(self.corrupt(format!("unsupported cipher '{}'", envelope.cipher)));
                }
                let cipher = self.cipher.as_ref().ok_or_else(|| {
                    self.corrupt("file is encrypted but SESSION_ENCRYPTION_KEY is not set".into())
                })?;
                let plaintext = cipher
                    .decrypt(&envelope.payload)
                    .map_err(|reason| self.corrupt(reason))?;
                serde_json::from_slice(&plaintext).map_err(|e| self.corrupt(e.to_string()))?
            }
        };

        info!(
            "Using existing session file: {} ({} cookies, saved at {})",
            self.path.display(),
            state.cookies.len(),
            state.saved_at
        );
        Ok(Some(state))
    }

    /// Writes the session, replacing any previous file.
    ///
    /// The file is written next to its destination first and then renamed, so
    /// an interrupted write never leaves a half-written session behind.
    pub fn save(&self, state: &SessionState) -> BotResult<()> {
        let plaintext = serde_json::to_string_pretty(state)?;

        let content = match &self.cipher {
            Some(cipher) => serde_json::to_string_pretty(&EncryptedEnvelope {
                cipher: CIPHER_NAME.to_string(),
                payload: cipher.encrypt(plaintext.as_bytes())?,
            })?,
            None => plaintext,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;

        info!(
            "Session saved to {} ({} cookies{})",
            self.path.display(),
            state.cookies.len(),
            if self.cipher.is_some() { ", encrypted" } else { "" }
        );
        Ok(())
    }

    /// Removes the session file, if any.
    pub fn clear(&self) -> BotResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            debug!("Removed session file {}", self.path.display());
        }
        Ok(())
    }

    fn corrupt(&self, reason: String) -> BotError {
        BotError::SessionCorruption {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn sample_state() -> SessionState {
        SessionState::new(
            vec![StoredCookie {
                name: "auth_token".to_string(),
                value: "secret-token".to_string(),
                domain: ".x.com".to_string(),
                path: "/".to_string(),
                expires: 1_900_000_000.0,
                secure: true,
                http_only: true,
            }],
            vec![OriginStorage {
                origin: "https://x.com".to_string(),
                local_storage: BTreeMap::from([("theme".to_string(), "dark".to_string())]),
            }],
        )
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"), None);
        assert!(store.try_load().unwrap().is_none());
        assert!(store.load().is_none());
    }

    #[test]
    fn test_plain_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("nested/session.json"), None);

        let state = sample_state();
        store.save(&state).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("auth_token"));
        assert_eq!(store.load(), Some(state));
    }

    #[test]
    fn test_invalid_json_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = SessionStore::new(&path, None);
        assert!(matches!(
            store.try_load(),
            Err(BotError::SessionCorruption { .. })
        ));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_wrong_shape_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"hello": "world"}"#).unwrap();

        assert!(SessionStore::new(&path, None).load().is_none());
    }

    #[test]
    fn test_encrypted_save_hides_cookies() {
        let dir = TempDir::new().unwrap();
        let cipher = SessionCipher::from_hex(TEST_KEY).unwrap();
        let store = SessionStore::new(dir.path().join("session.json"), Some(cipher));

        let state = sample_state();
        store.save(&state).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("secret-token"));
        assert!(raw.contains(CIPHER_NAME));
        assert_eq!(store.load(), Some(state));
    }

    #[test]
    fn test_encrypted_file_without_key_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let cipher = SessionCipher::from_hex(TEST_KEY).unwrap();
        SessionStore::new(&path, Some(cipher))
            .save(&sample_state())
            .unwrap();

        let store = SessionStore::new(&path, None);
        assert!(matches!(
            store.try_load(),
            Err(BotError::SessionCorruption { .. })
        ));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_plain_file_is_read_when_key_configured() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        SessionStore::new(&path, None).save(&sample_state()).unwrap();

        let cipher = SessionCipher::from_hex(TEST_KEY).unwrap();
        assert!(SessionStore::new(&path, Some(cipher)).load().is_some());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"), None);
        store.save(&sample_state()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_restorable_requires_cookies() {
        assert!(sample_state().is_restorable());
        assert!(!SessionState::new(Vec::new(), Vec::new()).is_restorable());
    }
}
