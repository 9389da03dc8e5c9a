//! Cryptographic utilities for the persisted session file.
//!
//! The session file holds live authentication cookies. When a key is configured
//! it is stored encrypted with AES-256-GCM so a copied file is useless without
//! the key.

use aes_gcm::{
    aead::{generic_array::typenum::U12, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use log::debug;

use crate::error::{BotError, BotResult};

/// The length of the nonce in bytes (96 bits for AES-GCM)
const NONCE_LENGTH: usize = 12;

/// Name of the cipher recorded in encrypted session envelopes.
pub const CIPHER_NAME: &str = "aes-256-gcm";

/// AES-256-GCM cipher keyed from `SESSION_ENCRYPTION_KEY`.
#[derive(Clone)]
pub struct SessionCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionCipher([REDACTED])")
    }
}

impl SessionCipher {
    /// Creates a cipher from a hex-encoded key.
    ///
    /// The key must be exactly 32 bytes (256 bits) encoded as a 64-character hex string.
    ///
    /// # Returns
    ///
    /// - `Ok(SessionCipher)`: The cipher
    /// - `Err(BotError::Configuration)`: If the key is invalid hex or the wrong length
    pub fn from_hex(key_hex: &str) -> BotResult<Self> {
        let key_bytes = hex::decode(key_hex.trim()).map_err(|e| {
            BotError::Configuration(format!(
                "SESSION_ENCRYPTION_KEY is not valid hex: {}. Generate a key with: openssl rand -hex 32",
                e
            ))
        })?;

        if key_bytes.len() != 32 {
            return Err(BotError::Configuration(format!(
                "SESSION_ENCRYPTION_KEY must be exactly 32 bytes (64 hex chars), got {} bytes",
                key_bytes.len()
            )));
        }

        let mut key: [u8; 32] = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        Ok(SessionCipher { key })
    }

    /// Encrypts `plaintext` with a fresh random nonce.
    ///
    /// The output format is: nonce (12 bytes) || ciphertext || auth_tag, hex-encoded.
    pub fn encrypt(&self, plaintext: &[u8]) -> BotResult<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| BotError::Configuration(format!("Invalid session key: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| BotError::Io(std::io::Error::other(format!(
                "Failed to generate random nonce: {}",
                e
            ))))?;
        let nonce: Nonce<U12> = nonce_bytes.into();

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| BotError::Io(std::io::Error::other(format!("Encryption failed: {}", e))))?;

        let mut result = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        debug!("Session payload encrypted ({} bytes)", plaintext.len());
        Ok(hex::encode(result))
    }

    /// Decrypts a payload produced by [`SessionCipher::encrypt`].
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<u8>)`: The plaintext
    /// - `Err(String)`: Why the payload could not be decrypted (bad hex, too short,
    ///   wrong key or tampered data)
    pub fn decrypt(&self, encrypted_hex: &str) -> Result<Vec<u8>, String> {
        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|e| format!("Invalid session key: {}", e))?;

        let encrypted_bytes = hex::decode(encrypted_hex)
            .map_err(|e| format!("Invalid hex in encrypted session: {}", e))?;

        if encrypted_bytes.len() < NONCE_LENGTH {
            return Err("Encrypted session is too short".to_string());
        }

        let (nonce_bytes, ciphertext) = encrypted_bytes.split_at(NONCE_LENGTH);
        let nonce_array: [u8; NONCE_LENGTH] = nonce_bytes
            .try_into()
            .map_err(|_| "Invalid nonce length".to_string())?;
        let nonce: Nonce<U12> = nonce_array.into();

        let plaintext = cipher
            .decrypt(&nonce, ciphertext)
            .map_err(|_| "Decryption failed - wrong key or corrupted data".to_string())?;

        debug!("Session payload decrypted ({} bytes)", plaintext.len());
        Ok(plaintext)
    }
}
