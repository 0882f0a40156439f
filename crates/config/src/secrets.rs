//! Reversible protection for secret configuration values.
//!
//! Values such as the SMTP password can be stored as ChaCha20-Poly1305
//! ciphertext with the random nonce prepended, encoded as URL-safe base64.
//! The key is derived from the `CROSSTALK_SECRET_KEY` passphrase with Argon2
//! over a fixed salt, so the same passphrase opens previously written values
//! on every restart.

use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use thiserror::Error;
use tracing::warn;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

// Fixed so the derived key is stable across restarts.
const KDF_SALT: &[u8] = b"crosstalk-config";

const PASSPHRASE_VAR: &str = "CROSSTALK_SECRET_KEY";
const DEFAULT_PASSPHRASE: &str = "crosstalk-default-secret";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid encoding")]
    InvalidEncoding,
    #[error("invalid UTF-8")]
    InvalidUtf8,
}

/// Encrypts and reveals secret configuration values.
#[derive(Clone)]
pub struct Secrets {
    cipher: ChaCha20Poly1305,
}

impl Secrets {
    /// Build from the `CROSSTALK_SECRET_KEY` passphrase. Falls back to a
    /// built-in passphrase when the variable is unset, which obfuscates
    /// stored values without protecting them.
    pub fn from_env() -> Result<Self, SecretError> {
        match std::env::var(PASSPHRASE_VAR) {
            Ok(passphrase) if !passphrase.is_empty() => Self::from_passphrase(&passphrase),
            _ => {
                warn!("CROSSTALK_SECRET_KEY is not set, using the built-in passphrase");
                Self::from_passphrase(DEFAULT_PASSPHRASE)
            }
        }
    }

    pub fn from_passphrase(passphrase: &str) -> Result<Self, SecretError> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), KDF_SALT, &mut key)
            .map_err(|_| SecretError::KeyDerivation)?;
        Ok(Self {
            cipher: ChaCha20Poly1305::new((&key).into()),
        })
    }

    /// Encrypt a value for storage. Empty input is returned unchanged.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| SecretError::EncryptionFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    /// Decrypt a stored value. Fails when the input is not ciphertext
    /// produced under the current key.
    pub fn decrypt(&self, encoded: &str) -> Result<String, SecretError> {
        let combined = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| SecretError::InvalidEncoding)?;

        if combined.len() < NONCE_LEN {
            return Err(SecretError::InvalidEncoding);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| SecretError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| SecretError::InvalidUtf8)
    }

    /// True when the value decrypts under the current key.
    pub fn is_encrypted(&self, value: &str) -> bool {
        !value.is_empty() && self.decrypt(value).is_ok()
    }

    /// Decrypt a stored value, passing anything that is not ciphertext
    /// through unchanged so plaintext configuration keeps working.
    pub fn reveal(&self, value: &str) -> String {
        if value.is_empty() {
            return String::new();
        }
        match self.decrypt(value) {
            Ok(plaintext) => plaintext,
            Err(_) => value.to_string(),
        }
    }
}
