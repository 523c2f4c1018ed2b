//! At-rest encryption for cached voter and user records.
//!
//! The key is derived with Argon2 from the account password and a random
//! per-installation salt kept next to the cache. Sealed payloads are
//! `nonce (12 bytes) || ciphertext+tag`.

use std::fmt;
use std::path::Path;

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const SALT_FILE: &str = "salt.bin";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    Kdf(String),

    #[error("Encryption failed")]
    Seal,

    /// Wrong key or a corrupted file; the two are indistinguishable.
    #[error("Cache file could not be decrypted")]
    Open,

    #[error("Salt file error: {0}")]
    Salt(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct CacheKey([u8; KEY_LEN]);

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CacheKey(..)")
    }
}

impl CacheKey {
    pub fn derive(password: &str, salt: &[u8]) -> Result<Self, CryptoError> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(password.as_bytes(), salt, &mut key)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        Ok(Self(key))
    }

    /// Derive the key for the cache in `dir`, creating its salt on first use.
    pub fn for_dir(dir: &Path, password: &str) -> Result<Self, CryptoError> {
        let salt = load_or_create_salt(dir)?;
        Self::derive(password, &salt)
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Seal)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() <= NONCE_LEN {
            return Err(CryptoError::Open);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Open)
    }
}

fn load_or_create_salt(dir: &Path) -> Result<Vec<u8>, CryptoError> {
    let path = dir.join(SALT_FILE);
    if path.exists() {
        let salt = std::fs::read(&path)?;
        if salt.len() == SALT_LEN {
            return Ok(salt);
        }
        tracing::warn!(len = salt.len(), "Salt file has unexpected length, regenerating");
    }
    std::fs::create_dir_all(dir)?;
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    std::fs::write(&path, &salt)?;
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = CacheKey::derive("correct horse", b"0123456789abcdef").unwrap();
        let sealed = key.seal(b"Rahim Uddin, 01712345678").unwrap();
        assert!(!sealed.windows(5).any(|w| w == b"Rahim"));
        assert_eq!(key.open(&sealed).unwrap(), b"Rahim Uddin, 01712345678");
    }

    #[test]
    fn test_wrong_key_fails() {
        let salt = b"0123456789abcdef";
        let key = CacheKey::derive("correct horse", salt).unwrap();
        let other = CacheKey::derive("battery staple", salt).unwrap();
        let sealed = key.seal(b"secret").unwrap();
        assert!(matches!(other.open(&sealed), Err(CryptoError::Open)));
        assert!(matches!(key.open(&sealed[..8]), Err(CryptoError::Open)));
    }

    #[test]
    fn test_salt_is_stable_per_dir() {
        let dir = tempfile::tempdir().unwrap();
        let a = CacheKey::for_dir(dir.path(), "pw").unwrap();
        let b = CacheKey::for_dir(dir.path(), "pw").unwrap();
        let sealed = a.seal(b"x").unwrap();
        assert_eq!(b.open(&sealed).unwrap(), b"x");
        assert!(dir.path().join(SALT_FILE).exists());
    }
}
