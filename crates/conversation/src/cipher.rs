//! Symmetric cipher backing the `cipher=<key>` secret serialization
//! mode: AES-256-GCM keyed by a SHA-256 digest of an arbitrary
//! passphrase, so callers can pass any string as the key material
//! rather than a pre-formatted 32-byte key.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::{ConversationError, Result};

const NONCE_LEN: usize = 12;

pub struct Cipher {
    inner: Aes256Gcm,
}

impl Cipher {
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(secret_key.as_ref());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self { inner: Aes256Gcm::new(key) }
    }

    /// Encrypts `plaintext`, returning a base64 string carrying the
    /// nonce and ciphertext together so [`Cipher::decrypt`] only needs
    /// the same key, not an out-of-band nonce.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .inner
            .encrypt(&nonce, plaintext.as_bytes())
            .expect("AES-256-GCM encryption of a bounded, valid-UTF8 secret cannot fail");
        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        BASE64.encode(out)
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let raw = BASE64
            .decode(encoded)
            .map_err(|e| ConversationError::Other(format!("cipher: invalid base64: {e}")))?;
        if raw.len() < NONCE_LEN {
            return Err(ConversationError::Other("cipher: ciphertext shorter than nonce".into()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .inner
            .decrypt(nonce, ciphertext)
            .map_err(|_| ConversationError::Other("cipher: decryption failed (wrong key or corrupt data)".into()))?;
        String::from_utf8(plaintext).map_err(|e| ConversationError::Other(format!("cipher: decrypted bytes are not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let cipher = Cipher::new("some secret key");
        let encrypted = cipher.encrypt("Bearer Token");
        assert_ne!(encrypted, "Bearer Token");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "Bearer Token");
    }

    #[test]
    fn two_encryptions_of_the_same_value_differ() {
        let cipher = Cipher::new("some secret key");
        let a = cipher.encrypt("hello there");
        let b = cipher.encrypt("hello there");
        assert_ne!(a, b, "fresh nonce per call must change the ciphertext");
        assert_eq!(cipher.decrypt(&a).unwrap(), "hello there");
        assert_eq!(cipher.decrypt(&b).unwrap(), "hello there");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let cipher = Cipher::new("some secret key");
        let other = Cipher::new("a different key");
        let encrypted = cipher.encrypt("Bearer Token");
        assert!(other.decrypt(&encrypted).is_err());
    }
}
