//! AES-256-GCM encryption of stored OAuth credentials.
//!
//! Ciphertexts are `base64(nonce || ciphertext)` so a single string column
//! holds everything needed to decrypt.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine as _, engine::general_purpose};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Creates a cipher from a 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| CipherError::InvalidKey("key must be 32 bytes (256 bits)".into()))?;
        Ok(Self { cipher })
    }

    /// Creates a cipher from a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let key = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Self::new(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::EncryptionFailed(e.to_string()))?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let raw = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CipherError::DecryptionFailed(e.to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::DecryptionFailed("ciphertext too short".into()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CipherError::DecryptionFailed(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|e| CipherError::DecryptionFailed(e.to_string()))
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypts_what_it_encrypts() {
        let cipher = TokenCipher::new(&[7u8; 32]).unwrap();
        let sealed = cipher.encrypt(r#"{"access_token":"t"}"#).unwrap();
        assert!(!sealed.contains("access_token"));
        assert_eq!(cipher.decrypt(&sealed).unwrap(), r#"{"access_token":"t"}"#);
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let cipher = TokenCipher::new(&[1u8; 32]).unwrap();
        assert_ne!(cipher.encrypt("x").unwrap(), cipher.encrypt("x").unwrap());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let sealed = TokenCipher::new(&[1u8; 32]).unwrap().encrypt("secret").unwrap();
        let other = TokenCipher::new(&[2u8; 32]).unwrap();
        assert!(matches!(
            other.decrypt(&sealed),
            Err(CipherError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn rejects_short_keys_and_garbage() {
        assert!(matches!(TokenCipher::new(&[0u8; 16]), Err(CipherError::InvalidKey(_))));
        let cipher = TokenCipher::new(&[0u8; 32]).unwrap();
        assert!(cipher.decrypt("AAAA").is_err());
        assert!(cipher.decrypt("not base64!").is_err());
    }

    #[test]
    fn base64_key_round_trips() {
        let encoded = general_purpose::STANDARD.encode([9u8; 32]);
        assert!(TokenCipher::from_base64(&encoded).is_ok());
    }
}
